//! Answer generation: conversational retrieval and NL-to-SQL

pub mod chain;
pub mod prompt;
pub mod sql;

pub use chain::{ChainAnswer, ConversationalChain};
pub use prompt::PromptBuilder;
pub use sql::{clean_sql, SqlGenerator};
