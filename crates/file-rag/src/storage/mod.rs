//! On-disk storage for uploads, CSV tables and chat logs

mod chat_log;
mod file_store;
mod table_store;

pub use chat_log::{ChatLogStore, ChatMessage, Role};
pub use file_store::{clean_filename, split_extension, FileStore};
pub use table_store::{
    load_csv_to_sql, run_query, table_info, table_name_for, LoadedTable, QueryOutcome,
    QueryResult, TableStore,
};
