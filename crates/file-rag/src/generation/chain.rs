//! Conversational retrieval that rewrites follow-ups against chat history before answering from the index

use std::sync::Arc;

use crate::error::Result;
use crate::index::{SearchHit, VectorIndex};
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::storage::ChatMessage;

use super::prompt::PromptBuilder;

/// Answer to one question
#[derive(Debug, Clone)]
pub struct ChainAnswer {
    pub answer: String,
    /// Question actually used for retrieval
    pub standalone_question: String,
    pub sources: Vec<SearchHit>,
}

/// Retrieval chain built per request from persisted chat history
pub struct ConversationalChain {
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    top_k: usize,
    memory_turns: usize,
}

impl ConversationalChain {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        top_k: usize,
        memory_turns: usize,
    ) -> Self {
        Self {
            embedder,
            llm,
            top_k,
            memory_turns,
        }
    }

    /// The most recent `memory_turns` user/assistant pairs
    fn memory<'a>(&self, history: &'a [ChatMessage]) -> &'a [ChatMessage] {
        let keep = (self.memory_turns * 2).min(history.len());
        &history[history.len() - keep..]
    }

    /// Answer `question` over `index`, using `history` as conversation memory
    pub async fn ask(
        &self,
        index: &VectorIndex,
        history: &[ChatMessage],
        question: &str,
    ) -> Result<ChainAnswer> {
        let memory = self.memory(history);
        let standalone_question = if memory.is_empty() {
            question.to_string()
        } else {
            let prompt = PromptBuilder::build_condense_prompt(memory, question);
            let condensed = self.llm.complete(&prompt).await?;
            let condensed = condensed.trim();
            if condensed.is_empty() {
                question.to_string()
            } else {
                condensed.to_string()
            }
        };
        tracing::debug!("Standalone question: {}", standalone_question);

        let query = self.embedder.embed(&standalone_question).await?;
        let searcher = index.clone();
        let top_k = self.top_k;
        let sources = tokio::task::spawn_blocking(move || searcher.search(&query, top_k)).await??;

        let context = PromptBuilder::build_context(&sources);
        let prompt = PromptBuilder::build_rag_prompt(&standalone_question, &context);
        let answer = self.llm.complete(&prompt).await?.trim().to_string();

        tracing::info!(
            "Answered with {} retrieved chunk(s) using {}",
            sources.len(),
            self.llm.model()
        );

        Ok(ChainAnswer {
            answer,
            standalone_question,
            sources,
        })
    }
}
