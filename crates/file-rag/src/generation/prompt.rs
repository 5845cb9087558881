//! Prompt templates for retrieval answers, question condensing and SQL generation

use crate::index::SearchHit;
use crate::storage::{ChatMessage, Role};

/// Prompt builder for RAG and NL-to-SQL requests
pub struct PromptBuilder;

impl PromptBuilder {
    /// Retrieved chunk texts joined by blank lines
    pub fn build_context(hits: &[SearchHit]) -> String {
        hits.iter()
            .map(|hit| hit.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Grounded answer prompt
    pub fn build_rag_prompt(question: &str, context: &str) -> String {
        format!(
            r#"You are an expert assistant. Answer the user's question using only the provided context.
If the answer is not in the context, respond with "I don't know".

Context:
{context}

Question:
{question}

Answer:
"#
        )
    }

    /// Rewrite a follow-up into a standalone question using the chat history
    pub fn build_condense_prompt(history: &[ChatMessage], question: &str) -> String {
        let mut transcript = String::new();
        for message in history {
            let speaker = match message.role {
                Role::User => "Human",
                Role::Assistant => "Assistant",
            };
            transcript.push_str(&format!("{}: {}\n", speaker, message.text));
        }

        format!(
            "Given the following conversation and a follow up question, rephrase the follow up \
             question to be a standalone question, in its original language.\n\n\
             Chat History:\n{transcript}Follow Up Input: {question}\nStandalone question:"
        )
    }

    /// Schema-grounded SQL generation prompt
    pub fn build_sql_prompt(schema: &str, question: &str) -> String {
        format!(
            r#"You are an expert SQL assistant. Based on the database schema below,
write one correct SQL query that answers the user's question.
Do NOT add explanations - return only the SQL statement.

Schema:
{schema}

Question: {question}
"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(content: &str) -> SearchHit {
        SearchHit {
            id: "x_1".to_string(),
            content: content.to_string(),
            source: "x.txt".to_string(),
            page: None,
            score: 1.0,
        }
    }

    #[test]
    fn test_rag_prompt_contains_context_and_question() {
        let context = PromptBuilder::build_context(&[hit("Paris is in France."), hit("It has the Louvre.")]);
        assert_eq!(context, "Paris is in France.\n\nIt has the Louvre.");

        let prompt = PromptBuilder::build_rag_prompt("Where is Paris?", &context);
        assert!(prompt.contains("respond with \"I don't know\""));
        assert!(prompt.contains("Context:\nParis is in France.\n\nIt has the Louvre.\n\nQuestion:\nWhere is Paris?\n\nAnswer:"));
    }

    #[test]
    fn test_condense_prompt_transcript() {
        let history = vec![
            ChatMessage::user("Who wrote Dune?"),
            ChatMessage::assistant("Frank Herbert."),
        ];
        let prompt = PromptBuilder::build_condense_prompt(&history, "When was it published?");
        assert!(prompt.contains("Chat History:\nHuman: Who wrote Dune?\nAssistant: Frank Herbert.\nFollow Up Input: When was it published?"));
        assert!(prompt.ends_with("Standalone question:"));
    }

    #[test]
    fn test_sql_prompt() {
        let prompt = PromptBuilder::build_sql_prompt("\nTable: t\nColumns: a\n", "count rows");
        assert!(prompt.contains("Schema:\n\nTable: t\nColumns: a\n\n\nQuestion: count rows"));
    }
}
