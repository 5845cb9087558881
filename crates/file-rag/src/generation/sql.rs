//! Natural-language to SQL generation

use std::sync::Arc;

use crate::error::Result;
use crate::providers::LlmProvider;

use super::prompt::PromptBuilder;

/// Asks the LLM for one SQL statement answering a question over a schema
pub struct SqlGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Generate SQL for `question` against `schema`
    pub async fn generate(&self, question: &str, schema: &str) -> Result<String> {
        let prompt = PromptBuilder::build_sql_prompt(schema, question);
        let raw = self.llm.complete(&prompt).await?;
        let sql = clean_sql(&raw);
        tracing::debug!("Generated SQL: {}", sql);
        Ok(sql)
    }
}

/// Strip markdown fences and keep only the first statement
pub fn clean_sql(raw: &str) -> String {
    let unfenced = raw.trim().replace("```sql", "").replace("```", "");
    first_statement(unfenced.trim()).to_string()
}

/// Text up to the first `;` outside quotes, or the whole input
fn first_statement(sql: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in sql.char_indices() {
        match (quote, c) {
            (None, '\'' | '"' | '`') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ';') => return sql[..i].trim_end(),
            _ => {}
        }
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CannedLlm(&'static str);

    #[async_trait]
    impl LlmProvider for CannedLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            assert!(prompt.contains("Schema:"));
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "canned"
        }

        fn model(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_clean_sql_strips_fences() {
        assert_eq!(
            clean_sql("```sql\nSELECT COUNT(*) FROM sales;\n```"),
            "SELECT COUNT(*) FROM sales"
        );
        assert_eq!(clean_sql("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_first_statement_only() {
        assert_eq!(clean_sql("SELECT 1; DROP TABLE t;"), "SELECT 1");
        assert_eq!(
            clean_sql("SELECT * FROM t WHERE name = 'a;b'; SELECT 2"),
            "SELECT * FROM t WHERE name = 'a;b'"
        );
    }

    #[test]
    fn test_generate_uses_llm_output() {
        let generator = SqlGenerator::new(Arc::new(CannedLlm("```sql\nSELECT name FROM people\n```")));
        let sql = tokio_test::block_on(generator.generate("Who?", "\nTable: people\nColumns: name\n")).unwrap();
        assert_eq!(sql, "SELECT name FROM people");
    }
}
