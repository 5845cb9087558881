//! Flat-file chat history per collection
//!
//! Each collection's history is a markdown file of `**Role:** text` blocks.
//! Loading scans for the role markers, so message text containing a marker
//! substring does not survive a round trip.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

const USER_MARKER: &str = "**User:**";
const ASSISTANT_MARKER: &str = "**Assistant:**";

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn marker(&self) -> &'static str {
        match self {
            Role::User => USER_MARKER,
            Role::Assistant => ASSISTANT_MARKER,
        }
    }
}

/// One persisted chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Chat log directory
#[derive(Debug, Clone)]
pub struct ChatLogStore {
    chat_dir: PathBuf,
}

impl ChatLogStore {
    /// Create the store, creating the chat directory if needed
    pub fn new(chat_dir: impl Into<PathBuf>) -> Result<Self> {
        let chat_dir = chat_dir.into();
        fs::create_dir_all(&chat_dir)?;
        Ok(Self { chat_dir })
    }

    /// Path of a collection's chat file
    pub fn path(&self, collection: &str) -> PathBuf {
        let safe = collection.replace(['/', '\\'], "_");
        self.chat_dir.join(format!("{}.md", safe))
    }

    /// Load the full history; a missing file is an empty history
    pub fn load(&self, collection: &str) -> Result<Vec<ChatMessage>> {
        let path = self.path(collection);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        Ok(parse_history(&content))
    }

    /// Overwrite the history
    pub fn save(&self, collection: &str, messages: &[ChatMessage]) -> Result<()> {
        write_history(&self.path(collection), messages)
    }

    /// Append one message (re-reads and rewrites the whole file)
    pub fn append(&self, collection: &str, message: ChatMessage) -> Result<()> {
        let mut messages = self.load(collection)?;
        messages.push(message);
        self.save(collection, &messages)
    }

    /// Empty the history
    pub fn clear(&self, collection: &str) -> Result<()> {
        self.save(collection, &[])
    }

    /// Remove the chat file, returning whether it existed
    pub fn delete(&self, collection: &str) -> Result<bool> {
        let path = self.path(collection);
        if path.exists() {
            fs::remove_file(path)?;
            return Ok(true);
        }
        Ok(false)
    }
}

fn write_history(path: &Path, messages: &[ChatMessage]) -> Result<()> {
    let mut content = String::new();
    for message in messages {
        content.push_str(message.role.marker());
        content.push(' ');
        content.push_str(&message.text);
        content.push_str("\n\n");
    }
    fs::write(path, content)?;
    Ok(())
}

/// Parse history text. Lines after a marker line belong to that message.
fn parse_history(content: &str) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::new();

    for line in content.lines() {
        if line.contains(USER_MARKER) {
            messages.push(ChatMessage::user(line.replace(USER_MARKER, "").trim()));
        } else if line.contains(ASSISTANT_MARKER) {
            messages.push(ChatMessage::assistant(line.replace(ASSISTANT_MARKER, "").trim()));
        } else if let Some(last) = messages.last_mut() {
            last.text.push('\n');
            last.text.push_str(line);
        }
    }

    for message in &mut messages {
        let trimmed = message.text.trim_end().to_string();
        message.text = trimmed;
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ChatLogStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatLogStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_append_and_load_in_order() {
        let (_dir, store) = store();

        store.append("sales.csv", ChatMessage::user("How many rows?")).unwrap();
        store.append("sales.csv", ChatMessage::assistant("The answer is **42**.")).unwrap();

        let history = store.load("sales.csv").unwrap();
        assert_eq!(
            history,
            vec![
                ChatMessage::user("How many rows?"),
                ChatMessage::assistant("The answer is **42**."),
            ]
        );

        let raw = std::fs::read_to_string(store.path("sales.csv")).unwrap();
        assert_eq!(
            raw,
            "**User:** How many rows?\n\n**Assistant:** The answer is **42**.\n\n"
        );
    }

    #[test]
    fn test_multiline_answer_survives() {
        let (_dir, store) = store();
        store
            .append("notes.txt", ChatMessage::assistant("First line.\nSecond line."))
            .unwrap();
        store.append("notes.txt", ChatMessage::user("Thanks")).unwrap();

        let history = store.load("notes.txt").unwrap();
        assert_eq!(history[0].text, "First line.\nSecond line.");
        assert_eq!(history[1], ChatMessage::user("Thanks"));
    }

    #[test]
    fn test_marker_in_text_is_lossy() {
        let (_dir, store) = store();
        store
            .append("a.txt", ChatMessage::user("quote\n**Assistant:** injected"))
            .unwrap();

        let history = store.load("a.txt").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[test]
    fn test_clear_and_delete() {
        let (_dir, store) = store();
        assert!(store.load("missing.pdf").unwrap().is_empty());

        store.append("doc.pdf", ChatMessage::user("hi")).unwrap();
        store.clear("doc.pdf").unwrap();
        assert!(store.load("doc.pdf").unwrap().is_empty());
        assert!(store.path("doc.pdf").exists());

        assert!(store.delete("doc.pdf").unwrap());
        assert!(!store.path("doc.pdf").exists());
    }

    #[test]
    fn test_path_flattens_separators() {
        let (_dir, store) = store();
        assert!(store.path("a/b.txt").ends_with("a_b.txt.md"));
    }
}
