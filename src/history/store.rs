//! Chat transcript persistence.
//!
//! Conversations are appended to markdown files, one directory per chat and
//! one file per day, so transcripts stay greppable from the workspace.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use tokio::io::AsyncWriteExt;

/// Appends conversation turns to per-chat daily markdown files.
pub struct ChatHistoryStore {
    base: PathBuf,
}

impl ChatHistoryStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Save one conversation turn, stamped with the current local time.
    pub async fn save_message(
        &self,
        chat_id: i64,
        sender: &str,
        message: &str,
    ) -> std::io::Result<()> {
        self.save_message_at(chat_id, sender, message, Local::now()).await
    }

    /// Save one conversation turn at an explicit timestamp.
    pub async fn save_message_at(
        &self,
        chat_id: i64,
        sender: &str,
        message: &str,
        timestamp: DateTime<Local>,
    ) -> std::io::Result<()> {
        let chat_dir = self.base.join(chat_id.to_string());
        tokio::fs::create_dir_all(&chat_dir).await?;

        let date = timestamp.format("%Y-%m-%d");
        let daily_file = chat_dir.join(format!("{date}.md"));

        let entry = format!(
            "\n## {} - {}\n\n{}\n",
            timestamp.format("%H:%M:%S"),
            capitalize(sender),
            message
        );

        let is_new = !tokio::fs::try_exists(&daily_file).await.unwrap_or(false);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&daily_file)
            .await?;

        if is_new {
            file.write_all(format!("# Chat History - {date}\n").as_bytes()).await?;
        }
        file.write_all(entry.as_bytes()).await?;
        file.flush().await
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn ts(hour: u32, minute: u32, second: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 1, hour, minute, second).unwrap()
    }

    #[tokio::test]
    async fn creates_daily_file_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatHistoryStore::new(dir.path());

        store.save_message_at(42, "user", "hello there", ts(9, 30, 5)).await.unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("42").join("2025-03-01.md")).unwrap();
        assert_eq!(content, "# Chat History - 2025-03-01\n\n## 09:30:05 - User\n\nhello there\n");
    }

    #[tokio::test]
    async fn appends_to_existing_daily_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatHistoryStore::new(dir.path());

        store.save_message_at(42, "user", "question", ts(10, 0, 0)).await.unwrap();
        store.save_message_at(42, "assistant", "answer", ts(10, 0, 30)).await.unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("42").join("2025-03-01.md")).unwrap();
        assert_eq!(content.matches("# Chat History").count(), 1);
        assert!(content.contains("## 10:00:00 - User"));
        assert!(content.contains("## 10:00:30 - Assistant"));
        assert!(content.contains("question"));
        assert!(content.contains("answer"));
    }

    #[tokio::test]
    async fn separates_chats_by_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatHistoryStore::new(dir.path());

        store.save_message_at(1, "user", "a", ts(8, 0, 0)).await.unwrap();
        store.save_message_at(2, "user", "b", ts(8, 0, 0)).await.unwrap();

        assert!(dir.path().join("1").join("2025-03-01.md").exists());
        assert!(dir.path().join("2").join("2025-03-01.md").exists());
    }
}
