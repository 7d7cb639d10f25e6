//! Heartbeat checklist reading with empty-file detection.
//!
//! A checklist that only contains markdown headings and blank lines has
//! nothing actionable in it, so the heartbeat prompt skips it entirely.

use std::path::Path;

/// Read a checklist file, returning its raw text only when it has meaningful
/// content.
///
/// Returns `None` when the file does not exist, is empty or whitespace-only,
/// or contains nothing but blank lines and markdown headings. Any other line
/// makes the whole raw text meaningful.
pub async fn read_checklist(path: &Path) -> Option<String> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to read checklist {}: {}", path.display(), e);
            }
            return None;
        }
    };

    if has_meaningful_content(&content) {
        Some(content)
    } else {
        None
    }
}

/// Check whether markdown content has anything beyond headings and whitespace.
fn has_meaningful_content(content: &str) -> bool {
    content.lines().any(|line| {
        let trimmed = line.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}
