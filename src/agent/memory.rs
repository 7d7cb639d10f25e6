//! Memory priming: assembling persistent context for new agent sessions.
//!
//! The gateway keeps small markdown memory files in a dedicated directory.
//! Their concatenation is appended to the agent's system context so every
//! fresh session starts with the same standing knowledge.

use std::path::Path;

/// Load the memory-priming text for a session.
///
/// Concatenates every `.md` file in `dir` in name order, separated by blank
/// lines. Returns `None` when the directory is missing or nothing meaningful
/// was found.
pub fn load_memory_prompt(dir: &Path) -> std::io::Result<Option<String>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
        .collect();
    paths.sort();

    let mut sections = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(&path)?;
        if !content.trim().is_empty() {
            sections.push(content.trim().to_string());
        }
    }

    if sections.is_empty() {
        Ok(None)
    } else {
        Ok(Some(sections.join("\n\n")))
    }
}
