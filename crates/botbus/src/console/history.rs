//! Line-history persistence.
//!
//! A side feature of the interactive front end, not part of the console's
//! correctness: plain load/save of one entry per line, capped at
//! [`MAX_ENTRIES`]. A missing history file is an empty history, not an error.

use std::io;
use std::path::Path;

pub const MAX_ENTRIES: usize = 1000;

pub fn load(path: &Path) -> io::Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text.lines().map(str::to_string).collect()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}

pub fn save(path: &Path, entries: &[String]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let start = entries.len().saturating_sub(MAX_ENTRIES);
    let mut text = entries[start..].join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    std::fs::write(path, text)
}
