use std::{fs, path::Path};

use crate::Result;

/// Read raw queries, one per line. Blank lines are ignored and surrounding
/// whitespace is trimmed. A missing file reads as empty.
pub fn read_queries(path: &Path) -> Result<Vec<String>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
