//! Allow/deny selection of export files by base name

use regex::RegexSet;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::Result;

/// Pattern rejecting any name that contains a `.`
pub const EXTENSION_PATTERN: &str = r".*\..*?";

/// Selects the files of a directory to import.
///
/// A name is selected when some allow pattern matches anywhere in it and no
/// deny pattern does. An empty allow list selects nothing.
#[derive(Debug, Clone)]
pub struct FileFilter {
    allow: RegexSet,
    deny: RegexSet,
}

impl FileFilter {
    pub fn new(allow: &[String], deny: &[String]) -> Result<Self> {
        Ok(Self {
            allow: RegexSet::new(allow)?,
            deny: RegexSet::new(deny)?,
        })
    }

    /// Filter selecting exactly `allow` and never `deny`, by literal name
    pub fn exact(allow: &[String], deny: &[String]) -> Result<Self> {
        let anchored = |names: &[String]| -> Vec<String> {
            names
                .iter()
                .map(|n| format!("^{}$", regex::escape(n)))
                .collect()
        };
        Self::new(&anchored(allow), &anchored(deny))
    }

    pub fn is_selected(&self, file_name: &str) -> bool {
        self.allow.is_match(file_name) && !self.deny.is_match(file_name)
    }

    /// Sorted base names of the selected regular files directly inside `dir`
    pub fn select_files(&self, dir: &Path) -> Result<Vec<String>> {
        let mut selected = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.is_selected(&name) {
                selected.push(name);
            } else {
                debug!("Ignoring {}", name);
            }
        }
        selected.sort();
        Ok(selected)
    }
}

/// Deny patterns in effect, with [`EXTENSION_PATTERN`] added unless names
/// with extensions are wanted
pub fn effective_deny_list(deny: &[String], allow_extensions: bool) -> Vec<String> {
    let mut deny = deny.to_vec();
    if !allow_extensions {
        deny.push(EXTENSION_PATTERN.to_string());
    }
    deny
}
