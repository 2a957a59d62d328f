use std::path::{Component, Path, PathBuf};

use super::WordlistResolver;
use crate::error::{CoordinatorError, Result};

/// Resolves wordlist references to files inside one directory.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl WordlistResolver for DirectoryResolver {
    fn resolve(&self, wordlist_ref: &str) -> Result<PathBuf> {
        let not_found = || CoordinatorError::WordlistNotFound(wordlist_ref.to_string());

        let name = Path::new(wordlist_ref);
        let mut components = name.components();
        // Exactly one plain file name; no directories, no parent references.
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return Err(not_found()),
        }
        if wordlist_ref.contains(['/', '\\']) {
            return Err(not_found());
        }

        let path = self.root.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            tracing::debug!(wordlist = wordlist_ref, root = %self.root.display(), "Wordlist not found");
            Err(not_found())
        }
    }
}
