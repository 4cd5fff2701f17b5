//! The revisioned file tree: every `put` of content identical to the
//! file's current latest revision is a no-op that returns that
//! revision rather than growing the history.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Store {
    files: HashMap<String, Vec<Vec<u8>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Returns the 1-based revision number the data now lives at.
    pub fn put(&mut self, name: &str, data: Vec<u8>) -> usize {
        let revisions = self.files.entry(name.to_string()).or_default();
        if let Some(existing) = revisions.last() {
            if *existing == data {
                return revisions.len();
            }
        }
        revisions.push(data);
        revisions.len()
    }

    /// `revision` of `None` means "latest".
    pub fn get(&self, name: &str, revision: Option<usize>) -> Option<&[u8]> {
        let revisions = self.files.get(name)?;
        match revision {
            None => revisions.last().map(Vec::as_slice),
            Some(rev) if rev >= 1 => revisions.get(rev - 1).map(Vec::as_slice),
            Some(_) => None,
        }
    }

    /// Lists the immediate children of `dir` (which must end in `/`):
    /// subdirectories (by their first path component) and files,
    /// alongside the latest revision number for files.
    pub fn list(&self, dir: &str) -> (Vec<String>, Vec<(String, usize)>) {
        let mut dirs = std::collections::BTreeSet::new();
        let mut files = Vec::new();

        for (path, revisions) in &self.files {
            let Some(rest) = path.strip_prefix(dir) else { continue };
            if rest.is_empty() {
                continue;
            }

            if let Some(slash) = rest.find('/') {
                dirs.insert(format!("{}/", &rest[..slash]));
            } else {
                files.push((rest.to_string(), revisions.len()));
            }
        }

        files.sort();
        (dirs.into_iter().collect(), files)
    }
}
