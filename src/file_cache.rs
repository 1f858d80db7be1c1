//! Mirror of the files known to be present in a sandbox.

use std::collections::BTreeMap;

use crate::sandbox::SandboxFile;

/// Last uploaded contents per path, used to skip redundant uploads.
#[derive(Debug, Clone, Default)]
pub struct FileCacheSnapshot {
    files: BTreeMap<String, String>,
}

impl FileCacheSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files whose contents differ from what the sandbox already has.
    ///
    /// When a path appears more than once only its last occurrence counts.
    pub fn changed<'a>(&self, files: &'a [SandboxFile]) -> Vec<&'a SandboxFile> {
        let mut latest: BTreeMap<&str, &'a SandboxFile> = BTreeMap::new();
        for file in files {
            latest.insert(file.path.as_str(), file);
        }

        let mut changed: Vec<&'a SandboxFile> = latest
            .into_values()
            .filter(|f| self.files.get(&f.path) != Some(&f.contents))
            .collect();
        // Keep the caller's order for the upload.
        changed.sort_by_key(|f| {
            files
                .iter()
                .rposition(|g| g.path == f.path)
                .unwrap_or(usize::MAX)
        });
        changed
    }

    /// Records files as present in the sandbox.
    pub fn record<'a>(&mut self, files: impl IntoIterator<Item = &'a SandboxFile>) {
        for file in files {
            self.files.insert(file.path.clone(), file.contents.clone());
        }
    }
}
