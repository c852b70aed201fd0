//! Resource identity for subscriptions.

use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of one shareable tabular resource: its folder and file name.
///
/// Subscriptions naming the same folder and name map to the same key and
/// share one backing worker. The poll offset is not part of the identity;
/// subscribers at different rates still share a worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    /// Folder the resource lives in, as named by the client.
    pub folder: String,
    /// File name of the resource.
    pub name: String,
}

impl ResourceKey {
    /// Create a key from client-supplied folder and name.
    pub fn new(folder: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
        }
    }

    /// Path of the backing file under the given data root.
    pub fn path_in(&self, root: &Path) -> PathBuf {
        root.join(&self.folder).join(&self.name)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.folder, self.name)
    }
}
