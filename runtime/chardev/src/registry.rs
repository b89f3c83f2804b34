//! Process-wide registry of shared device descriptors

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use log::info;

use crate::node::lock;
use crate::{Result, SharedNode};

/// Registry of held-open device nodes, keyed by node path
///
/// Every wrapper of one device class gets the same [`SharedNode`]. Nodes are
/// opened on first request and stay open until [`DeviceRegistry::shutdown`].
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    nodes: Mutex<HashMap<PathBuf, Arc<SharedNode>>>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process
    pub fn global() -> &'static DeviceRegistry {
        static GLOBAL: OnceLock<DeviceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(DeviceRegistry::new)
    }

    /// Get the shared node for `path`, opening it on first use
    ///
    /// A node that was shut down is reopened.
    ///
    /// # Errors
    /// Returns `Unavailable` if the node cannot be opened
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Arc<SharedNode>> {
        let path = path.as_ref();
        let mut nodes = lock(&self.nodes);

        if let Some(node) = nodes.get(path) {
            if node.is_open() {
                return Ok(Arc::clone(node));
            }
        }

        let node = Arc::new(SharedNode::open(path)?);
        nodes.insert(path.to_path_buf(), Arc::clone(&node));
        Ok(node)
    }

    /// Whether a descriptor for `path` is currently held
    pub fn is_open(&self, path: impl AsRef<Path>) -> bool {
        lock(&self.nodes)
            .get(path.as_ref())
            .is_some_and(|node| node.is_open())
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        lock(&self.nodes).len()
    }

    /// Check if no node is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every held descriptor and forget the nodes
    pub fn shutdown(&self) {
        let drained: Vec<_> = lock(&self.nodes).drain().collect();
        for (_, node) in &drained {
            node.shutdown();
        }
        info!("Device registry shut down ({} nodes)", drained.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_is_memoised() {
        let node_file = tempfile::NamedTempFile::new().unwrap();
        let registry = DeviceRegistry::new();

        let first = registry.open(node_file.path()).unwrap();
        let second = registry.open(node_file.path()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_shutdown_closes_handles() {
        let node_file = tempfile::NamedTempFile::new().unwrap();
        let registry = DeviceRegistry::new();

        let node = registry.open(node_file.path()).unwrap();
        registry.shutdown();

        assert!(!node.is_open());
        assert!(!registry.is_open(node_file.path()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reopen_after_node_shutdown() {
        let node_file = tempfile::NamedTempFile::new().unwrap();
        let registry = DeviceRegistry::new();

        let first = registry.open(node_file.path()).unwrap();
        first.shutdown();

        let second = registry.open(node_file.path()).unwrap();
        assert!(second.is_open());
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
