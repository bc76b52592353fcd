//! Common test utilities for `PeerBeam` integration tests.
//!
//! This module provides shared functionality for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use peerbeam_core::connection::LinkConfig;
use peerbeam_core::signaling::Signaling;
use peerbeam_core::transfer::{SessionContext, TransferConfig};
use peerbeam_core::transport::memory::MemoryNetwork;

/// Create a temporary directory for test files.
///
/// The directory will be automatically cleaned up when the returned
/// `TempDir` is dropped.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &std::path::Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Assert that two files have identical content.
pub fn assert_files_equal(path1: &std::path::Path, path2: &std::path::Path) {
    let content1 = std::fs::read(path1).expect("Failed to read first file");
    let content2 = std::fs::read(path2).expect("Failed to read second file");
    assert_eq!(content1, content2, "File contents differ");
}

/// Session context over in-process transports with fast polling.
pub fn memory_context(signaling: Arc<dyn Signaling>, network: &MemoryNetwork) -> SessionContext {
    SessionContext::new(signaling, Arc::new(network.clone()))
        .with_link_config(LinkConfig {
            poll_interval: Duration::from_millis(20),
            ..LinkConfig::default()
        })
        .with_transfer_config(TransferConfig {
            chunk_size: 16 * 1024,
            ..TransferConfig::default()
        })
}
