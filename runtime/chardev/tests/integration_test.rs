//! Integration tests for device access through the process-wide registry

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bbio_chardev::*;
use serial_test::serial;

/// Wrappers of one device class share one descriptor
#[test]
#[serial]
fn test_global_registry_shares_descriptor() {
    let node_file = tempfile::NamedTempFile::new().unwrap();
    fs::write(node_file.path(), b"1\0\0\0").unwrap();

    let gpio_a: Arc<dyn CharDevice> = DeviceRegistry::global().open(node_file.path()).unwrap();
    let gpio_b: Arc<dyn CharDevice> = DeviceRegistry::global().open(node_file.path()).unwrap();

    assert_eq!(gpio_a.read(4).unwrap(), b"1\0\0\0");
    assert_eq!(gpio_b.read(4).unwrap(), b"1\0\0\0");
    assert!(DeviceRegistry::global().is_open(node_file.path()));

    DeviceRegistry::global().shutdown();
    assert!(matches!(gpio_a.read(4), Err(DeviceError::Closed { .. })));
}

/// A poller blocked on a shared node does not hold up commands
#[test]
fn test_poll_does_not_block_commands() {
    let node_file = tempfile::NamedTempFile::new().unwrap();
    let registry = DeviceRegistry::new();
    let node = registry.open(node_file.path()).unwrap();

    // Regular files are always readable, so ask for a bit they never report
    let poller = {
        let node = Arc::clone(&node);
        thread::spawn(move || {
            node.poll(EventMask::from_bits_retain(0x4000), Some(Duration::from_millis(200)))
        })
    };

    thread::sleep(Duration::from_millis(20));
    assert_eq!(node.write(b"w 60 1").unwrap(), 6);

    let ready = poller.join().unwrap().unwrap();
    assert!(!ready.contains(EventMask::from_bits_retain(0x4000)));
}

/// Transient nodes never hold a descriptor between calls
#[test]
fn test_transient_node_sees_external_updates() {
    let node_file = tempfile::NamedTempFile::new().unwrap();
    let node = TransientNode::new(node_file.path());

    fs::write(node_file.path(), b"0").unwrap();
    assert_eq!(node.read(4).unwrap(), b"0");

    fs::write(node_file.path(), b"1").unwrap();
    assert_eq!(node.read(4).unwrap(), b"1");
}
