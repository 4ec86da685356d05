//! End-to-end proxy scenarios: engine, stack, virtual devices and the
//! statistics they publish

use std::sync::Arc;

use dmproxy::device::{AccessMode, BlockDevice, MemDeviceResolver};
use dmproxy::stats::Attribute;
use dmproxy::{ProxyEngine, StackRegistry, AGGREGATE_NODE_NAME, TARGET_NAME};

fn engine_with_devices(
    names: &[&str],
) -> (Arc<StackRegistry>, ProxyEngine) {
    let mut resolver = MemDeviceResolver::new();
    for name in names {
        resolver.add_new(name, 1 << 20);
    }
    let stack = StackRegistry::new();
    let engine = ProxyEngine::new(&stack, Arc::new(resolver)).unwrap();
    (stack, engine)
}

fn proxy(stack: &StackRegistry, name: &str) -> dmproxy::VirtualDevice {
    stack
        .create_device(
            TARGET_NAME,
            name,
            &[name.to_string()],
            AccessMode::ReadWrite,
        )
        .unwrap()
}

#[test]
fn test_single_device_scenario() {
    let (stack, engine) = engine_with_devices(&["dev0"]);
    let vdev = proxy(&stack, "dev0");

    for size in [100usize, 200, 300] {
        let mut buf = vec![0u8; size];
        vdev.read_at(0, &mut buf).unwrap();
    }
    for size in [50usize, 150] {
        vdev.write_at(512, &vec![0xabu8; size]).unwrap();
    }

    let namespace = engine.namespace();
    let node = namespace.lookup("dev0").unwrap();
    assert_eq!(node.render(Attribute::ReadCount), "3\n");
    assert_eq!(node.render(Attribute::ReadAvgSize), "200\n");
    assert_eq!(node.render(Attribute::WriteCount), "2\n");
    assert_eq!(node.render(Attribute::WriteAvgSize), "100\n");
    assert_eq!(node.render(Attribute::TotalCount), "5\n");
    assert_eq!(node.render(Attribute::TotalAvgSize), "160\n");

    // The only proxied device, so the aggregate shows the same numbers.
    let aggregate = namespace.lookup(AGGREGATE_NODE_NAME).unwrap();
    assert_eq!(aggregate.summary(), node.summary());
}

#[test]
fn test_two_devices_share_the_aggregate() {
    let (stack, engine) = engine_with_devices(&["dev0", "dev1"]);
    let vdev0 = proxy(&stack, "dev0");
    let vdev1 = proxy(&stack, "dev1");

    let mut buf = [0u8; 100];
    vdev0.read_at(0, &mut buf).unwrap();
    vdev1.read_at(0, &mut buf).unwrap();

    let namespace = engine.namespace();
    for name in ["dev0", "dev1"] {
        let node = namespace.lookup(name).unwrap();
        let reads = node.reads();
        assert_eq!(reads.count, 1);
        assert_eq!(reads.avg_size, 100);
    }

    let aggregate = namespace.lookup(AGGREGATE_NODE_NAME).unwrap();
    let reads = aggregate.reads();
    assert_eq!(reads.count, 2);
    assert_eq!(reads.avg_size, 100);
}

#[test]
fn test_data_passes_through_unchanged() {
    let (stack, _engine) = engine_with_devices(&["dev0"]);
    let vdev = proxy(&stack, "dev0");

    let payload: Vec<u8> = (0..=255).cycle().take(8192).map(|b: u16| b as u8).collect();
    vdev.write_at(4096, &payload).unwrap();
    vdev.flush().unwrap();

    let mut readback = vec![0u8; payload.len()];
    vdev.read_at(4096, &mut readback).unwrap();
    assert_eq!(readback, payload);
}

#[test]
fn test_flush_is_forwarded_but_not_counted() {
    let (stack, engine) = engine_with_devices(&["dev0"]);
    let vdev = proxy(&stack, "dev0");

    vdev.flush().unwrap();
    vdev.flush().unwrap();

    let node = engine.namespace().lookup("dev0").unwrap();
    assert_eq!(node.summary().total.count, 0);
}

#[test]
fn test_zero_size_request_is_counted_not_failed() {
    let (stack, engine) = engine_with_devices(&["dev0"]);
    let vdev = proxy(&stack, "dev0");

    let mut empty = [0u8; 0];
    vdev.read_at(0, &mut empty).unwrap();

    let node = engine.namespace().lookup("dev0").unwrap();
    let reads = node.reads();
    assert_eq!(reads.count, 1);
    assert_eq!(reads.avg_size, 0);
}

#[test]
fn test_construction_failures_leave_no_trace() {
    let (stack, engine) = engine_with_devices(&["dev0"]);

    // Wrong argument counts.
    for args in [vec![], vec!["dev0".to_string(), "extra".to_string()]] {
        assert!(stack
            .create_device(TARGET_NAME, "broken", &args, AccessMode::ReadWrite)
            .is_err());
    }

    // Unresolvable underlying device.
    assert!(stack
        .create_device(
            TARGET_NAME,
            "broken",
            &["ghost".to_string()],
            AccessMode::ReadWrite,
        )
        .is_err());

    assert_eq!(
        engine.namespace().names(),
        vec![AGGREGATE_NODE_NAME.to_string()]
    );
}

#[test]
fn test_teardown_retracts_only_the_destroyed_device() {
    let (stack, engine) = engine_with_devices(&["dev0", "dev1"]);
    let vdev0 = proxy(&stack, "dev0");
    let vdev1 = proxy(&stack, "dev1");

    let mut buf = [0u8; 100];
    vdev0.read_at(0, &mut buf).unwrap();
    vdev1.read_at(0, &mut buf).unwrap();

    let namespace = engine.namespace();
    drop(vdev0);

    assert!(namespace.lookup("dev0").is_none());
    assert!(namespace.lookup("dev1").is_some());

    // The aggregate keeps counting what it already saw.
    let aggregate = namespace.lookup(AGGREGATE_NODE_NAME).unwrap();
    assert_eq!(aggregate.reads().count, 2);
}

#[test]
fn test_poller_handle_outlives_teardown() {
    let (stack, engine) = engine_with_devices(&["dev0"]);
    let vdev = proxy(&stack, "dev0");

    let mut buf = [0u8; 256];
    vdev.read_at(0, &mut buf).unwrap();

    let held = engine.namespace().lookup("dev0").unwrap();
    drop(vdev);

    // Retraction removed the namespace entry but the held handle reads on.
    assert!(engine.namespace().lookup("dev0").is_none());
    assert_eq!(held.reads().count, 1);
}

#[test]
fn test_file_backed_device_through_configured_resolver() {
    use dmproxy::{config, Config, DeviceConfig};

    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        devices: vec![DeviceConfig {
            name: "disk0".to_string(),
            path: dir.path().join("disk0.img"),
            read_only: false,
            size: 1 << 16,
        }],
    };
    config.validate().unwrap();

    let stack = StackRegistry::new();
    let engine =
        ProxyEngine::new(&stack, Arc::new(config::resolver_from(&config))).unwrap();
    let vdev = proxy(&stack, "disk0");

    // The backing file was created on demand with the configured size.
    assert_eq!(vdev.capacity_bytes(), 1 << 16);

    vdev.write_at(0, b"persisted through the proxy").unwrap();
    let mut buf = [0u8; 27];
    vdev.read_at(0, &mut buf).unwrap();
    assert_eq!(&buf, b"persisted through the proxy");

    let node = engine.namespace().lookup("disk0").unwrap();
    let summary = node.summary();
    assert_eq!(summary.read.count, 1);
    assert_eq!(summary.write.count, 1);
    assert_eq!(summary.total.count, 2);
}

#[test]
fn test_virtual_device_is_a_block_device() {
    let (stack, engine) = engine_with_devices(&["dev0"]);
    let vdev = proxy(&stack, "dev0");

    // A proxied device is itself a block device, so it can sit underneath
    // another layer of the stack.
    let as_device: &dyn BlockDevice = &vdev;
    assert_eq!(as_device.name(), "dev0");
    assert_eq!(as_device.capacity_bytes(), 1 << 20);

    let mut buf = [0u8; 512];
    as_device.read_at(0, &mut buf).unwrap();

    let node = engine.namespace().lookup("dev0").unwrap();
    assert_eq!(node.reads().count, 1);
}
