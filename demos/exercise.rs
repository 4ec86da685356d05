//! Drive a small workload through two proxied in-memory devices and print
//! the published statistics.
//!
//! Run with: cargo run --example exercise

use std::sync::Arc;

use dmproxy::device::{AccessMode, BlockDevice, MemDeviceResolver};
use dmproxy::stats::Attribute;
use dmproxy::{ProxyEngine, StackRegistry, AGGREGATE_NODE_NAME, TARGET_NAME};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut resolver = MemDeviceResolver::new();
    resolver.add_new("dev0", 1 << 20);
    resolver.add_new("dev1", 1 << 20);

    let stack = StackRegistry::new();
    let engine = ProxyEngine::new(&stack, Arc::new(resolver))?;

    let dev0 = stack.create_device(
        TARGET_NAME,
        "dev0",
        &["dev0".to_string()],
        AccessMode::ReadWrite,
    )?;
    let dev1 = stack.create_device(
        TARGET_NAME,
        "dev1",
        &["dev1".to_string()],
        AccessMode::ReadWrite,
    )?;

    // A few writes and reads of mixed sizes on each device.
    for (i, size) in [512usize, 1024, 4096, 8192].into_iter().enumerate() {
        let offset = (i as u64) * 16 * 512;
        dev0.write_at(offset, &vec![0x5au8; size])?;
        dev1.write_at(offset, &vec![0xa5u8; size])?;

        let mut buf = vec![0u8; size];
        dev0.read_at(offset, &mut buf)?;
    }
    dev0.flush()?;

    let namespace = engine.namespace();
    for name in namespace.names() {
        let node = namespace.lookup(&name).expect("node just listed");
        println!("--- {name} ---");
        print!("{}", node.render(Attribute::Summary));
    }

    let aggregate = namespace
        .lookup(AGGREGATE_NODE_NAME)
        .expect("aggregate node");
    println!(
        "aggregate totals: {} requests, {} bytes average",
        aggregate.summary().total.count,
        aggregate.summary().total.avg_size
    );

    drop(dev0);
    drop(dev1);
    engine.shutdown();
    Ok(())
}
