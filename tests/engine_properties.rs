//! Ordering, gating and idempotency guarantees of the correlation engine.

mod common;

use common::{engine_with, eventually, transmitted};
use gomer_core::{BlockMode, Engine, EngineConfig, LinkError, LinkStatus};
use gomer_driver_mock::MockDevice;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn correlation_numbers_strictly_increase() {
    let (engine, device) = engine_with(MockDevice::builder()).await;
    let dispatcher = engine.dispatcher();
    let floor = dispatcher.sequence().current();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let dispatcher = dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..5 {
                let op = dispatcher.descriptor(1002).param(1, 101);
                seen.push(op.correlation());
                dispatcher
                    .submit(op, None, BlockMode::Never)
                    .await
                    .expect("Light switch failed");
            }
            seen
        }));
    }

    let mut all = HashSet::new();
    for task in tasks {
        let seen = task.await.expect("Task panicked");
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
        for seq in seen {
            assert!(seq > floor);
            assert!(all.insert(seq), "Correlation number {} issued twice", seq);
        }
    }
    assert_eq!(all.len(), 40);
    assert_eq!(device.requests().len(), 40);
}

#[tokio::test]
async fn never_mode_ignores_reserved_group() {
    let (engine, device) = engine_with(MockDevice::builder().auto_complete(false)).await;
    let dispatcher = engine.dispatcher();

    dispatcher
        .submit(dispatcher.descriptor(1101).param(1, 1), Some("wheel"), BlockMode::Auto)
        .await
        .expect("Reserving move failed");
    assert!(engine.state().table().is_group_reserved("wheel"));

    let quick = dispatcher.descriptor(1103).param(1, 1).param(2, 45);
    let seq = quick.correlation();
    tokio::time::timeout(
        Duration::from_secs(1),
        dispatcher.submit(quick, Some("wheel"), BlockMode::Never),
    )
    .await
    .expect("NEVER submission waited on the group gate")
    .expect("NEVER submission failed");
    assert!(transmitted(&device, seq));
}

#[tokio::test]
async fn all_mode_ignores_reserved_group() {
    let (engine, device) = engine_with(MockDevice::builder().auto_complete(false)).await;
    let dispatcher = engine.dispatcher();

    dispatcher
        .submit(dispatcher.descriptor(1121).param(1, 1), Some("arm"), BlockMode::Auto)
        .await
        .expect("Reserving move failed");

    let settle = dispatcher.descriptor(1122).param(1, 1).param(2, 30);
    let seq = settle.correlation();
    let task = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.submit(settle, Some("arm"), BlockMode::All).await })
    };
    eventually("ALL submission to transmit", || transmitted(&device, seq)).await;

    device.complete(seq);
    let fields = task
        .await
        .expect("Task panicked")
        .expect("ALL submission failed");
    assert!(fields.is_some());
}

#[tokio::test]
async fn sweep_removes_only_oldest_predecessor() {
    let (engine, device) = engine_with(
        MockDevice::builder()
            .auto_acknowledge(false)
            .auto_complete(false),
    )
    .await;
    let dispatcher = engine.dispatcher();

    // NEVER entries are not gated, so several can be live in one group
    let mut seqs = Vec::new();
    let mut tasks = Vec::new();
    for angle in [10, 20, 30] {
        let op = dispatcher.descriptor(1132).param(1, 1).param(2, angle);
        let seq = op.correlation();
        let dispatcher = dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            dispatcher.submit(op, Some("head"), BlockMode::Never).await
        }));
        eventually("head move to register", || engine.state().table().contains(seq)).await;
        seqs.push(seq);
    }
    let (oldest, middle, newest) = (seqs[0], seqs[1], seqs[2]);

    device.acknowledge(newest);
    let mut tasks = tasks.into_iter();
    let first = tasks.next().expect("three tasks");
    let second = tasks.next().expect("three tasks");
    let third = tasks.next().expect("three tasks");

    third
        .await
        .expect("Task panicked")
        .expect("Newest head move failed");
    let err = first
        .await
        .expect("Task panicked")
        .expect_err("Oldest head move must be interrupted");
    assert!(matches!(err, LinkError::Interrupted { seq, by } if seq == oldest && by == newest));

    {
        let table = engine.state().table();
        assert!(!table.contains(oldest));
        assert!(table.contains(middle), "Only one predecessor may be swept");
        assert!(table.contains(newest));
    }

    device.acknowledge(middle);
    second
        .await
        .expect("Task panicked")
        .expect("Middle head move failed");
    assert!(engine.state().table().contains(newest));
}

#[tokio::test]
async fn duplicate_completion_is_acknowledged_once() {
    let (engine, device) = engine_with(MockDevice::builder().auto_complete(false)).await;
    let dispatcher = engine.dispatcher();

    let stop = dispatcher.descriptor(1404);
    let seq = stop.correlation();
    let task = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.submit(stop, None, BlockMode::All).await })
    };
    eventually("stop to transmit", || transmitted(&device, seq)).await;

    device.complete(seq);
    device.complete(seq);
    task.await
        .expect("Task panicked")
        .expect("Stop failed");

    // Reports are processed in order, so once this is acknowledged the
    // replayed completion has been handled too.
    dispatcher
        .submit(dispatcher.descriptor(1002).param(1, 100), None, BlockMode::Never)
        .await
        .expect("Barrier submission failed");

    let acks: Vec<u64> = device
        .completion_acks()
        .into_iter()
        .filter(|ack| *ack == seq)
        .collect();
    assert_eq!(acks, vec![seq]);
    assert!(!engine.state().table().contains(seq));
}

#[tokio::test]
async fn incompatible_firmware_blocks_submissions() {
    let (device, inbound) = MockDevice::builder().firmware("2.4.0").build();
    let engine = Engine::start(EngineConfig::default(), Arc::new(device.clone()), inbound)
        .expect("Failed to start engine");

    let err = engine.handshake().await.expect_err("Old firmware accepted");
    assert!(matches!(err, LinkError::DeviceIncompatible { ref found, .. } if found == "2.4.0"));
    assert!(matches!(engine.status(), LinkStatus::Incompatible { .. }));

    let dispatcher = engine.dispatcher();
    let err = dispatcher
        .submit(dispatcher.descriptor(1101), Some("wheel"), BlockMode::Auto)
        .await
        .expect_err("Submission accepted on an incompatible link");
    assert!(matches!(err, LinkError::DeviceIncompatible { .. }));
    assert!(device.requests().is_empty());
}

#[tokio::test]
async fn unparseable_firmware_is_incompatible() {
    let (device, inbound) = MockDevice::builder().firmware("beta").build();
    let engine = Engine::start(EngineConfig::default(), Arc::new(device), inbound)
        .expect("Failed to start engine");
    assert!(matches!(
        engine.handshake().await,
        Err(LinkError::DeviceIncompatible { .. })
    ));
}
