//! Shared helpers for the end-to-end tests.

#![allow(dead_code)]

use gomer_core::{Engine, EngineConfig, OperationDescriptor};
use gomer_driver_mock::{MockDevice, MockDeviceBuilder};
use std::sync::Arc;
use std::time::Duration;

/// An engine over a mock device, past the firmware handshake.
pub async fn engine_with(builder: MockDeviceBuilder) -> (Engine, MockDevice) {
    let (device, inbound) = builder.build();
    let engine = Engine::start(EngineConfig::default(), Arc::new(device.clone()), inbound)
        .expect("Failed to start engine");
    engine.handshake().await.expect("Handshake failed");
    (engine, device)
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Whether the device has received the command with correlation `seq`.
pub fn transmitted(device: &MockDevice, seq: u64) -> bool {
    device.requests().iter().any(|op| op.correlation() == seq)
}

/// Correlation numbers of every command the device received, in order.
pub fn request_order(device: &MockDevice) -> Vec<u64> {
    device
        .requests()
        .iter()
        .map(OperationDescriptor::correlation)
        .collect()
}
