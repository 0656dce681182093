//! Domain commands driven through the robot facade.

mod common;

use common::eventually;
use gomer::commands::{InfraredSensor, JointKind, PatternSet};
use gomer::{BlockMode, GomerConfig, GomerError, LinkError, Robot};
use gomer_core::OperationDescriptor;
use gomer_driver_mock::{MockDevice, MockDeviceBuilder, Reply};
use std::sync::Arc;
use std::time::Duration;

fn config() -> GomerConfig {
    let mut config = GomerConfig::default();
    config.link.settle_delay_ms = 0;
    config
}

async fn robot_with(builder: MockDeviceBuilder) -> (Robot, MockDevice) {
    let (device, inbound) = builder.build();
    let robot = Robot::with_transport(config(), Arc::new(device.clone()), inbound)
        .await
        .expect("Failed to connect to mock robot");
    (robot, device)
}

fn fields() -> OperationDescriptor {
    OperationDescriptor::with_correlation(0, 0)
}

#[tokio::test]
async fn different_joints_move_concurrently() {
    let (robot, device) = robot_with(MockDevice::builder().auto_complete(false)).await;

    robot
        .arm()
        .open_loop_move(1, 3000, BlockMode::Auto)
        .await
        .expect("Arm move failed");
    tokio::time::timeout(
        Duration::from_secs(1),
        robot.head().closed_loop_move(2, 30, 3000, BlockMode::Auto),
    )
    .await
    .expect("Head waited on the arm group")
    .expect("Head move failed");

    let opcodes: Vec<i64> = device.requests().iter().map(|r| r.opcode()).collect();
    assert_eq!(opcodes, vec![1121, 1132]);
}

#[tokio::test]
async fn same_joint_moves_in_order() {
    let (robot, device) = robot_with(MockDevice::builder().auto_complete(false)).await;
    let paw = robot.joint(JointKind::Paw);

    paw.closed_loop_move(1, 80, 2000, BlockMode::Auto)
        .await
        .expect("First paw move failed");
    let first = device.last_request().expect("first move sent").correlation();

    let follow_up = {
        let paw = paw.clone();
        tokio::spawn(async move { paw.closed_loop_move(1, 10, 2000, BlockMode::Auto).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(device.requests().len(), 1, "Second paw move went out early");

    device.complete(first);
    follow_up
        .await
        .expect("Task panicked")
        .expect("Second paw move failed");
    assert_eq!(device.requests().len(), 2);
}

#[tokio::test]
async fn sensor_reads_return_device_values() {
    let one = 1i64 << 30;
    let (robot, _device) = robot_with(
        MockDevice::builder()
            .reply(1021, Reply::fields(fields().param(2, 55)))
            .reply(
                1031,
                Reply::fields(fields().param(1, one).param(2, 0).param(3, 0).param(4, 0)),
            ),
    )
    .await;
    let sensors = robot.sensors();

    assert_eq!(
        sensors
            .read_infrared(InfraredSensor::Front)
            .await
            .expect("Infrared read failed"),
        55
    );
    let orientation = sensors
        .read_gyroscope()
        .await
        .expect("Gyroscope read failed")
        .to_euler();
    assert!(orientation.yaw.abs() < 1e-9);
    assert!(orientation.roll.abs() < 1e-9);
}

#[tokio::test]
async fn player_and_emotion_flow() {
    let (robot, device) = robot_with(MockDevice::builder()).await;

    let player = robot.player();
    player.tts("good morning", "morning").await.expect("TTS failed");
    player.play_file("morning").await.expect("Play failed");
    robot.emotion().play("hi_a").await.expect("Emotion failed");
    robot.screen().stop_showing().await.expect("Stop showing failed");

    let opcodes: Vec<i64> = device.requests().iter().map(|r| r.opcode()).collect();
    assert_eq!(opcodes, vec![1201, 1206, 1401, 1304]);
}

#[tokio::test]
async fn invalid_arguments_never_reach_device() {
    let (robot, device) = robot_with(MockDevice::builder()).await;

    let results = [
        robot.wheel().drive(3, 100, BlockMode::Never).await,
        robot.wheel().turn(2, 400, 100, BlockMode::Never).await,
        robot.arm().closed_loop_move(1, 161, 100, BlockMode::Never).await,
        robot.player().set_volume(0).await,
        robot.emotion().play("laugh").await,
        robot.patterns().add("pattern.jpg").await,
    ];
    for result in results {
        assert!(matches!(result, Err(GomerError::InvalidParameter(_))));
    }
    assert!(device.requests().is_empty());
}

#[tokio::test]
async fn pattern_detection_then_location() {
    let (robot, device) = robot_with(
        MockDevice::builder()
            .reply(
                3201,
                Reply::fields(
                    fields()
                        .text(1, r#"{"pattern0":[1,2,3,4,5,6,7,8]}"#)
                        .text(2, r#"{"pattern1":[9,9,9,9,9,9,9,9]}"#),
                ),
            )
            .reply(
                3206,
                Reply::fields(fields().text(1, r#"{"pattern1":[120.5,80.0]}"#)),
            ),
    )
    .await;
    let mut patterns = robot.patterns();

    let found = patterns
        .detect(30, 200, PatternSet::Number)
        .await
        .expect("Detection failed");
    assert_eq!(found.len(), 2);

    let location = patterns.location(1).await.expect("Location failed");
    assert_eq!(location, Some(vec![120.5, 80.0]));
    let sent = device.last_request().expect("location request sent");
    assert_eq!(sent.get_text(1), Some("pattern1"));
    assert!(patterns.location(2).await.is_err());
}

#[tokio::test]
async fn face_registry_evicts_oldest() {
    let names: Vec<String> = (0..10).map(|i| format!("p{}", i)).collect();
    let list = serde_json::json!({ "names": names }).to_string();
    let (robot, device) = robot_with(
        MockDevice::builder()
            .reply(3109, Reply::fields(fields().text(1, list)))
            .reply(3101, Reply::fields(fields().text(1, r#"{"face0":[0,0,50,50]}"#))),
    )
    .await;

    let mut faces = robot.faces().await.expect("Face list failed");
    assert_eq!(faces.registered().len(), 10);
    faces.detect(10, 300).await.expect("Detection failed");
    faces.register(0, "newcomer").await.expect("Register failed");

    assert_eq!(faces.registered().len(), 10);
    assert_eq!(faces.registered()[0], "p1");
    assert_eq!(faces.registered()[9], "newcomer");

    let deleted = device
        .requests()
        .into_iter()
        .find(|r| r.opcode() == 3110)
        .expect("Oldest face deleted");
    assert_eq!(deleted.get_text(1), Some("p0"));
}

#[tokio::test]
async fn shutdown_fails_outstanding_commands() {
    let (robot, device) = robot_with(MockDevice::builder().auto_complete(false)).await;

    let pending = {
        let wheel = robot.wheel();
        tokio::spawn(async move { wheel.turn(1, 180, 5000, BlockMode::All).await })
    };
    eventually("turn to register", || {
        device.requests().iter().any(|r| r.opcode() == 1103)
    })
    .await;

    robot.shutdown().await.expect("Shutdown failed");
    let err = pending
        .await
        .expect("Task panicked")
        .expect_err("Turn must fail after shutdown");
    assert!(matches!(err, GomerError::Link(LinkError::Disconnected)));
    assert!(err.is_fatal());

    assert!(robot.sensors().light_on().await.is_err());
}
