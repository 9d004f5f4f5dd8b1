//! Integration tests for the host device
//!
//! These tests validate the complete device workflow:
//! - Starting a pipeline and reaching its streams
//! - Backpressure and drop-oldest host queues
//! - Closing: waiters wake, nodes stop, the device cannot restart

mod common;

use camflow::pipeline::nodes::{
    NeuralNetworkConfig, NeuralNetworkNode, ProducerConfig, ProducerNode, XLinkOutConfig,
    XLinkOutNode,
};
use camflow::pipeline::{BuildError, DatatypeKind, NodeState, RuntimeError};
use camflow::{Device, DeviceEvent, HostDevice, Pipeline};
use common::builders::{loopback_pipeline, MessageBuilder};
use std::thread;
use std::time::Duration;

fn producer_pipeline(count: u64) -> Pipeline {
    let mut p = Pipeline::new();
    let producer = p
        .create::<ProducerNode>(ProducerConfig {
            count: Some(count),
            interval: Duration::from_millis(1),
            payload_size: 4,
        })
        .unwrap();
    let out = p.create::<XLinkOutNode>(XLinkOutConfig::new("data")).unwrap();
    p.link(
        p.output(producer.id(), "out").unwrap(),
        p.input(out.id(), "in").unwrap(),
    )
    .unwrap();
    p
}

#[test]
fn test_blocking_host_queue_loses_nothing() {
    let mut config = common::fast_config();
    config.queues.host_queue_size = 2;
    config.queues.host_queue_blocking = true;
    let mut device = HostDevice::new(&config);
    device.start_running(producer_pipeline(20)).unwrap();

    let data = device.get_output_queue("data", 2, true).unwrap();
    // Let the producer run into backpressure before draining.
    thread::sleep(Duration::from_millis(50));
    assert!(data.len() <= 2);

    let seqs: Vec<u64> = (0..20).map(|_| data.get().unwrap().sequence_num).collect();
    assert_eq!(seqs, (0..20).collect::<Vec<_>>());
    assert_eq!(data.dropped(), 0);
    device.close();
}

#[test]
fn test_non_blocking_host_queue_keeps_newest() {
    let mut config = common::fast_config();
    config.queues.host_queue_size = 2;
    let mut device = HostDevice::new(&config);
    device.start_running(producer_pipeline(20)).unwrap();

    let data = device.get_output_queue("data", 2, false).unwrap();
    thread::sleep(Duration::from_millis(300));

    let seqs: Vec<u64> = data
        .try_get_all()
        .unwrap()
        .iter()
        .map(|m| m.sequence_num)
        .collect();
    assert_eq!(seqs, vec![18, 19]);
    assert_eq!(data.dropped(), 18);
    device.close();
}

#[test]
fn test_host_input_round_trip() {
    let mut device = HostDevice::new(&common::fast_config());
    device
        .start_running(loopback_pipeline("control", "echo"))
        .unwrap();

    let control = device.get_input_queue("control").unwrap();
    let echo = device.get_output_queue("echo", 4, true).unwrap();
    for ms in [5, 10, 15] {
        control.send(MessageBuilder::at_ms(ms).build()).unwrap();
    }
    let stamps: Vec<Duration> = (0..3).map(|_| echo.get().unwrap().timestamp).collect();
    assert_eq!(
        stamps,
        vec![
            Duration::from_millis(5),
            Duration::from_millis(10),
            Duration::from_millis(15)
        ]
    );
    device.close();
}

#[test]
fn test_close_is_terminal() {
    let mut device = HostDevice::new(&common::fast_config());
    let events = device.events();
    device
        .start_running(loopback_pipeline("control", "echo"))
        .unwrap();

    let echo = device.get_output_queue("echo", 4, true).unwrap();
    let waiter = thread::spawn(move || echo.get());
    thread::sleep(Duration::from_millis(30));

    device.close();
    device.close();

    let woken = waiter.join().unwrap();
    assert!(matches!(woken, Err(RuntimeError::QueueClosed(_))));
    assert!(!device.is_running());

    let control = device.get_input_queue("control").unwrap();
    assert!(control
        .send(MessageBuilder::at_ms(1).build())
        .unwrap_err()
        .is_closed());

    let pipeline = device.pipeline().unwrap();
    for id in pipeline.node_ids() {
        assert_eq!(pipeline.node_state(id).unwrap(), NodeState::Stopped);
    }

    let received: Vec<DeviceEvent> = events.try_iter().collect();
    let started = received
        .iter()
        .filter(|e| matches!(e, DeviceEvent::NodeStarted { .. }))
        .count();
    let stopped = received
        .iter()
        .filter(|e| matches!(e, DeviceEvent::NodeStopped { .. }))
        .count();
    assert_eq!((started, stopped), (2, 2));
    assert_eq!(received.last(), Some(&DeviceEvent::Closed));

    assert!(matches!(
        device.start_running(Pipeline::new()),
        Err(RuntimeError::DeviceUnavailable(_))
    ));
}

#[test]
fn test_get_output_queue_validates_arguments() {
    let mut device = HostDevice::new(&common::fast_config());
    device.start_running(producer_pipeline(1)).unwrap();
    assert!(matches!(
        device.get_output_queue("missing", 4, false),
        Err(RuntimeError::UnknownStream(_))
    ));
    assert!(matches!(
        device.get_output_queue("data", 0, false),
        Err(RuntimeError::InvalidQueueSize(_))
    ));
    assert!(matches!(
        device.get_input_queue("data"),
        Err(RuntimeError::UnknownStream(_))
    ));
}

#[test]
fn test_network_passthrough_forwards_buffers() {
    let mut p = Pipeline::new();
    let producer = p
        .create::<ProducerNode>(ProducerConfig {
            count: Some(3),
            interval: Duration::from_millis(1),
            payload_size: 4,
        })
        .unwrap();
    let nn = p
        .create::<NeuralNetworkNode>(NeuralNetworkConfig::default())
        .unwrap();
    let pass = p.create::<XLinkOutNode>(XLinkOutConfig::new("pass")).unwrap();
    p.link(
        p.output(producer.id(), "out").unwrap(),
        p.input(nn.id(), "in").unwrap(),
    )
    .unwrap();
    p.link(
        p.output(nn.id(), "passthrough").unwrap(),
        p.input(pass.id(), "in").unwrap(),
    )
    .unwrap();

    let mut config = common::fast_config();
    config.queues.host_queue_blocking = true;
    let mut device = HostDevice::new(&config);
    device.start_running(p).unwrap();
    let pass = device.get_output_queue("pass", 4, true).unwrap();
    let kinds: Vec<DatatypeKind> = (0..3).map(|_| pass.get().unwrap().kind()).collect();
    assert_eq!(kinds, vec![DatatypeKind::Buffer; 3]);
    device.close();
}

#[test]
fn test_build_before_start_keeps_pipeline_recoverable() {
    let mut p = Pipeline::new();
    let a = p
        .create_named::<NeuralNetworkNode>("a", NeuralNetworkConfig::default())
        .unwrap();
    let b = p
        .create_named::<NeuralNetworkNode>("b", NeuralNetworkConfig::default())
        .unwrap();
    let out = p.create::<XLinkOutNode>(XLinkOutConfig::new("nn")).unwrap();
    p.link(p.output(a.id(), "out").unwrap(), p.input(b.id(), "in").unwrap())
        .unwrap();
    let back = p
        .link(p.output(b.id(), "out").unwrap(), p.input(a.id(), "in").unwrap())
        .unwrap();
    p.link(p.output(b.id(), "passthrough").unwrap(), p.input(out.id(), "in").unwrap())
        .unwrap();

    assert!(matches!(p.build(), Err(BuildError::CyclicDependency { .. })));
    assert!(p.unlink(back).unwrap());

    let mut device = HostDevice::new(&common::fast_config());
    device.start_running(p).unwrap();
    assert!(device.is_running());
    assert_eq!(device.output_stream_names(), vec!["nn".to_string()]);
    device.close();
}
