//! End-to-end frame synchronization through the host device
//!
//! Host input streams stand in for two sensors so timestamps are exact.

mod common;

use camflow::device::streams::spread;
use camflow::pipeline::nodes::{
    StreamSyncConfig, StreamSyncNode, XLinkInConfig, XLinkInNode, XLinkOutConfig, XLinkOutNode,
};
use camflow::{Device, HostDevice, HostStreams, Pipeline, SyncConfig};
use common::builders::MessageBuilder;
use std::time::Duration;

const STREAMS: [&str; 2] = ["disp", "rgb"];

fn sync_pipeline(tolerance_ms: u64) -> Pipeline {
    let mut p = Pipeline::new();
    let sync = p
        .create::<StreamSyncNode>(StreamSyncConfig::new(SyncConfig::new(Duration::from_millis(
            tolerance_ms,
        ))))
        .unwrap();
    for stream in STREAMS {
        let source = p
            .create::<XLinkInNode>(XLinkInConfig::new(format!("{}_src", stream)))
            .unwrap();
        let sink = p
            .create::<XLinkOutNode>(XLinkOutConfig::new(stream))
            .unwrap();
        p.link(
            p.output(source.id(), "out").unwrap(),
            p.input_map(sync.id(), "inputs", &StreamSyncNode::input_key(stream))
                .unwrap(),
        )
        .unwrap();
        p.link(
            p.output_map(sync.id(), "outputs", &StreamSyncNode::output_key(stream))
                .unwrap(),
            p.input(sink.id(), "in").unwrap(),
        )
        .unwrap();
    }
    p
}

fn feed(device: &HostDevice, stream: &str, stamps: &[u64]) {
    let queue = device.get_input_queue(&format!("{}_src", stream)).unwrap();
    for &ms in stamps {
        queue.send(MessageBuilder::at_ms(ms).build()).unwrap();
    }
}

#[test]
fn test_pairs_are_aligned() {
    let mut device = HostDevice::new(&common::fast_config());
    device.start_running(sync_pipeline(5)).unwrap();
    let streams = HostStreams::open(&device, &STREAMS, 8, true).unwrap();

    feed(&device, "disp", &[0, 16, 33]);
    feed(&device, "rgb", &[1, 17, 34]);

    let mut pairs = Vec::new();
    for _ in 0..3 {
        let set = streams
            .get_set_timeout(Duration::from_secs(2))
            .unwrap()
            .expect("synchronized pair");
        assert!(spread(&set) <= Duration::from_millis(5));
        pairs.push(
            set.iter()
                .map(|(_, m)| m.timestamp.as_millis() as u64)
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(pairs, vec![vec![0, 1], vec![16, 17], vec![33, 34]]);
    device.close();
}

#[test]
fn test_unmatched_frames_are_skipped() {
    let mut device = HostDevice::new(&common::fast_config());
    device.start_running(sync_pipeline(5)).unwrap();
    let streams = HostStreams::open(&device, &STREAMS, 8, true).unwrap();

    feed(&device, "disp", &[0, 100]);
    feed(&device, "rgb", &[101]);

    let set = streams
        .get_set_timeout(Duration::from_secs(2))
        .unwrap()
        .expect("synchronized pair");
    let stamps: Vec<Duration> = set.iter().map(|(_, m)| m.timestamp).collect();
    assert_eq!(
        stamps,
        vec![Duration::from_millis(100), Duration::from_millis(101)]
    );

    std::thread::sleep(Duration::from_millis(50));
    assert!(streams.try_get_all().unwrap().is_empty());
    device.close();
}
