//! camflow demo: synchronized color and disparity streams.
//!
//! Builds two cameras feeding a stream synchronizer, runs the graph on the
//! host device and prints the timestamp spread of every matched pair.
//!
//! Usage: `camflow [config.toml] [seconds]`

use anyhow::Context;
use camflow::device::streams::spread;
use camflow::pipeline::nodes::{
    CameraConfig, CameraNode, StreamSyncConfig, StreamSyncNode, XLinkOutConfig, XLinkOutNode,
};
use camflow::pipeline::CameraBoardSocket;
use camflow::{logging, AppConfig, Device, HostDevice, HostStreams, Pipeline};
use std::time::{Duration, Instant};

const STREAMS: [&str; 2] = ["disp", "rgb"];
const DEFAULT_RUN_SECS: u64 = 3;

fn build_pipeline(config: &AppConfig) -> anyhow::Result<Pipeline> {
    let mut pipeline = Pipeline::new();
    let fps = config.sync.fps;

    let rgb = pipeline.create_named::<CameraNode>(
        "rgb",
        CameraConfig {
            fps,
            ..CameraConfig::for_socket(CameraBoardSocket::CamA)
        },
    )?;
    // Second sensor stands in for the stereo pair's disparity output.
    let disp = pipeline.create_named::<CameraNode>(
        "disp",
        CameraConfig {
            fps,
            preview_size: (640, 400),
            ..CameraConfig::for_socket(CameraBoardSocket::CamB)
        },
    )?;

    let sync = pipeline.create::<StreamSyncNode>(
        StreamSyncConfig::new(config.sync.to_sync_config()).with_streams(STREAMS),
    )?;

    for (stream, camera) in [("disp", disp.id()), ("rgb", rgb.id())] {
        pipeline.link(
            pipeline.output(camera, "preview")?,
            pipeline.input_map(sync.id(), "inputs", &StreamSyncNode::input_key(stream))?,
        )?;
        let xout = pipeline.create::<XLinkOutNode>(XLinkOutConfig::new(stream))?;
        pipeline.link(
            pipeline.output_map(sync.id(), "outputs", &StreamSyncNode::output_key(stream))?,
            pipeline.input(xout.id(), "in")?,
        )?;
    }

    Ok(pipeline)
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => AppConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => AppConfig::load_or_default(AppConfig::default_path()),
    };
    let run_for = match args.next() {
        Some(secs) => Duration::from_secs(secs.parse().context("run time must be whole seconds")?),
        None => Duration::from_secs(DEFAULT_RUN_SECS),
    };

    let _log_guard = logging::init(&config.logging)?;
    tracing::info!("Starting camflow frame sync demo");

    let pipeline = build_pipeline(&config)?;
    let mut device = HostDevice::new(&config);
    device.start_running(pipeline)?;

    let streams = HostStreams::open(&device, &STREAMS, 4, false)?;
    let deadline = Instant::now() + run_for;
    let mut sets = 0u64;
    let mut worst = Duration::ZERO;

    while Instant::now() < deadline {
        let Some(set) = streams.get_set_timeout(Duration::from_millis(500))? else {
            tracing::warn!("No synchronized set within 500 ms");
            continue;
        };
        let diff = spread(&set);
        worst = worst.max(diff);
        sets += 1;
        let stamps: Vec<String> = set
            .iter()
            .map(|(name, msg)| format!("{}={:?}", name, msg.timestamp))
            .collect();
        println!("[{}] {} spread={:?}", sets, stamps.join(" "), diff);
    }

    device.close();
    tracing::info!("Received {} synchronized sets, worst spread {:?}", sets, worst);
    Ok(())
}
