//! # camflow: typed dataflow graphs for camera pipelines
//!
//! A pipeline is a graph of nodes (cameras, neural networks, synchronizers,
//! host bridges) joined by typed links. Links are checked against each port's
//! accepted datatypes when they are made. Source nodes negotiate extra outputs
//! (size, frame rate, residency) on request, with the scaler ratio picked by a
//! bounded best-fit search. A device runs the validated graph and exposes
//! named host queues.
//!
//! ## Architecture
//!
//! - **Pipeline**: nodes, ports, port maps and links; validated by `build`
//! - **Negotiation**: `request_output` on nodes that expose a capability source
//! - **Device**: `HostDevice` runs each node on its own thread against bounded queues
//! - **Synchronizer**: matches messages from several streams by timestamp
//!
//! ## Configuration
//!
//! Runtime knobs live in `camflow.toml` in the platform config directory
//! under `dev.camflow`:
//!
//! - **Linux**: `~/.config/dev.camflow/`
//! - **macOS**: `~/Library/Application Support/dev.camflow/`
//! - **Windows**: `%APPDATA%\dev.camflow\`
//!
//! ## Example
//!
//! ```ignore
//! use camflow::device::{Device, HostDevice};
//! use camflow::pipeline::nodes::{CameraConfig, CameraNode, XLinkOutConfig, XLinkOutNode};
//! use camflow::{AppConfig, Pipeline};
//!
//! let config = AppConfig::load_or_default(AppConfig::default_path());
//! let mut pipeline = Pipeline::new();
//! let cam = pipeline.create::<CameraNode>(CameraConfig::default())?;
//! let out = pipeline.create::<XLinkOutNode>(XLinkOutConfig::new("preview"))?;
//! pipeline.link(
//!     pipeline.output(cam.id(), "preview")?,
//!     pipeline.input(out.id(), "in")?,
//! )?;
//!
//! let mut device = HostDevice::new(&config);
//! device.start_running(pipeline)?;
//! let frames = device.get_output_queue("preview", 4, false)?;
//! let frame = frames.get()?;
//! device.close();
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod pipeline;

// Re-export commonly used types
pub use config::AppConfig;
pub use device::{Device, DeviceEvent, HostDevice, HostStreams};
pub use error::{CamflowError, Result, ResultExt};
pub use pipeline::{
    CapabilityRequest, DatatypeKind, Message, MessageQueue, NodeId, Pipeline, PortId,
    StreamSynchronizer, SyncConfig,
};
