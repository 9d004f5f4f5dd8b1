//! XLinkIn / XLinkOut: bridges between the graph and host queues.
//!
//! `XLinkOut` forwards whatever reaches its `in` port to the named host output
//! queue. `XLinkIn` forwards messages the host pushes into the named input
//! queue to its `out` port.

use crate::pipeline::capability::Residency;
use crate::pipeline::error::RuntimeError;
use crate::pipeline::message::DatatypeKind;
use crate::pipeline::node::{HostStream, NodeContext, NodePlugin};
use crate::pipeline::port::{DatatypeHierarchy, PortDescriptor, DEFAULT_QUEUE_SIZE};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct XLinkOutConfig {
    pub stream_name: String,
    /// Forward at most this many messages per second; the rest are dropped.
    pub fps_limit: Option<f32>,
}

impl XLinkOutConfig {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            fps_limit: None,
        }
    }
}

pub struct XLinkOutNode {
    config: XLinkOutConfig,
}

impl XLinkOutNode {
    pub fn new(config: XLinkOutConfig) -> Self {
        Self { config }
    }

    pub fn stream_name(&self) -> &str {
        &self.config.stream_name
    }

    pub fn set_stream_name(&mut self, name: impl Into<String>) {
        self.config.stream_name = name.into();
    }

    pub fn set_fps_limit(&mut self, fps: f32) {
        self.config.fps_limit = Some(fps);
    }
}

impl NodePlugin for XLinkOutNode {
    fn name(&self) -> &str {
        "XLinkOut"
    }

    fn ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::input("in", &[DatatypeHierarchy::any()])]
    }

    fn residency(&self) -> Residency {
        Residency::Device
    }

    fn host_stream(&self) -> Option<HostStream> {
        Some(HostStream::Output {
            name: self.config.stream_name.clone(),
        })
    }

    fn run(&mut self, ctx: &mut NodeContext) -> Result<(), RuntimeError> {
        let host = ctx.host_queue()?.clone();
        let Some(input) = ctx.input("in").cloned() else {
            tracing::warn!("{}: nothing linked to 'in'", ctx.node_name());
            return Ok(());
        };
        let min_gap = self
            .config
            .fps_limit
            .filter(|fps| *fps > 0.0)
            .map(|fps| Duration::from_secs_f32(1.0 / fps));
        let mut last_sent: Option<Instant> = None;

        while ctx.is_running() {
            let Some(msg) = input.get_timeout(ctx.poll_interval())? else {
                continue;
            };
            if let (Some(gap), Some(last)) = (min_gap, last_sent) {
                if last.elapsed() < gap {
                    continue;
                }
            }
            host.send(msg)?;
            last_sent = Some(Instant::now());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct XLinkInConfig {
    pub stream_name: String,
    /// Capacity of the host input queue.
    pub num_frames: usize,
    /// Largest payload accepted, in bytes. Zero disables the check.
    pub max_data_size: usize,
}

impl XLinkInConfig {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            num_frames: DEFAULT_QUEUE_SIZE,
            max_data_size: 0,
        }
    }
}

pub struct XLinkInNode {
    config: XLinkInConfig,
}

impl XLinkInNode {
    pub fn new(config: XLinkInConfig) -> Self {
        Self { config }
    }

    pub fn stream_name(&self) -> &str {
        &self.config.stream_name
    }

    pub fn set_stream_name(&mut self, name: impl Into<String>) {
        self.config.stream_name = name.into();
    }

    pub fn set_num_frames(&mut self, frames: usize) {
        self.config.num_frames = frames;
    }

    pub fn set_max_data_size(&mut self, bytes: usize) {
        self.config.max_data_size = bytes;
    }
}

impl NodePlugin for XLinkInNode {
    fn name(&self) -> &str {
        "XLinkIn"
    }

    fn ports(&self) -> Vec<PortDescriptor> {
        let every_kind: Vec<DatatypeHierarchy> = DatatypeKind::all()
            .iter()
            .map(|&kind| DatatypeHierarchy::exact(kind))
            .collect();
        vec![PortDescriptor::output("out", &every_kind)]
    }

    fn residency(&self) -> Residency {
        Residency::Device
    }

    fn host_stream(&self) -> Option<HostStream> {
        Some(HostStream::Input {
            name: self.config.stream_name.clone(),
            max_size: self.config.num_frames,
            blocking: true,
        })
    }

    fn run(&mut self, ctx: &mut NodeContext) -> Result<(), RuntimeError> {
        let host = ctx.host_queue()?.clone();
        while ctx.is_running() {
            let Some(msg) = host.get_timeout(ctx.poll_interval())? else {
                continue;
            };
            if self.config.max_data_size > 0 && payload_len(&msg.payload) > self.config.max_data_size {
                tracing::warn!(
                    "{}: dropped message {} larger than {} bytes",
                    ctx.node_name(),
                    msg.sequence_num,
                    self.config.max_data_size
                );
                continue;
            }
            ctx.send("out", msg)?;
        }
        Ok(())
    }
}

fn payload_len(payload: &crate::pipeline::message::Payload) -> usize {
    use crate::pipeline::message::Payload;
    match payload {
        Payload::Buffer(data) | Payload::EncodedFrame(data) => data.len(),
        Payload::ImgFrame(frame) => frame.data.len(),
        _ => 0,
    }
}
