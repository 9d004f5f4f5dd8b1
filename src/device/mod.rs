//! Device module: runs a built pipeline and exposes its host queues.
//!
//! The core only talks to a device through the [`Device`] trait. The bundled
//! [`HostDevice`] executes every node on its own thread inside this process.
//!
//! # Architecture
//!
//! ```text
//! Pipeline ──start_running──► HostDevice ──► one thread per node
//!                                 │
//!                                 ├── get_output_queue("rgb") ──► host drains
//!                                 ├── get_input_queue("control") ◄── host pushes
//!                                 └── events() ──► DeviceEvent stream
//! ```
//!
//! # Example
//!
//! ```ignore
//! use camflow::device::{Device, HostDevice};
//!
//! let mut device = HostDevice::new(&config);
//! device.start_running(pipeline)?;
//! let rgb = device.get_output_queue("rgb", 4, false)?;
//! let frame = rgb.get()?;
//! device.close();
//! ```

pub mod host;
pub mod streams;

pub use host::HostDevice;
pub use streams::HostStreams;

use crate::pipeline::error::RuntimeError;
use crate::pipeline::graph::Pipeline;
use crate::pipeline::id::NodeId;
use crate::pipeline::queue::MessageQueue;
use std::sync::Arc;

/// Execution backend for a pipeline.
pub trait Device {
    /// Validate `pipeline` and start executing it.
    ///
    /// Fails with `GraphRejected` when the graph does not validate and with
    /// `DeviceUnavailable` when the device is already running or closed.
    ///
    /// The pipeline is consumed either way. Call [`Pipeline::build`] first to
    /// get a [`BuildError`](crate::pipeline::BuildError) while the graph can
    /// still be fixed and rebuilt.
    fn start_running(&mut self, pipeline: Pipeline) -> Result<(), RuntimeError>;

    /// Host end of the device → host stream `name`, resized to `max_size`
    /// with the given overflow policy.
    fn get_output_queue(
        &self,
        name: &str,
        max_size: usize,
        blocking: bool,
    ) -> Result<Arc<MessageQueue>, RuntimeError>;

    /// Host end of the host → device stream `name`.
    fn get_input_queue(&self, name: &str) -> Result<Arc<MessageQueue>, RuntimeError>;

    fn is_running(&self) -> bool;

    /// Stop every node and close every queue. Waiters wake with
    /// `QueueClosed`. Idempotent; the device cannot be restarted.
    fn close(&mut self);
}

/// Lifecycle notifications published by a device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    NodeStarted { node: NodeId, name: String },
    NodeStopped { node: NodeId, name: String },
    NodeFailed {
        node: NodeId,
        name: String,
        error: RuntimeError,
    },
    /// Every node thread has exited.
    Closed,
}
