//! Pipeline-specific error types.
//!
//! Errors are split by the phase that reports them: graph assembly
//! ([`BuildError`]), output negotiation ([`NegotiationError`]) and execution
//! ([`RuntimeError`]). [`PipelineError`] wraps all three.

use crate::pipeline::capability::Residency;
use crate::pipeline::message::DatatypeKind;
use crate::pipeline::port::PortDirection;
use thiserror::Error;

/// Graph assembly errors. Never produced once the device is running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("Type mismatch: {output} produces {produced:?}, {input} accepts {accepted:?}")]
    TypeMismatch {
        output: String,
        input: String,
        produced: Vec<DatatypeKind>,
        accepted: Vec<DatatypeKind>,
    },

    #[error("Node '{node}' is already linked; the graph can no longer change")]
    AlreadyLinked { node: String },

    #[error("Cycle detected in pipeline graph through nodes {nodes:?}")]
    CyclicDependency { nodes: Vec<String> },

    #[error("Unknown {0}")]
    UnknownNode(crate::pipeline::id::NodeId),

    #[error("Node '{node}' has no port '{port}'")]
    UnknownPort { node: String, port: String },

    #[error("Port '{port}' is not an {expected:?} port")]
    DirectionMismatch {
        port: String,
        expected: PortDirection,
    },

    #[error("Input '{input}' already has an upstream link")]
    InputAlreadyLinked { input: String },

    #[error("A node named '{0}' already exists")]
    DuplicateNodeName(String),

    #[error("Queue size for '{port}' must be at least 1")]
    InvalidQueueSize { port: String },

    #[error("Node '{node}' cannot hold more ports")]
    PortLimitReached { node: String },

    #[error("Node {node} is not a {expected}")]
    WrongNodeKind {
        node: String,
        expected: &'static str,
    },
}

/// Capability negotiation errors. Reported synchronously; pipeline state is
/// left untouched so the caller may retry with a different request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NegotiationError {
    #[error("Node cannot produce {requested}")]
    NoCompatibleKind { requested: DatatypeKind },

    #[error("Requested {axis} {requested} is not reachable from {input} with the scaler bounds")]
    ScaleOutOfBounds {
        axis: &'static str,
        input: u32,
        requested: u32,
    },

    #[error("Node produces on {available:?}, {requested:?} residency requested")]
    UnsupportedResidency {
        requested: Residency,
        available: Residency,
    },

    #[error("Requested {requested} fps exceeds the source rate of {max} fps")]
    UnsupportedFrameRate { requested: f32, max: f32 },

    #[error("Dynamic output '{0}' already exists for a different request")]
    DuplicateOutputName(String),

    #[error("Node '{node}' is already linked; no new outputs can be requested")]
    AlreadyLinked { node: String },

    #[error("Node '{node}' cannot hold more ports")]
    PortLimitReached { node: String },

    #[error("Unknown {0}")]
    UnknownNode(crate::pipeline::id::NodeId),
}

/// Errors surfaced while the graph executes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Graph rejected: {0}")]
    GraphRejected(String),

    #[error("Queue '{0}' is closed")]
    QueueClosed(String),

    #[error("No stream named '{0}'")]
    UnknownStream(String),

    #[error("Queue size for '{0}' must be at least 1")]
    InvalidQueueSize(String),

    #[error("Node '{node}' failed: {message}")]
    NodeFailed { node: String, message: String },
}

impl RuntimeError {
    /// Whether this error only signals that a queue was torn down.
    pub fn is_closed(&self) -> bool {
        matches!(self, RuntimeError::QueueClosed(_))
    }
}

/// Errors that can occur within the pipeline system.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
