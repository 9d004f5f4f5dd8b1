//! Typed dataflow graph.
//!
//! Nodes declare typed ports; links are validated when created; source nodes
//! can materialize extra outputs on request; the finished graph is validated
//! once and handed to a device, which runs each node against bounded queues.
//!
//! # Architecture
//!
//! ```text
//! [Camera A] ──preview──► inputs.rgb_in  ┐
//!                                        ├─[StreamSync]─► outputs.*_out ─► [XLinkOut] ─► host queue
//! [Camera B] ──preview──► inputs.disp_in ┘
//! ```
//!
//! # Design
//!
//! - **Enum dispatch** for built-in nodes (`BuiltinNode`), trait objects for plugins.
//! - **Compact IDs**: `PortId` packs node and port index into one `u32`.
//! - **Per-node mutex** so negotiation and port-map growth are thread-safe.
//! - **Frozen after build**: `Pipeline::build` validates once; later mutation
//!   fails with `AlreadyLinked`.

pub mod capability;
pub mod compiled_plan;
pub mod compiler;
pub mod error;
pub mod graph;
pub mod id;
pub mod message;
pub mod node;
pub mod nodes;
pub mod port;
pub mod queue;
pub mod synchronizer;

pub use capability::{
    best_fit, scaled_size, CapabilityRequest, CapabilitySource, OutputSpec, Residency,
    ScaleFactor, ScaleFit, MAX_SCALE_DENOMINATOR, MAX_SCALE_NUMERATOR,
};
pub use compiled_plan::{CompiledPlan, PlanStats};
pub use error::{BuildError, NegotiationError, PipelineError, PipelineResult, RuntimeError};
pub use graph::{Link, NodeInfo, Pipeline};
pub use id::{LinkId, NodeId, PortId};
pub use message::{
    CameraBoardSocket, CameraControl, DatatypeKind, FrameType, ImageManipConfig, ImgFrame,
    Message, NNData, Payload, SharedMessage, Timestamped,
};
pub use node::{AnyNode, BuiltinNode, HostStream, NodeContext, NodeHandle, NodeKind, NodePlugin, NodeState};
pub use port::{DatatypeHierarchy, PortDescriptor, PortDirection, PortMapDescriptor, DEFAULT_QUEUE_SIZE};
pub use queue::MessageQueue;
pub use synchronizer::{StreamSynchronizer, SyncConfig, SyncStats, SyncedSet};
