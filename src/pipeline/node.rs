//! Node abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`NodePlugin` trait**: the behaviour every node provides (ports,
//!   optional capability negotiation, run loop). User-defined nodes implement
//!   it directly.
//! - **`BuiltinNode` enum**: all built-in nodes. Calls are dispatched with a
//!   `match`, no vtable.
//!
//! `AnyNode` wraps either variant so the pipeline can handle both uniformly.
//!
//! At runtime each node gets a [`NodeContext`] holding the queues behind its
//! linked ports.

use crate::pipeline::capability::{CapabilitySource, OutputSpec, Residency};
use crate::pipeline::error::RuntimeError;
use crate::pipeline::id::NodeId;
use crate::pipeline::message::SharedMessage;
use crate::pipeline::nodes::{
    CameraNode, NeuralNetworkNode, ProducerNode, StreamSyncNode, XLinkInNode, XLinkOutNode,
};
use crate::pipeline::port::{PortDescriptor, PortMapDescriptor};
use crate::pipeline::queue::MessageQueue;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of a node. Ordered: a node only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeState {
    Constructed,
    Configured,
    Linked,
    Running,
    Stopped,
}

impl NodeState {
    /// Whether ports, links and negotiated outputs may still change.
    pub fn is_mutable(self) -> bool {
        self < NodeState::Linked
    }
}

/// Host-facing stream a bridge node exposes on the device.
#[derive(Debug, Clone, PartialEq)]
pub enum HostStream {
    /// Device → host. The host drains it with `get_output_queue`.
    Output { name: String },
    /// Host → device. The host pushes into it with `get_input_queue`.
    Input {
        name: String,
        max_size: usize,
        blocking: bool,
    },
}

impl HostStream {
    pub fn name(&self) -> &str {
        match self {
            HostStream::Output { name } | HostStream::Input { name, .. } => name,
        }
    }
}

/// Queues and clock handed to a node while it runs.
pub struct NodeContext {
    node_id: NodeId,
    node_name: String,
    inputs: HashMap<String, Arc<MessageQueue>>,
    outputs: HashMap<String, Vec<Arc<MessageQueue>>>,
    host_queue: Option<Arc<MessageQueue>>,
    running: Arc<AtomicBool>,
    clock: Instant,
    poll_interval: Duration,
}

impl NodeContext {
    pub fn new(
        node_id: NodeId,
        node_name: impl Into<String>,
        running: Arc<AtomicBool>,
        clock: Instant,
        poll_interval: Duration,
    ) -> Self {
        Self {
            node_id,
            node_name: node_name.into(),
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            host_queue: None,
            running,
            clock,
            poll_interval,
        }
    }

    pub fn attach_input(&mut self, key: impl Into<String>, queue: Arc<MessageQueue>) {
        self.inputs.insert(key.into(), queue);
    }

    pub fn attach_output(&mut self, key: impl Into<String>, queue: Arc<MessageQueue>) {
        self.outputs.entry(key.into()).or_default().push(queue);
    }

    pub fn set_host_queue(&mut self, queue: Arc<MessageQueue>) {
        self.host_queue = Some(queue);
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// False once the device started shutting down.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Device clock: time since the session started.
    pub fn timestamp(&self) -> Duration {
        self.clock.elapsed()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Sleep one poll interval. Used by loops with nothing to do.
    pub fn idle(&self) {
        std::thread::sleep(self.poll_interval);
    }

    /// Queue behind a linked input, `None` when nothing feeds it.
    pub fn input(&self, key: &str) -> Option<&Arc<MessageQueue>> {
        self.inputs.get(key)
    }

    /// Every linked input, keyed like its port.
    pub fn inputs(&self) -> impl Iterator<Item = (&str, &Arc<MessageQueue>)> {
        self.inputs.iter().map(|(k, q)| (k.as_str(), q))
    }

    /// Whether anything consumes `key`.
    pub fn is_linked(&self, key: &str) -> bool {
        self.outputs.get(key).is_some_and(|q| !q.is_empty())
    }

    pub fn linked_outputs(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    /// Deliver `msg` to every input linked to output `key`.
    ///
    /// Blocking destinations may suspend the caller. Sending on an unlinked
    /// output is a no-op.
    pub fn send(&self, key: &str, msg: SharedMessage) -> Result<(), RuntimeError> {
        if let Some(queues) = self.outputs.get(key) {
            for queue in queues {
                queue.send(msg.clone())?;
            }
        }
        Ok(())
    }

    /// The host stream queue of a bridge node.
    pub fn host_queue(&self) -> Result<&Arc<MessageQueue>, RuntimeError> {
        self.host_queue
            .as_ref()
            .ok_or_else(|| RuntimeError::UnknownStream(self.node_name.clone()))
    }
}

/// Behaviour of a graph node.
pub trait NodePlugin: Send {
    /// Type name, e.g. `"Camera"`.
    fn name(&self) -> &str;

    /// Fixed ports, created with the node.
    fn ports(&self) -> Vec<PortDescriptor>;

    /// Growable port maps.
    fn port_maps(&self) -> Vec<PortMapDescriptor> {
        Vec::new()
    }

    /// Where the node executes.
    fn residency(&self) -> Residency {
        Residency::Host
    }

    /// Nodes that materialize outputs on request return themselves here.
    fn capability_source(&self) -> Option<&dyn CapabilitySource> {
        None
    }

    /// Called once a negotiated output was added to the node's output map.
    fn register_dynamic_output(&mut self, _key: &str, _spec: &OutputSpec) {}

    /// Bridge nodes name the host stream they serve.
    fn host_stream(&self) -> Option<HostStream> {
        None
    }

    /// Execute until the context stops running or a queue closes.
    fn run(&mut self, ctx: &mut NodeContext) -> Result<(), RuntimeError>;
}

/// Enum dispatch for built-in nodes.
pub enum BuiltinNode {
    Camera(CameraNode),
    NeuralNetwork(NeuralNetworkNode),
    StreamSync(StreamSyncNode),
    XLinkIn(XLinkInNode),
    XLinkOut(XLinkOutNode),
    Producer(ProducerNode),
}

macro_rules! dispatch {
    ($self:expr, $n:ident => $body:expr) => {
        match $self {
            BuiltinNode::Camera($n) => $body,
            BuiltinNode::NeuralNetwork($n) => $body,
            BuiltinNode::StreamSync($n) => $body,
            BuiltinNode::XLinkIn($n) => $body,
            BuiltinNode::XLinkOut($n) => $body,
            BuiltinNode::Producer($n) => $body,
        }
    };
}

impl BuiltinNode {
    pub fn name(&self) -> &str {
        dispatch!(self, n => n.name())
    }

    pub fn ports(&self) -> Vec<PortDescriptor> {
        dispatch!(self, n => n.ports())
    }

    pub fn port_maps(&self) -> Vec<PortMapDescriptor> {
        dispatch!(self, n => n.port_maps())
    }

    pub fn residency(&self) -> Residency {
        dispatch!(self, n => n.residency())
    }

    pub fn capability_source(&self) -> Option<&dyn CapabilitySource> {
        dispatch!(self, n => n.capability_source())
    }

    pub fn register_dynamic_output(&mut self, key: &str, spec: &OutputSpec) {
        dispatch!(self, n => n.register_dynamic_output(key, spec))
    }

    pub fn host_stream(&self) -> Option<HostStream> {
        dispatch!(self, n => n.host_stream())
    }

    pub fn run(&mut self, ctx: &mut NodeContext) -> Result<(), RuntimeError> {
        dispatch!(self, n => n.run(ctx))
    }
}

/// Wrapper that holds either a built-in node (enum dispatch) or a plugin (trait object).
pub enum AnyNode {
    Builtin(BuiltinNode),
    Plugin(Box<dyn NodePlugin>),
}

impl AnyNode {
    pub fn name(&self) -> &str {
        match self {
            AnyNode::Builtin(n) => n.name(),
            AnyNode::Plugin(n) => n.name(),
        }
    }

    pub fn ports(&self) -> Vec<PortDescriptor> {
        match self {
            AnyNode::Builtin(n) => n.ports(),
            AnyNode::Plugin(n) => n.ports(),
        }
    }

    pub fn port_maps(&self) -> Vec<PortMapDescriptor> {
        match self {
            AnyNode::Builtin(n) => n.port_maps(),
            AnyNode::Plugin(n) => n.port_maps(),
        }
    }

    pub fn residency(&self) -> Residency {
        match self {
            AnyNode::Builtin(n) => n.residency(),
            AnyNode::Plugin(n) => n.residency(),
        }
    }

    pub fn capability_source(&self) -> Option<&dyn CapabilitySource> {
        match self {
            AnyNode::Builtin(n) => n.capability_source(),
            AnyNode::Plugin(n) => n.capability_source(),
        }
    }

    pub fn register_dynamic_output(&mut self, key: &str, spec: &OutputSpec) {
        match self {
            AnyNode::Builtin(n) => n.register_dynamic_output(key, spec),
            AnyNode::Plugin(n) => n.register_dynamic_output(key, spec),
        }
    }

    pub fn host_stream(&self) -> Option<HostStream> {
        match self {
            AnyNode::Builtin(n) => n.host_stream(),
            AnyNode::Plugin(n) => n.host_stream(),
        }
    }

    pub fn run(&mut self, ctx: &mut NodeContext) -> Result<(), RuntimeError> {
        match self {
            AnyNode::Builtin(n) => n.run(ctx),
            AnyNode::Plugin(n) => n.run(ctx),
        }
    }
}

/// Built-in node types that can be created from a config value.
pub trait NodeKind: NodePlugin + Sized + 'static {
    type Config;

    /// Prefix for generated node names.
    const TYPE_NAME: &'static str;

    fn from_config(config: Self::Config) -> Self;
    fn into_builtin(self) -> BuiltinNode;
    fn from_builtin(node: &BuiltinNode) -> Option<&Self>;
    fn from_builtin_mut(node: &mut BuiltinNode) -> Option<&mut Self>;
}

macro_rules! impl_node_kind {
    ($ty:ty, $variant:ident, $config:ty, $type_name:literal) => {
        impl NodeKind for $ty {
            type Config = $config;
            const TYPE_NAME: &'static str = $type_name;

            fn from_config(config: Self::Config) -> Self {
                <$ty>::new(config)
            }

            fn into_builtin(self) -> BuiltinNode {
                BuiltinNode::$variant(self)
            }

            fn from_builtin(node: &BuiltinNode) -> Option<&Self> {
                match node {
                    BuiltinNode::$variant(n) => Some(n),
                    _ => None,
                }
            }

            fn from_builtin_mut(node: &mut BuiltinNode) -> Option<&mut Self> {
                match node {
                    BuiltinNode::$variant(n) => Some(n),
                    _ => None,
                }
            }
        }
    };
}

impl_node_kind!(CameraNode, Camera, crate::pipeline::nodes::CameraConfig, "Camera");
impl_node_kind!(
    NeuralNetworkNode,
    NeuralNetwork,
    crate::pipeline::nodes::NeuralNetworkConfig,
    "NeuralNetwork"
);
impl_node_kind!(
    StreamSyncNode,
    StreamSync,
    crate::pipeline::nodes::StreamSyncConfig,
    "StreamSync"
);
impl_node_kind!(XLinkInNode, XLinkIn, crate::pipeline::nodes::XLinkInConfig, "XLinkIn");
impl_node_kind!(XLinkOutNode, XLinkOut, crate::pipeline::nodes::XLinkOutConfig, "XLinkOut");
impl_node_kind!(ProducerNode, Producer, crate::pipeline::nodes::ProducerConfig, "Producer");

/// Typed reference to a node in a `Pipeline`.
pub struct NodeHandle<K> {
    id: NodeId,
    _kind: PhantomData<fn() -> K>,
}

impl<K> NodeHandle<K> {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            _kind: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl<K> Clone for NodeHandle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for NodeHandle<K> {}

impl<K> std::fmt::Debug for NodeHandle<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeHandle({:?})", self.id)
    }
}
