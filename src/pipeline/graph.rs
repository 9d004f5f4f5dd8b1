//! The pipeline graph: nodes, their ports and the links between them.
//!
//! A [`Pipeline`] is assembled by the caller (`create`, `link`,
//! `request_output`), validated once by [`Pipeline::build`] and then handed to
//! a device. Every node sits behind its own mutex so that port maps and
//! negotiated outputs can grow from several threads while the graph is still
//! mutable; once built, the graph is read-only.

use crate::pipeline::capability::{CapabilityRequest, Residency};
use crate::pipeline::compiled_plan::CompiledPlan;
use crate::pipeline::compiler::PipelineCompiler;
use crate::pipeline::error::{BuildError, NegotiationError};
use crate::pipeline::id::{LinkId, NodeId, PortId};
use crate::pipeline::node::{AnyNode, NodeHandle, NodeKind, NodePlugin, NodeState};
use crate::pipeline::port::{port_key, DatatypeHierarchy, PortDescriptor, PortDirection, PortMapDescriptor};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;

/// Directed edge from an output port to an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub from: PortId,
    pub to: PortId,
}

/// Snapshot of a node for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    pub type_name: String,
    pub state: NodeState,
    pub residency: Residency,
    pub ports: Vec<PortDescriptor>,
}

struct Negotiated {
    request: CapabilityRequest,
    key: String,
    port: PortId,
}

struct NodeSlot {
    name: String,
    type_name: String,
    residency: Residency,
    state: NodeState,
    /// Taken by the device when the node starts running.
    node: Option<AnyNode>,
    ports: Vec<PortDescriptor>,
    lookup: HashMap<String, u16>,
    maps: Vec<PortMapDescriptor>,
    negotiated: Vec<Negotiated>,
}

impl NodeSlot {
    fn new(id: NodeId, name: String, node: AnyNode) -> Result<Self, BuildError> {
        let maps = node.port_maps();
        let mut slot = Self {
            name,
            type_name: node.name().to_string(),
            residency: node.residency(),
            state: NodeState::Constructed,
            ports: Vec::new(),
            lookup: HashMap::new(),
            maps: Vec::new(),
            negotiated: Vec::new(),
            node: None,
        };

        let initial = node
            .ports()
            .into_iter()
            .chain(maps.iter().flat_map(|m| m.initial_keys.iter().map(move |k| m.entry(k))));
        for port in initial {
            slot.push_port(id, port).ok_or_else(|| BuildError::PortLimitReached {
                node: slot.name.clone(),
            })?;
        }

        slot.maps = maps;
        slot.node = Some(node);
        Ok(slot)
    }

    fn push_port(&mut self, id: NodeId, port: PortDescriptor) -> Option<PortId> {
        let port_id = PortId::try_new(id, self.ports.len())?;
        self.lookup.insert(port.key(), port_id.port_index());
        self.ports.push(port);
        Some(port_id)
    }

    fn check_mutable(&self) -> Result<(), BuildError> {
        if self.state.is_mutable() {
            Ok(())
        } else {
            Err(BuildError::AlreadyLinked {
                node: self.name.clone(),
            })
        }
    }

    fn descriptor(&self, port: PortId) -> Result<&PortDescriptor, BuildError> {
        self.ports
            .get(port.port_index() as usize)
            .ok_or_else(|| BuildError::UnknownPort {
                node: self.name.clone(),
                port: format!("#{}", port.port_index()),
            })
    }

    fn qualified(&self, port: &PortDescriptor) -> String {
        format!("{}.{}", self.name, port.key())
    }
}

/// A dataflow graph under construction or ready to run.
pub struct Pipeline {
    nodes: Vec<Mutex<NodeSlot>>,
    names: HashMap<String, NodeId>,
    links: Vec<Link>,
    next_link: u32,
    plan: Option<CompiledPlan>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            names: HashMap::new(),
            links: Vec::new(),
            next_link: 0,
            plan: None,
        }
    }

    fn slot(&self, id: NodeId) -> Result<MutexGuard<'_, NodeSlot>, BuildError> {
        self.nodes
            .get(id.index())
            .map(|m| m.lock())
            .ok_or(BuildError::UnknownNode(id))
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut NodeSlot, BuildError> {
        self.nodes
            .get_mut(id.index())
            .map(|m| m.get_mut())
            .ok_or(BuildError::UnknownNode(id))
    }

    // ─── Node creation ───────────────────────────────────────────────────

    /// Create a built-in node with a generated name (`Camera0`, `Camera1`, ...).
    pub fn create<K: NodeKind>(&mut self, config: K::Config) -> Result<NodeHandle<K>, BuildError> {
        let name = (0..)
            .map(|n| format!("{}{}", K::TYPE_NAME, n))
            .find(|name| !self.names.contains_key(name))
            .unwrap_or_else(|| K::TYPE_NAME.to_string());
        self.create_named(name, config)
    }

    pub fn create_named<K: NodeKind>(
        &mut self,
        name: impl Into<String>,
        config: K::Config,
    ) -> Result<NodeHandle<K>, BuildError> {
        let node = AnyNode::Builtin(K::from_config(config).into_builtin());
        self.insert(name.into(), node).map(NodeHandle::new)
    }

    /// Add a user-defined node.
    pub fn add_plugin(
        &mut self,
        name: impl Into<String>,
        plugin: Box<dyn NodePlugin>,
    ) -> Result<NodeId, BuildError> {
        self.insert(name.into(), AnyNode::Plugin(plugin))
    }

    fn insert(&mut self, name: String, node: AnyNode) -> Result<NodeId, BuildError> {
        if self.plan.is_some() {
            return Err(BuildError::AlreadyLinked { node: name });
        }
        if self.names.contains_key(&name) {
            return Err(BuildError::DuplicateNodeName(name));
        }

        let id = NodeId(self.nodes.len() as u32);
        let slot = NodeSlot::new(id, name.clone(), node)?;
        tracing::debug!(
            "Created {} node '{}' with {} ports",
            slot.type_name,
            name,
            slot.ports.len()
        );
        self.nodes.push(Mutex::new(slot));
        self.names.insert(name, id);
        Ok(id)
    }

    /// Apply configuration to a built-in node. Rejected once linked.
    pub fn configure<K: NodeKind, R>(
        &mut self,
        handle: NodeHandle<K>,
        f: impl FnOnce(&mut K) -> R,
    ) -> Result<R, BuildError> {
        let slot = self.slot_mut(handle.id())?;
        slot.check_mutable()?;
        let node = match slot.node.as_mut() {
            Some(AnyNode::Builtin(node)) => K::from_builtin_mut(node),
            _ => None,
        }
        .ok_or_else(|| BuildError::WrongNodeKind {
            node: slot.name.clone(),
            expected: K::TYPE_NAME,
        })?;
        let result = f(node);
        slot.state = NodeState::Configured;
        Ok(result)
    }

    /// Read a built-in node's configuration. Unavailable while it runs.
    pub fn inspect<K: NodeKind, R>(
        &self,
        handle: NodeHandle<K>,
        f: impl FnOnce(&K) -> R,
    ) -> Result<R, BuildError> {
        let slot = self.slot(handle.id())?;
        let node = match slot.node.as_ref() {
            Some(AnyNode::Builtin(node)) => K::from_builtin(node),
            _ => None,
        }
        .ok_or_else(|| BuildError::WrongNodeKind {
            node: slot.name.clone(),
            expected: K::TYPE_NAME,
        })?;
        Ok(f(node))
    }

    // ─── Ports ───────────────────────────────────────────────────────────

    /// Look up a port by key (`name` or `map.entry`).
    pub fn port(&self, node: NodeId, key: &str) -> Result<PortId, BuildError> {
        let slot = self.slot(node)?;
        slot.lookup
            .get(key)
            .map(|&idx| PortId::new(node, idx))
            .ok_or_else(|| BuildError::UnknownPort {
                node: slot.name.clone(),
                port: key.to_string(),
            })
    }

    pub fn output(&self, node: NodeId, name: &str) -> Result<PortId, BuildError> {
        self.port_with_direction(node, name, PortDirection::Output)
    }

    pub fn input(&self, node: NodeId, name: &str) -> Result<PortId, BuildError> {
        self.port_with_direction(node, name, PortDirection::Input)
    }

    fn port_with_direction(
        &self,
        node: NodeId,
        key: &str,
        direction: PortDirection,
    ) -> Result<PortId, BuildError> {
        let port = self.port(node, key)?;
        let slot = self.slot(node)?;
        let desc = slot.descriptor(port)?;
        if desc.direction != direction {
            return Err(BuildError::DirectionMismatch {
                port: slot.qualified(desc),
                expected: direction,
            });
        }
        Ok(port)
    }

    /// Entry `key` of input map `map`, created on first use.
    pub fn input_map(&self, node: NodeId, map: &str, key: &str) -> Result<PortId, BuildError> {
        self.map_port(node, map, key, PortDirection::Input)
    }

    /// Entry `key` of output map `map`, created on first use.
    pub fn output_map(&self, node: NodeId, map: &str, key: &str) -> Result<PortId, BuildError> {
        self.map_port(node, map, key, PortDirection::Output)
    }

    fn map_port(
        &self,
        node: NodeId,
        map: &str,
        key: &str,
        direction: PortDirection,
    ) -> Result<PortId, BuildError> {
        let mut slot = self.slot(node)?;
        let full_key = port_key(Some(map), key);

        if let Some(&idx) = slot.lookup.get(&full_key) {
            let port = PortId::new(node, idx);
            let desc = slot.descriptor(port)?;
            if desc.direction != direction {
                return Err(BuildError::DirectionMismatch {
                    port: slot.qualified(desc),
                    expected: direction,
                });
            }
            return Ok(port);
        }

        slot.check_mutable()?;
        let entry = slot
            .maps
            .iter()
            .find(|m| m.name == map && m.direction() == direction)
            .map(|m| m.entry(key))
            .ok_or_else(|| BuildError::UnknownPort {
                node: slot.name.clone(),
                port: full_key.clone(),
            })?;
        let port = slot
            .push_port(node, entry)
            .ok_or_else(|| BuildError::PortLimitReached {
                node: slot.name.clone(),
            })?;
        tracing::debug!("Node '{}' gained port '{}'", slot.name, full_key);
        Ok(port)
    }

    /// Change the queue behind an input port.
    pub fn set_input_queue(
        &self,
        port: PortId,
        max_size: usize,
        blocking: bool,
    ) -> Result<(), BuildError> {
        let mut slot = self.slot(port.node())?;
        slot.check_mutable()?;
        let desc = slot.descriptor(port)?;
        let qualified = slot.qualified(desc);
        if desc.direction != PortDirection::Input {
            return Err(BuildError::DirectionMismatch {
                port: qualified,
                expected: PortDirection::Input,
            });
        }
        if max_size == 0 {
            return Err(BuildError::InvalidQueueSize { port: qualified });
        }
        let desc = &mut slot.ports[port.port_index() as usize];
        desc.queue_size = max_size;
        desc.blocking = blocking;
        Ok(())
    }

    /// Descriptor of any port.
    pub fn descriptor(&self, port: PortId) -> Result<PortDescriptor, BuildError> {
        let slot = self.slot(port.node())?;
        slot.descriptor(port).cloned()
    }

    /// Every port of `node`, fixed ones first.
    pub fn ports(&self, node: NodeId) -> Result<Vec<(PortId, PortDescriptor)>, BuildError> {
        let slot = self.slot(node)?;
        Ok(slot
            .ports
            .iter()
            .enumerate()
            .map(|(i, p)| (PortId::new(node, i as u16), p.clone()))
            .collect())
    }

    // ─── Negotiation ─────────────────────────────────────────────────────

    /// Materialize a dynamic output matching `request` on `node`.
    ///
    /// An identical request returns the output created the first time. On
    /// failure the node is left untouched.
    pub fn request_output(
        &self,
        node: NodeId,
        request: CapabilityRequest,
    ) -> Result<PortId, NegotiationError> {
        let mut guard = self
            .nodes
            .get(node.index())
            .ok_or(NegotiationError::UnknownNode(node))?
            .lock();
        let slot = &mut *guard;

        if !slot.state.is_mutable() {
            return Err(NegotiationError::AlreadyLinked {
                node: slot.name.clone(),
            });
        }

        if let Some(existing) = slot.negotiated.iter().find(|n| {
            n.request.same_profile(&request)
                && request.name.as_deref().map_or(true, |name| name == n.key)
        }) {
            return Ok(existing.port);
        }

        let requested = request.kind;
        let map_name = slot
            .maps
            .iter()
            .find(|m| m.direction() == PortDirection::Output)
            .map(|m| m.name.clone())
            .ok_or(NegotiationError::NoCompatibleKind { requested })?;

        if let Some(name) = &request.name {
            if slot.lookup.contains_key(&port_key(Some(&map_name), name)) {
                return Err(NegotiationError::DuplicateOutputName(name.clone()));
            }
        }

        let spec = slot
            .node
            .as_ref()
            .and_then(|n| n.capability_source())
            .ok_or(NegotiationError::NoCompatibleKind { requested })?
            .supports_capability(&request)?;

        let key = match &request.name {
            Some(name) => name.clone(),
            None => (0..)
                .map(|i: u32| i.to_string())
                .find(|k| !slot.lookup.contains_key(&port_key(Some(&map_name), k)))
                .unwrap_or_default(),
        };

        let mut entry = slot
            .maps
            .iter()
            .find(|m| m.name == map_name)
            .map(|m| m.entry(&key))
            .ok_or(NegotiationError::NoCompatibleKind { requested })?;
        entry.types = vec![DatatypeHierarchy::exact(spec.kind)];

        let port = slot
            .push_port(node, entry)
            .ok_or_else(|| NegotiationError::PortLimitReached {
                node: slot.name.clone(),
            })?;
        if let Some(n) = slot.node.as_mut() {
            n.register_dynamic_output(&key, &spec);
        }
        slot.negotiated.push(Negotiated {
            request,
            key: key.clone(),
            port,
        });

        tracing::info!(
            "Node '{}' materialized output '{}.{}': {} {}x{} @ {} fps",
            slot.name,
            map_name,
            key,
            spec.kind,
            spec.width,
            spec.height,
            spec.fps
        );
        Ok(port)
    }

    // ─── Links ───────────────────────────────────────────────────────────

    /// Connect `from` (an output) to `to` (an input).
    ///
    /// Fails without creating an edge when the input does not accept what the
    /// output produces. Linking the same pair twice returns the existing link.
    pub fn link(&mut self, from: PortId, to: PortId) -> Result<LinkId, BuildError> {
        let (out_desc, from_name) = {
            let slot = self.slot_mut(from.node())?;
            slot.check_mutable()?;
            let desc = slot.descriptor(from)?.clone();
            let name = slot.qualified(&desc);
            (desc, name)
        };
        let (in_desc, to_name) = {
            let slot = self.slot_mut(to.node())?;
            slot.check_mutable()?;
            let desc = slot.descriptor(to)?.clone();
            let name = slot.qualified(&desc);
            (desc, name)
        };

        if out_desc.direction != PortDirection::Output {
            return Err(BuildError::DirectionMismatch {
                port: from_name,
                expected: PortDirection::Output,
            });
        }
        if in_desc.direction != PortDirection::Input {
            return Err(BuildError::DirectionMismatch {
                port: to_name,
                expected: PortDirection::Input,
            });
        }
        if !in_desc.accepts_from(&out_desc) {
            return Err(BuildError::TypeMismatch {
                output: from_name,
                input: to_name,
                produced: out_desc.kinds(),
                accepted: in_desc.kinds(),
            });
        }

        if let Some(existing) = self.links.iter().find(|l| l.from == from && l.to == to) {
            return Ok(existing.id);
        }
        if !in_desc.fan_in && self.links.iter().any(|l| l.to == to) {
            return Err(BuildError::InputAlreadyLinked { input: to_name });
        }

        let id = LinkId(self.next_link);
        self.next_link += 1;
        self.links.push(Link { id, from, to });
        tracing::debug!("Linked {} -> {}", from_name, to_name);
        Ok(id)
    }

    /// Remove a link. Returns `false` if it does not exist.
    pub fn unlink(&mut self, id: LinkId) -> Result<bool, BuildError> {
        let Some(link) = self.links.iter().find(|l| l.id == id).copied() else {
            return Ok(false);
        };
        self.slot_mut(link.from.node())?.check_mutable()?;
        self.slot_mut(link.to.node())?.check_mutable()?;
        self.links.retain(|l| l.id != id);
        Ok(true)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Outputs feeding `input`.
    pub fn upstream(&self, input: PortId) -> Vec<PortId> {
        self.links
            .iter()
            .filter(|l| l.to == input)
            .map(|l| l.from)
            .collect()
    }

    /// Inputs fed by `output`.
    pub fn downstream(&self, output: PortId) -> Vec<PortId> {
        self.links
            .iter()
            .filter(|l| l.from == output)
            .map(|l| l.to)
            .collect()
    }

    // ─── Validation ──────────────────────────────────────────────────────

    /// Validate the graph and freeze it.
    ///
    /// On success every node moves to `Linked`. Building twice returns the
    /// same plan. On failure nothing changes, so the graph can be fixed and
    /// built again.
    pub fn build(&mut self) -> Result<&CompiledPlan, BuildError> {
        let plan = match self.plan.take() {
            Some(plan) => plan,
            None => self.compile()?,
        };
        let plan: &CompiledPlan = self.plan.insert(plan);
        Ok(plan)
    }

    fn compile(&mut self) -> Result<CompiledPlan, BuildError> {
        let names: Vec<String> = self
            .nodes
            .iter_mut()
            .map(|m| m.get_mut().name.clone())
            .collect();
        let pairs: Vec<(usize, usize)> = self
            .links
            .iter()
            .map(|l| (l.from.node().index(), l.to.node().index()))
            .collect();

        let plan = PipelineCompiler::compile(&names, &pairs)?;

        for slot in &mut self.nodes {
            let slot = slot.get_mut();
            if slot.state.is_mutable() {
                slot.state = NodeState::Linked;
            }
        }

        tracing::info!(
            "Pipeline built: {} nodes, {} links ({} sources, {} sinks) in {} us",
            plan.stats.total_nodes,
            plan.stats.total_links,
            plan.stats.source_nodes,
            plan.stats.sink_nodes,
            plan.stats.compile_time_us
        );
        for &idx in &plan.isolated_nodes {
            tracing::warn!("Node '{}' has no links", names[idx]);
        }
        Ok(plan)
    }

    pub fn is_built(&self) -> bool {
        self.plan.is_some()
    }

    pub fn plan(&self) -> Option<&CompiledPlan> {
        self.plan.as_ref()
    }

    // ─── Inspection ──────────────────────────────────────────────────────

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn node_name(&self, id: NodeId) -> Result<String, BuildError> {
        Ok(self.slot(id)?.name.clone())
    }

    pub fn node_state(&self, id: NodeId) -> Result<NodeState, BuildError> {
        Ok(self.slot(id)?.state)
    }

    pub fn node_info(&self, id: NodeId) -> Result<NodeInfo, BuildError> {
        let slot = self.slot(id)?;
        Ok(NodeInfo {
            id,
            name: slot.name.clone(),
            type_name: slot.type_name.clone(),
            state: slot.state,
            residency: slot.residency,
            ports: slot.ports.clone(),
        })
    }

    /// Snapshot of every node.
    pub fn topology(&self) -> Vec<NodeInfo> {
        self.node_ids()
            .filter_map(|id| self.node_info(id).ok())
            .collect()
    }

    // ─── Device hooks ────────────────────────────────────────────────────

    pub(crate) fn take_node(&self, id: NodeId) -> Option<AnyNode> {
        self.slot(id).ok()?.node.take()
    }

    pub(crate) fn set_node_state(&self, id: NodeId, state: NodeState) {
        if let Ok(mut slot) = self.slot(id) {
            if state > slot.state {
                slot.state = state;
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
