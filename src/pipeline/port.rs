//! Port descriptors for the node system.
//!
//! Each node declares its fixed ports (inputs/outputs) as `PortDescriptor`s,
//! plus optional named port maps whose entries are created on demand. The
//! pipeline uses the declared datatypes to validate links, and the input's
//! queue settings to size the runtime queue behind it.

use crate::pipeline::message::DatatypeKind;
use std::fmt;

/// Default depth of an input queue.
pub const DEFAULT_QUEUE_SIZE: usize = 8;

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

/// One accepted or produced datatype.
///
/// With `descendants` set on an input, every kind derived from `kind` is
/// accepted as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatatypeHierarchy {
    pub kind: DatatypeKind,
    pub descendants: bool,
}

impl DatatypeHierarchy {
    pub const fn exact(kind: DatatypeKind) -> Self {
        Self {
            kind,
            descendants: false,
        }
    }

    pub const fn with_descendants(kind: DatatypeKind) -> Self {
        Self {
            kind,
            descendants: true,
        }
    }

    /// Accepts every message kind.
    pub const fn any() -> Self {
        Self::with_descendants(DatatypeKind::Buffer)
    }

    /// Whether a port declaring `self` accepts messages of `produced`.
    pub fn accepts(&self, produced: DatatypeKind) -> bool {
        if self.descendants {
            produced.is_derived_from(self.kind)
        } else {
            produced == self.kind
        }
    }
}

/// Descriptor for a node's port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortDescriptor {
    /// Name of the port map this port belongs to, `None` for fixed ports.
    pub group: Option<String>,
    pub name: String,
    pub direction: PortDirection,
    pub types: Vec<DatatypeHierarchy>,
    /// Input queue capacity. Ignored for outputs.
    pub queue_size: usize,
    /// Blocking inputs apply backpressure; non-blocking ones drop the oldest.
    pub blocking: bool,
    /// Inputs that may receive several upstream links.
    pub fan_in: bool,
}

impl PortDescriptor {
    pub fn input(name: impl Into<String>, types: &[DatatypeHierarchy]) -> Self {
        Self {
            group: None,
            name: name.into(),
            direction: PortDirection::Input,
            types: types.to_vec(),
            queue_size: DEFAULT_QUEUE_SIZE,
            blocking: true,
            fan_in: false,
        }
    }

    pub fn output(name: impl Into<String>, types: &[DatatypeHierarchy]) -> Self {
        Self {
            group: None,
            name: name.into(),
            direction: PortDirection::Output,
            types: types.to_vec(),
            queue_size: DEFAULT_QUEUE_SIZE,
            blocking: true,
            fan_in: false,
        }
    }

    pub fn queue_size(mut self, size: usize) -> Self {
        self.queue_size = size;
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn fan_in(mut self, fan_in: bool) -> Self {
        self.fan_in = fan_in;
        self
    }

    pub(crate) fn in_group(mut self, group: &str, name: &str) -> Self {
        self.group = Some(group.to_string());
        self.name = name.to_string();
        self
    }

    /// Lookup key: `name` for fixed ports, `group.name` for map entries.
    pub fn key(&self) -> String {
        port_key(self.group.as_deref(), &self.name)
    }

    /// Whether this input accepts anything produced by `output`.
    pub fn accepts_from(&self, output: &PortDescriptor) -> bool {
        output
            .types
            .iter()
            .any(|out| self.types.iter().any(|inp| inp.accepts(out.kind)))
    }

    pub fn kinds(&self) -> Vec<DatatypeKind> {
        self.types.iter().map(|t| t.kind).collect()
    }
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Build the lookup key of a port.
pub fn port_key(group: Option<&str>, name: &str) -> String {
    match group {
        Some(group) => format!("{}.{}", group, name),
        None => name.to_string(),
    }
}

/// Declaration of a growable, string-keyed collection of ports.
///
/// Entries are cloned from `template` with the entry name filled in.
#[derive(Debug, Clone)]
pub struct PortMapDescriptor {
    pub name: String,
    pub template: PortDescriptor,
    /// Entries created together with the node.
    pub initial_keys: Vec<String>,
}

impl PortMapDescriptor {
    pub fn new(name: impl Into<String>, template: PortDescriptor) -> Self {
        Self {
            name: name.into(),
            template,
            initial_keys: Vec::new(),
        }
    }

    pub fn with_keys(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.initial_keys = keys.into_iter().collect();
        self
    }

    pub fn direction(&self) -> PortDirection {
        self.template.direction
    }

    /// Descriptor for the entry `key`.
    pub fn entry(&self, key: &str) -> PortDescriptor {
        self.template.clone().in_group(&self.name, key)
    }
}
