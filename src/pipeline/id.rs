//! Identifiers for nodes, ports and links.
//!
//! Node and link ids are positions in the pipeline's storage. A port id packs
//! its owner and its position on that node, so the owner is recovered without
//! a lookup.

use std::fmt;

macro_rules! index_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $label, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} #{}", $label, self.0)
            }
        }
    };
}

index_id!(
    /// Position of a node in its pipeline, in creation order.
    NodeId,
    "node"
);

index_id!(
    /// Sequential link identifier, never reused within a pipeline.
    LinkId,
    "link"
);

/// Port identifier: the owning node in the high 20 bits, the port's position
/// on that node in the low 12.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u32);

impl PortId {
    const PORT_BITS: u32 = 12;
    const PORT_MASK: u32 = (1 << Self::PORT_BITS) - 1;

    /// Ports a single node may own, fixed and dynamic together.
    pub const MAX_PORTS_PER_NODE: usize = 1 << Self::PORT_BITS;

    pub fn new(node: NodeId, port_index: u16) -> Self {
        debug_assert!((port_index as usize) < Self::MAX_PORTS_PER_NODE);
        Self((node.0 << Self::PORT_BITS) | (u32::from(port_index) & Self::PORT_MASK))
    }

    /// `None` once the node has no room left.
    pub fn try_new(node: NodeId, port_index: usize) -> Option<Self> {
        (port_index < Self::MAX_PORTS_PER_NODE).then(|| Self::new(node, port_index as u16))
    }

    #[inline]
    pub fn node(self) -> NodeId {
        NodeId(self.0 >> Self::PORT_BITS)
    }

    #[inline]
    pub fn port_index(self) -> u16 {
        (self.0 & Self::PORT_MASK) as u16
    }
}

impl fmt::Debug for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/port#{}", self.node(), self.port_index())
    }
}
