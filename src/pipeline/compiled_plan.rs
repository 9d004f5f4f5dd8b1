/// Validated execution plan for a pipeline graph.
///
/// Produced once by `Pipeline::build`; the graph is read-only afterwards.
#[derive(Debug, Clone)]
pub struct CompiledPlan {
    /// Node indices in topological order (producers before consumers)
    pub execution_order: Vec<usize>,

    /// Node-level routing (from_idx, to_idx), one entry per distinct pair
    pub edges: Vec<(usize, usize)>,

    /// Compilation statistics
    pub stats: PlanStats,

    /// Nodes with no link at all
    pub isolated_nodes: Vec<usize>,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    /// Total number of nodes in the graph
    pub total_nodes: usize,

    /// Number of links, fan-out counted per destination
    pub total_links: usize,

    /// Nodes with outgoing but no incoming links
    pub source_nodes: usize,

    /// Nodes with incoming but no outgoing links
    pub sink_nodes: usize,

    /// Nodes with neither
    pub isolated_nodes: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl CompiledPlan {
    pub fn new() -> Self {
        Self {
            execution_order: Vec::new(),
            edges: Vec::new(),
            stats: PlanStats::default(),
            isolated_nodes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.execution_order.is_empty()
    }

    /// Position of `node` in the execution order.
    pub fn position(&self, node: usize) -> Option<usize> {
        self.execution_order.iter().position(|&n| n == node)
    }
}

impl Default for CompiledPlan {
    fn default() -> Self {
        Self::new()
    }
}
