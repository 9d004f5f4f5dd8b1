use super::compiled_plan::{CompiledPlan, PlanStats};
use super::error::BuildError;
use std::collections::VecDeque;

/// Validates a pipeline graph and orders it for execution.
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// Compile a graph of `node_names.len()` nodes connected by node-level
    /// `links` (`(from_idx, to_idx)`, one entry per port link).
    ///
    /// Fails with `CyclicDependency` naming every node left on a cycle.
    pub fn compile(
        node_names: &[String],
        links: &[(usize, usize)],
    ) -> Result<CompiledPlan, BuildError> {
        let start_time = std::time::Instant::now();

        let n = node_names.len();
        let (fwd_adj, edges) = Self::build_adjacency(n, links);

        let execution_order = Self::topological_sort(n, &fwd_adj);
        if execution_order.len() < n {
            let mut placed = vec![false; n];
            for &idx in &execution_order {
                placed[idx] = true;
            }
            let nodes = (0..n)
                .filter(|&i| !placed[i])
                .map(|i| node_names[i].clone())
                .collect();
            return Err(BuildError::CyclicDependency { nodes });
        }

        let mut has_in = vec![false; n];
        let mut has_out = vec![false; n];
        for &(from, to) in &edges {
            has_out[from] = true;
            has_in[to] = true;
        }

        let isolated_nodes: Vec<usize> = (0..n).filter(|&i| !has_in[i] && !has_out[i]).collect();

        let stats = PlanStats {
            total_nodes: n,
            total_links: links.len(),
            source_nodes: (0..n).filter(|&i| has_out[i] && !has_in[i]).count(),
            sink_nodes: (0..n).filter(|&i| has_in[i] && !has_out[i]).count(),
            isolated_nodes: isolated_nodes.len(),
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        Ok(CompiledPlan {
            execution_order,
            edges,
            stats,
            isolated_nodes,
        })
    }

    /// Forward adjacency plus the deduplicated node-level edge list.
    fn build_adjacency(n: usize, links: &[(usize, usize)]) -> (Vec<Vec<usize>>, Vec<(usize, usize)>) {
        let mut fwd_adj = vec![Vec::new(); n];
        let mut edges = Vec::new();

        for &(from, to) in links {
            if from >= n || to >= n {
                continue;
            }
            if !fwd_adj[from].contains(&to) {
                fwd_adj[from].push(to);
                edges.push((from, to));
            }
        }

        (fwd_adj, edges)
    }

    /// Kahn's algorithm. Nodes on a cycle never reach in-degree 0 and are
    /// missing from the result.
    fn topological_sort(n: usize, adj: &[Vec<usize>]) -> Vec<usize> {
        let mut in_degree = vec![0usize; n];
        for targets in adj {
            for &to in targets {
                in_degree[to] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut result = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            result.push(node);
            for &neighbor in &adj[node] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("n{}", i)).collect()
    }

    #[test]
    fn test_compile_empty() {
        let plan = PipelineCompiler::compile(&[], &[]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.stats, PlanStats {
            compile_time_us: plan.stats.compile_time_us,
            ..PlanStats::default()
        });
    }

    #[test]
    fn test_compile_orders_producers_first() {
        // [n2] → [n0] → [n1]
        let plan = PipelineCompiler::compile(&names(3), &[(2, 0), (0, 1)]).unwrap();
        assert_eq!(plan.execution_order, vec![2, 0, 1]);
        assert_eq!(plan.stats.source_nodes, 1);
        assert_eq!(plan.stats.sink_nodes, 1);
        assert!(plan.isolated_nodes.is_empty());
    }

    #[test]
    fn test_compile_fan_out_and_duplicates() {
        // Two port links between the same pair count once as an edge.
        let plan = PipelineCompiler::compile(&names(3), &[(0, 1), (0, 1), (0, 2)]).unwrap();
        assert_eq!(plan.edges, vec![(0, 1), (0, 2)]);
        assert_eq!(plan.stats.total_links, 3);
        assert_eq!(plan.stats.sink_nodes, 2);
        assert_eq!(plan.position(0), Some(0));
    }

    #[test]
    fn test_compile_isolated_node() {
        let plan = PipelineCompiler::compile(&names(3), &[(0, 1)]).unwrap();
        assert_eq!(plan.isolated_nodes, vec![2]);
        assert_eq!(plan.stats.isolated_nodes, 1);
        assert_eq!(plan.execution_order.len(), 3);
    }

    #[test]
    fn test_compile_rejects_cycle() {
        // [n0] → [n1] → [n2] → [n1], plus a clean [n3]
        let err = PipelineCompiler::compile(&names(4), &[(0, 1), (1, 2), (2, 1)]).unwrap_err();
        assert_eq!(
            err,
            BuildError::CyclicDependency {
                nodes: vec!["n1".to_string(), "n2".to_string()]
            }
        );
    }

    #[test]
    fn test_compile_rejects_self_loop() {
        let err = PipelineCompiler::compile(&names(1), &[(0, 0)]).unwrap_err();
        assert!(matches!(err, BuildError::CyclicDependency { .. }));
    }
}
