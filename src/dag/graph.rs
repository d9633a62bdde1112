// src/dag/graph.rs

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::dag::test_info::TestProperties;
use crate::types::TestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Immutable dependency graph over a closed set of tests.
///
/// Node `i` is test `i`; an edge `a -> b` means "a depends on b". Adjacency
/// is cached in both directions since the scheduler walks dependents on
/// every completion.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<TestId, ()>,
    depends: Vec<Vec<TestId>>,
    dependents: Vec<Vec<TestId>>,
}

impl DependencyGraph {
    /// Build the graph. `tests[i].id` must equal `i` and every dependency
    /// must be a valid index.
    pub fn new(tests: &[TestProperties]) -> Self {
        let mut graph = DiGraph::with_capacity(tests.len(), 0);
        for test in tests {
            graph.add_node(test.id);
        }
        for test in tests {
            for &dep in &test.depends {
                graph.update_edge(NodeIndex::new(test.id), NodeIndex::new(dep), ());
            }
        }

        let adjacency = |dir: Direction| -> Vec<Vec<TestId>> {
            graph
                .node_indices()
                .map(|n| {
                    let mut ids: Vec<TestId> =
                        graph.neighbors_directed(n, dir).map(|m| graph[m]).collect();
                    ids.sort_unstable();
                    ids
                })
                .collect()
        };
        let depends = adjacency(Direction::Outgoing);
        let dependents = adjacency(Direction::Incoming);

        Self {
            graph,
            depends,
            dependents,
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tests that `id` waits for.
    pub fn dependencies_of(&self, id: TestId) -> &[TestId] {
        self.depends.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tests that wait for `id`.
    pub fn dependents_of(&self, id: TestId) -> &[TestId] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Depth-first search from every node, tracking the nodes currently on
    /// the search path. Reaching a node that is still on the path closes a
    /// cycle, which is returned in dependency order starting at that node.
    pub fn check_cycles(&self) -> Result<(), Vec<TestId>> {
        let mut marks = vec![Mark::Unvisited; self.len()];

        for root in 0..self.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }

            // (node, index of the next dependency to visit)
            let mut path: Vec<(TestId, usize)> = vec![(root, 0)];
            marks[root] = Mark::OnStack;

            while let Some(top) = path.last_mut() {
                let node = top.0;
                let Some(&dep) = self.depends[node].get(top.1) else {
                    marks[node] = Mark::Done;
                    path.pop();
                    continue;
                };
                top.1 += 1;

                match marks[dep] {
                    Mark::Unvisited => {
                        marks[dep] = Mark::OnStack;
                        path.push((dep, 0));
                    }
                    Mark::OnStack => {
                        let start = path.iter().position(|&(t, _)| t == dep).unwrap_or(0);
                        return Err(path[start..].iter().map(|&(t, _)| t).collect());
                    }
                    Mark::Done => {}
                }
            }
        }

        Ok(())
    }
}
