//! A minimal DAG executor.
//!
//! [`TaskGraph`] holds nodes, each either a unit of work (an *action*) or a
//! no-op fan-in aggregate, plus an immutable list of upstream nodes.
//! [`TaskGraph::run`] executes the whole graph reachable from a root node
//! such that every node's action runs exactly once, only after all of its
//! upstream nodes have completed, with independent nodes running
//! concurrently.
//!
//! `rayon::scope` drives a worker pool draining a dependency-count map,
//! seeded with zero-dependency nodes and fed back through a completion
//! channel.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::channel;

/// Index of a node within a [`TaskGraph`]. Opaque outside this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

type Action = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

struct Node {
    action: Option<Action>,
    upstream: Vec<NodeId>,
}

/// An in-memory task DAG. Construction is single-threaded; [`TaskGraph::run`]
/// is the only operation that touches multiple threads.
#[derive(Default)]
pub struct TaskGraph {
    nodes: Vec<Node>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a work node: `action` runs once every node in `upstream` has
    /// completed successfully.
    pub fn add_node(&mut self, upstream: Vec<NodeId>, action: Action) -> NodeId {
        self.nodes.push(Node {
            action: Some(action),
            upstream,
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Adds a synthetic fan-in aggregate: a no-op node whose only purpose is
    /// to depend on every node in `upstream`, e.g. the root over all
    /// user-requested tasks.
    pub fn add_aggregate(&mut self, upstream: Vec<NodeId>) -> NodeId {
        self.nodes.push(Node {
            action: None,
            upstream,
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Runs the subgraph reachable from `root`. On any node's failure, the
    /// first observed error is returned; downstream nodes of a failed node
    /// are never scheduled, but already-running sibling nodes are allowed to
    /// finish.
    pub fn run(&self, root: NodeId) -> anyhow::Result<()> {
        self.run_with_progress(root, |_settled, _total| {})
    }

    /// The number of nodes reachable from `root`, i.e. the total `run` (or
    /// `run_with_progress`) will settle in one call.
    pub fn reachable_count(&self, root: NodeId) -> usize {
        self.reachable_from(root).len()
    }

    /// As [`TaskGraph::run`], but calling `on_settled(settled, total)` once
    /// per node settled, whether it actually ran or was skipped as a
    /// dependent of a failed node. Used to drive a progress indicator.
    pub fn run_with_progress(
        &self,
        root: NodeId,
        mut on_settled: impl FnMut(usize, usize),
    ) -> anyhow::Result<()> {
        let reachable = self.reachable_from(root);
        if reachable.is_empty() {
            return Ok(());
        }

        // Fan-out count per node, restricted to the reachable subgraph, so a
        // node only runs once every upstream node *we intend to run* has
        // completed.
        let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut pending_deps: HashMap<NodeId, usize> = HashMap::new();

        for &id in &reachable {
            let upstream: Vec<NodeId> = self.nodes[id.0]
                .upstream
                .iter()
                .copied()
                .filter(|u| reachable.contains(u))
                .collect();

            pending_deps.insert(id, upstream.len());
            for up in upstream {
                dependents.entry(up).or_default().push(id);
            }
        }

        let total = reachable.len();
        // A node is settled once its fate is known: it either ran (and sent a
        // message on `tx`) or was transitively skipped because one of its
        // upstream nodes failed. The wait loop below only drains `rx`, so a
        // skipped node must still be counted here or `settled.len()` would
        // never reach `total` and the loop would block forever.
        let mut settled: HashSet<NodeId> = HashSet::new();
        let mut first_error: Option<anyhow::Error> = None;

        rayon::scope(|scope| {
            let (tx, rx) = channel::<(NodeId, anyhow::Result<()>)>();

            let spawn = |id: NodeId, tx: std::sync::mpsc::Sender<(NodeId, anyhow::Result<()>)>| {
                match &self.nodes[id.0].action {
                    None => {
                        tx.send((id, Ok(()))).ok();
                    }
                    Some(action) => {
                        scope.spawn(move |_| {
                            let result =
                                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                                    action()
                                }))
                                .unwrap_or_else(|payload| Err(anyhow::anyhow!(panic_message(payload))));
                            tx.send((id, result)).ok();
                        });
                    }
                }
            };

            for &id in &reachable {
                if pending_deps[&id] == 0 {
                    spawn(id, tx.clone());
                }
            }

            while settled.len() < total {
                let Ok((id, result)) = rx.recv() else {
                    break;
                };
                settled.insert(id);
                on_settled(settled.len(), total);

                if let Err(err) = result {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                    // This node's dependents (transitively) will never run;
                    // settle them here rather than leaving them pending
                    // forever.
                    let mut skip_queue: Vec<NodeId> =
                        dependents.get(&id).cloned().unwrap_or_default();
                    while let Some(child) = skip_queue.pop() {
                        if settled.insert(child) {
                            on_settled(settled.len(), total);
                            if let Some(next) = dependents.get(&child) {
                                skip_queue.extend(next.iter().copied());
                            }
                        }
                    }
                    continue;
                }

                if let Some(next) = dependents.get(&id) {
                    for &child in next {
                        let count = pending_deps.get_mut(&child).unwrap();
                        *count -= 1;
                        // `child` may already be settled: a sibling upstream
                        // of `child` could have failed and skipped it before
                        // this, its last surviving upstream, completed.
                        if *count == 0 && !settled.contains(&child) {
                            spawn(child, tx.clone());
                        }
                    }
                }
            }
        });

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn reachable_from(&self, root: NodeId) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            if seen.insert(id) {
                stack.extend(self.nodes[id.0].upstream.iter().copied());
            }
        }

        seen
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("task panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("task panicked: {s}")
    } else {
        "task panicked with unknown payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn diamond_dependency_runs_each_node_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();

        let c = counter.clone();
        let a = graph.add_node(
            vec![],
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let c = counter.clone();
        let b1 = graph.add_node(
            vec![a],
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let c = counter.clone();
        let b2 = graph.add_node(
            vec![a],
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let c = counter.clone();
        let d = graph.add_node(
            vec![b1, b2],
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let root = graph.add_aggregate(vec![d]);
        graph.run(root).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn failure_propagates_as_first_error() {
        let mut graph = TaskGraph::new();
        let a = graph.add_node(vec![], Box::new(|| Err(anyhow::anyhow!("boom"))));
        let b = graph.add_node(vec![a], Box::new(|| Ok(())));
        let root = graph.add_aggregate(vec![b]);

        let err = graph.run(root).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    // A failure's dependents can fan out through more than one path (here a
    // diamond merging back into the root aggregate); every one of them must
    // still be settled or `run` would block on the wait loop forever.
    #[test]
    fn failure_with_multiple_dependents_does_not_hang() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();

        let a = graph.add_node(vec![], Box::new(|| Err(anyhow::anyhow!("boom"))));

        let c = counter.clone();
        let b1 = graph.add_node(
            vec![a],
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let c = counter.clone();
        let b2 = graph.add_node(
            vec![],
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let c = counter.clone();
        let d = graph.add_node(
            vec![a, b2],
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let root = graph.add_aggregate(vec![b1, d]);

        let err = graph.run(root).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        // b1 and d both have `a` as an upstream and must never run.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
