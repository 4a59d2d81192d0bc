//! Single-threaded graph construction.
//!
//! Walks each requested task's `dependencies()` recursively, memoising on
//! task identity so a task shared by multiple parents becomes a single
//! graph node, and rejecting a task that is reached while still on the
//! current recursion stack as a cyclic dependency.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::engine::context::BuildExecutionContext;
use crate::engine::step;
use crate::error::IsodError;
use crate::graph::{NodeId, TaskGraph};
use crate::task::{BuildTask, TaskKey};

pub(crate) fn build_graph(
    context: &Arc<BuildExecutionContext>,
    graph: &mut TaskGraph,
    tasks: &[Arc<dyn BuildTask>],
) -> Result<NodeId, IsodError> {
    let mut memo: HashMap<TaskKey, NodeId> = HashMap::new();
    let mut in_progress: HashSet<TaskKey> = HashSet::new();

    let mut roots = Vec::with_capacity(tasks.len());
    for task in tasks {
        roots.push(get_or_create(context, graph, &mut memo, &mut in_progress, task)?);
    }

    Ok(graph.add_aggregate(roots))
}

fn get_or_create(
    context: &Arc<BuildExecutionContext>,
    graph: &mut TaskGraph,
    memo: &mut HashMap<TaskKey, NodeId>,
    in_progress: &mut HashSet<TaskKey>,
    task: &Arc<dyn BuildTask>,
) -> Result<NodeId, IsodError> {
    let key = TaskKey::of(task);

    if let Some(&id) = memo.get(&key) {
        return Ok(id);
    }

    if !in_progress.insert(key) {
        return Err(IsodError::CyclicDependency { name: task.name() });
    }

    let mut upstream = Vec::with_capacity(task.dependencies().len());
    for dep in task.dependencies() {
        upstream.push(get_or_create(context, graph, memo, in_progress, dep)?);
    }

    in_progress.remove(&key);

    let action = step::make_step(context.clone(), task.clone());
    let id = graph.add_node(upstream, action);
    memo.insert(key, id);

    Ok(id)
}
