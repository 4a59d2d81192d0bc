//! The action each non-aggregate [`crate::graph::TaskGraph`] node runs: the
//! per-task claim-signature / skip-or-execute / publish-or-discard sequence
//! described for the engine's task step.

use std::sync::Arc;

use crate::engine::context::BuildExecutionContext;
use crate::error::IsodError;
use crate::task::{BuildTask, BuildTaskContext, BuildTaskResult, TaskKey};

pub(crate) fn make_step(
    context: Arc<BuildExecutionContext>,
    task: Arc<dyn BuildTask>,
) -> Box<dyn Fn() -> anyhow::Result<()> + Send + Sync> {
    Box::new(move || run_step(&context, &task).map_err(anyhow::Error::from))
}

fn run_step(context: &BuildExecutionContext, task: &Arc<dyn BuildTask>) -> Result<(), IsodError> {
    let key = TaskKey::of(task);

    // Step 1: gather upstream results. Present because the scheduler only
    // starts this node once every upstream node has completed.
    let dependency_results: Vec<Arc<BuildTaskResult>> = task
        .dependencies()
        .iter()
        .map(|dep| {
            let dep_key = TaskKey::of(dep);
            context
                .task_to_result
                .lock()
                .unwrap()
                .get(&dep_key)
                .cloned()
                .expect("upstream task result missing after upstream completed")
        })
        .collect();

    // Step 2: compute the signature.
    let signature = task
        .signature(&context.source_dir, &dependency_results)
        .map_err(|source| IsodError::TaskExecutionFailed {
            name: task.name(),
            source,
        })?;

    // Step 3: claim the signature, first-writer-wins.
    {
        let mut owners = context.signature_to_task.lock().unwrap();
        match owners.get(&signature) {
            Some((owner_key, owner_task)) if *owner_key != key => {
                return Err(IsodError::SignatureCollision {
                    a: owner_task.name(),
                    b: task.name(),
                    signature,
                });
            }
            Some(_) => {}
            None => {
                owners.insert(signature.clone(), (key, task.clone()));
            }
        }
    }

    let done = context.done_dir(&signature);

    // Step 4: cache hit, skip execution entirely.
    if !done.exists() {
        // Step 5: execute into a fresh partial directory, then publish.
        let partial = context.partial_dir(&signature);

        // Tolerate debris from a crashed prior attempt at this signature.
        crate::utils::remove_dir_if_exists(&partial)?;
        std::fs::create_dir_all(&partial).map_err(|e| IsodError::io(&partial, e))?;

        let task_context = BuildTaskContext {
            output_dir: &partial,
            source_dir: &context.source_dir,
        };

        task.execute(&task_context)
            .map_err(|source| IsodError::TaskExecutionFailed {
                name: task.name(),
                source,
            })?;

        match std::fs::rename(&partial, &done) {
            Ok(()) => {}
            Err(_) if done.exists() => {
                // Another task instance (or a prior run) published first;
                // the existing done directory is authoritative.
                crate::utils::remove_dir_if_exists(&partial)?;
            }
            Err(e) => return Err(IsodError::io(&partial, e)),
        }
    }

    // Step 6: record the result for downstream tasks.
    let result = Arc::new(BuildTaskResult {
        task_name: task.name(),
        signature,
        output_dir: done,
        dependency_results,
    });
    context.task_to_result.lock().unwrap().insert(key, result);

    Ok(())
}
