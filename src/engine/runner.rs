use std::collections::HashMap;
use std::time::Instant;

use indicatif::ProgressStyle;
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use tokio::task::{Id, JoinSet};
use tracing::{Instrument, Level};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::engine::{Diagnostics, TaskExecution, TaskGraph, TaskResult};
use crate::error::{GraphError, RunError};

type Finished = (NodeIndex, TaskResult, Instant);

/// Executes a task together with its transitive dependencies.
///
/// The algorithm works as follows:
/// 1. The target and all of its ancestors are collected into a plan.
/// 2. Each planned task gets a counter of planned dependencies that have not
///    finished yet.
/// 3. Every task whose counter is zero is spawned onto a [`JoinSet`], so
///    independent branches run concurrently.
/// 4. When a task finishes successfully the counters of its dependents are
///    decremented, and those reaching zero are spawned in turn.
/// 5. The first failure aborts the run; dropping the set cancels every task
///    that is still in flight.
#[derive(Debug, Clone, Copy, Default)]
pub struct Runner;

impl Runner {
    pub async fn run(graph: &TaskGraph, target: &str) -> Result<Diagnostics, RunError> {
        // We run toposort primarily to detect any cycles in the graph.
        petgraph::algo::toposort(&graph.graph, None).map_err(|cycle| {
            GraphError::Cycle(graph.graph[cycle.node_id()].name().to_string())
        })?;

        let plan = graph.plan(target)?;

        let mut pending: HashMap<NodeIndex, usize> = plan
            .iter()
            .map(|&index| {
                let count = graph
                    .graph
                    .neighbors_directed(index, Direction::Incoming)
                    .filter(|dep| plan.contains(dep))
                    .count();
                (index, count)
            })
            .collect();

        let root_span = tracing::span!(Level::INFO, "run", task = target);
        root_span.pb_set_length(plan.len() as u64);
        root_span.pb_set_style(&style_bar());
        root_span.pb_set_message(&format!("Running {target}..."));

        let mut set = JoinSet::new();
        let mut ids = HashMap::new();
        let mut diagnostics = Diagnostics::default();

        let mut ready: Vec<_> = pending
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&index, _)| index)
            .collect();
        ready.sort_unstable();

        for index in ready {
            spawn(graph, index, &mut set, &mut ids, &root_span);
        }

        while let Some(joined) = set.join_next_with_id().await {
            let (index, result, start) = match joined {
                Ok((_, finished)) => finished,
                Err(err) => {
                    let name = ids
                        .get(&err.id())
                        .map(|&index| graph.graph[index].name().to_string())
                        .unwrap_or_default();
                    return Err(RunError::Panicked(name));
                }
            };

            let name = graph.graph[index].name();

            if let Err(source) = result {
                tracing::error!(task = name, "failed");
                return Err(RunError::Task {
                    name: name.to_string(),
                    source,
                });
            }

            diagnostics.execution_times.insert(
                name.to_string(),
                TaskExecution {
                    start,
                    duration: start.elapsed(),
                },
            );
            root_span.pb_inc(1);

            for dependent in graph.graph.neighbors_directed(index, Direction::Outgoing) {
                if let Some(count) = pending.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        spawn(graph, dependent, &mut set, &mut ids, &root_span);
                    }
                }
            }
        }

        tracing::debug!("{target} complete");
        Ok(diagnostics)
    }
}

fn spawn(
    graph: &TaskGraph,
    index: NodeIndex,
    set: &mut JoinSet<Finished>,
    ids: &mut HashMap<Id, NodeIndex>,
    parent: &tracing::Span,
) {
    let task = &graph.graph[index];
    let future = task.start();

    let span = tracing::span!(parent: parent, Level::INFO, "task", name = task.name());
    span.pb_set_style(&style_task());
    span.pb_set_message(&format!("Running {}", task.name()));

    let handle = set.spawn(
        async move {
            let start = Instant::now();
            let result = future.await;
            (index, result, start)
        }
        .instrument(span),
    );

    ids.insert(handle.id(), index);
}

fn style_bar() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .expect("invalid progress bar template")
        .progress_chars("=>-")
}

fn style_task() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .expect("invalid progress bar template")
}
