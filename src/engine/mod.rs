//! The task graph and its executor.
//!
//! Tasks are named units of work organized into a Directed Acyclic Graph.
//! Dependencies are declared by name when a task is defined, and they have to
//! be defined first, so the graph is acyclic by construction. The [`Runner`]
//! still verifies this before executing anything.
//!
//! Every task action is a function producing a future; the future resolves
//! once the task's output has been fully written (or has failed).

mod diagnostics;
mod runner;

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use petgraph::Graph;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Dfs, Reversed};

use crate::BoxFuture;
use crate::error::GraphError;

pub use diagnostics::{Diagnostics, TaskExecution};
pub use runner::Runner;

/// Result from a single executed task.
pub type TaskResult<T = ()> = anyhow::Result<T>;

/// Type-erased task action. Calling it starts a fresh run of the task.
pub type Action = Arc<dyn Fn() -> BoxFuture<'static, TaskResult> + Send + Sync>;

/// Erases the type of an async task function.
pub fn action<F, Fut>(action: F) -> Action
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    Arc::new(move || Box::pin(action()) as BoxFuture<'static, TaskResult>)
}

pub(crate) struct TaskNode {
    name: Cow<'static, str>,
    action: Action,
}

impl TaskNode {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn start(&self) -> BoxFuture<'static, TaskResult> {
        (self.action)()
    }
}

/// Explicit registry of all tasks, constructed once at startup.
///
/// ```rust
/// use assetpipe::TaskGraph;
///
/// let mut graph = TaskGraph::new();
/// graph.task("css").run(|| async { Ok(()) }).unwrap();
/// graph.task("js").run(|| async { Ok(()) }).unwrap();
/// graph.task("default").depends_on(["css", "js"]).noop().unwrap();
/// ```
#[derive(Default)]
pub struct TaskGraph {
    pub(crate) graph: Graph<TaskNode, ()>,
    names: HashMap<Cow<'static, str>, NodeIndex>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the definition of a new task.
    pub fn task(&mut self, name: impl Into<Cow<'static, str>>) -> TaskDef<'_> {
        TaskDef {
            graph: self,
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub(crate) fn index(&self, name: &str) -> Result<NodeIndex, GraphError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))
    }

    /// Returns a handle to a task's action, e.g. for re-running it on change.
    pub fn action(&self, name: &str) -> Result<Action, GraphError> {
        let index = self.index(name)?;
        Ok(self.graph[index].action.clone())
    }

    /// Task names in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(TaskNode::name)
    }

    /// Direct dependencies of a task.
    pub fn dependencies(&self, name: &str) -> Result<Vec<&str>, GraphError> {
        let index = self.index(name)?;
        let mut deps: Vec<_> = self
            .graph
            .neighbors_directed(index, petgraph::Direction::Incoming)
            .map(|dep| self.graph[dep].name())
            .collect();
        deps.sort_unstable();
        Ok(deps)
    }

    /// The task itself together with everything it transitively depends on.
    pub(crate) fn plan(&self, name: &str) -> Result<HashSet<NodeIndex>, GraphError> {
        let start = self.index(name)?;
        let reversed = Reversed(&self.graph);

        let mut nodes = HashSet::new();
        let mut dfs = Dfs::new(reversed, start);
        while let Some(index) = dfs.next(reversed) {
            nodes.insert(index);
        }

        Ok(nodes)
    }
}

impl std::fmt::Display for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            let name = self.graph[index].name().replace('"', "\\\"");
            writeln!(f, "    {:?}[\"{}\"]", index.index(), name)?;
        }

        for edge in self.graph.raw_edges() {
            writeln!(
                f,
                "    {:?} --> {:?}",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        Ok(())
    }
}

pub struct TaskDef<'a> {
    graph: &'a mut TaskGraph,
    name: Cow<'static, str>,
    dependencies: Vec<Cow<'static, str>>,
}

impl<'a> TaskDef<'a> {
    /// Tasks that have to complete before this one starts.
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Cow<'static, str>>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Registers the task with an async action.
    pub fn run<F, Fut>(self, action: F) -> Result<NodeIndex, GraphError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.register(self::action(action))
    }

    /// Registers a task that only groups its dependencies.
    pub fn noop(self) -> Result<NodeIndex, GraphError> {
        self.run(|| async { Ok(()) })
    }

    fn register(self, action: Action) -> Result<NodeIndex, GraphError> {
        let TaskDef {
            graph,
            name,
            dependencies,
        } = self;

        if graph.names.contains_key(&name) {
            return Err(GraphError::DuplicateTask(name.into_owned()));
        }

        let dependencies = dependencies
            .iter()
            .map(|dep| graph.index(dep))
            .collect::<Result<Vec<_>, _>>()?;

        let index = graph.graph.add_node(TaskNode {
            name: name.clone(),
            action,
        });

        for dependency in dependencies {
            graph.graph.update_edge(dependency, index, ());
        }

        graph.names.insert(name, index);
        Ok(index)
    }
}
