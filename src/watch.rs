//! Watch mode.
//!
//! The coordinator is split in two parts:
//!
//! 1. **File watcher**: uses the `notify` crate, with `notify-debouncer-full`
//!    merging bursts of events (e.g. an editor writing a file in several
//!    steps) within a short window.
//! 2. **Group workers**: every [`WatchBinding`] gets its own async worker.
//!    A change routed to a group only ever re-runs that group's task.
//!
//! ## The Loop
//!
//! When a file change is detected:
//! 1. The event paths are matched against each group's patterns.
//! 2. Every matching group is triggered once per batch of events.
//! 3. The worker switches to [`GroupState::Building`], runs the task and
//!    returns to [`GroupState::Idle`], whether the task succeeded or not.
//!
//! Rebuilds of one group never overlap. A trigger arriving while the group is
//! building is queued, and any further triggers are merged into that queued
//! one.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, new_debouncer};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use crate::engine::Action;
use crate::error::WatchError;

/// Associates a set of watched paths with the task re-run when they change.
pub struct WatchBinding {
    task: Cow<'static, str>,
    paths: Vec<String>,
    action: Action,
}

impl WatchBinding {
    /// `paths` may be concrete files, directories or glob patterns.
    pub fn new<I, S>(task: impl Into<Cow<'static, str>>, paths: I, action: Action) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            task: task.into(),
            paths: paths.into_iter().map(Into::into).collect(),
            action,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

impl std::fmt::Debug for WatchBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchBinding")
            .field("task", &self.task)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Idle,
    Building,
}

/// Long-running loop re-running bound tasks on filesystem changes.
pub struct WatchCoordinator {
    root: Utf8PathBuf,
    bindings: Vec<WatchBinding>,
    debounce: Duration,
}

impl WatchCoordinator {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            bindings: Vec::new(),
            debounce: Duration::from_millis(100),
        }
    }

    pub fn bind(mut self, binding: WatchBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    /// Watches until the process is terminated.
    ///
    /// Only setup failures are returned; failing rebuilds are logged and the
    /// affected group goes back to waiting for changes.
    pub async fn run(self) -> Result<(), WatchError> {
        let router = Router::new(&self.root, &self.bindings)?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut debouncer = new_debouncer(self.debounce, None, move |result: DebounceEventResult| {
            // The receiver only goes away together with the coordinator.
            let _ = tx.send(result);
        })?;

        for path in &router.roots {
            tracing::info!("watching {}", path);
            debouncer.watch(path, RecursiveMode::Recursive)?;
        }

        let groups: Vec<_> = self.bindings.into_iter().map(Group::spawn).collect();

        tracing::info!("initial build completed, now watching for changes...");

        while let Some(result) = rx.recv().await {
            match result {
                Ok(events) => {
                    tracing::debug!("{} events received", events.len());

                    for index in router.route_events(events.iter().map(|de| &de.event)) {
                        groups[index].trigger();
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::error!("watch error: {error}");
                    }
                }
            }
        }

        drop(debouncer);
        Ok(())
    }
}

/// Maps changed paths to the groups watching them.
pub(crate) struct Router {
    roots: Vec<Utf8PathBuf>,
    groups: Vec<Vec<Pattern>>,
}

impl Router {
    pub(crate) fn new(root: &Utf8Path, bindings: &[WatchBinding]) -> Result<Self, WatchError> {
        let mut roots = HashSet::new();
        let mut groups = Vec::with_capacity(bindings.len());

        for binding in bindings {
            let mut patterns = Vec::with_capacity(binding.paths.len());
            for path in &binding.paths {
                let (watch_root, pattern) = resolve_watch_path(root, path)?;
                tracing::debug!(task = binding.task(), "{} -> {}", path, pattern);
                roots.insert(watch_root);
                patterns.push(pattern);
            }
            groups.push(patterns);
        }

        Ok(Self {
            roots: collapse_watch_paths(roots),
            groups,
        })
    }

    /// Indices of the groups whose patterns match `path`.
    pub(crate) fn route<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = usize> + 'a {
        self.groups
            .iter()
            .enumerate()
            .filter(move |(_, patterns)| patterns.iter().any(|p| p.matches_path(path)))
            .map(|(index, _)| index)
    }

    /// Groups touched by a batch of events, each reported once.
    pub(crate) fn route_events<'a>(
        &self,
        events: impl IntoIterator<Item = &'a notify::Event>,
    ) -> BTreeSet<usize> {
        events
            .into_iter()
            .filter(|event| is_change(&event.kind))
            .flat_map(|event| event.paths.iter())
            .flat_map(|path| self.route(path).collect::<Vec<_>>())
            .collect()
    }
}

/// Reads performed by the builders themselves must not trigger rebuilds.
fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// A running worker for one watch group.
pub(crate) struct Group {
    name: Cow<'static, str>,
    tx: mpsc::Sender<()>,
    state: watch::Receiver<GroupState>,
}

impl Group {
    pub(crate) fn spawn(binding: WatchBinding) -> Self {
        // One slot: a single follow-up rebuild may wait while one is running.
        let (tx, rx) = mpsc::channel(1);
        let (state_tx, state) = watch::channel(GroupState::Idle);

        tokio::spawn(group_loop(
            binding.task.clone(),
            binding.action,
            rx,
            state_tx,
        ));

        Self {
            name: binding.task,
            tx,
            state,
        }
    }

    /// Returns `false` when the trigger was merged into an already queued one.
    pub(crate) fn trigger(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => {
                if self.state() == GroupState::Building {
                    tracing::debug!(task = %self.name, "rebuild queued behind the running one");
                }
                true
            }
            Err(TrySendError::Full(())) => {
                tracing::debug!(task = %self.name, "rebuild already queued");
                false
            }
            Err(TrySendError::Closed(())) => {
                tracing::error!(task = %self.name, "watch worker is gone");
                false
            }
        }
    }

    pub(crate) fn state(&self) -> GroupState {
        *self.state.borrow()
    }
}

async fn group_loop(
    name: Cow<'static, str>,
    action: Action,
    mut rx: mpsc::Receiver<()>,
    state: watch::Sender<GroupState>,
) {
    while rx.recv().await.is_some() {
        state.send_replace(GroupState::Building);
        tracing::info!(task = %name, "change detected, rebuilding...");
        let s = Instant::now();

        // Spawned separately so that a panicking task can't take the worker down.
        match tokio::spawn(action()).await {
            Ok(Ok(())) => {
                tracing::info!(task = %name, "rebuild complete {}", crate::io::as_overhead(s))
            }
            Ok(Err(e)) => tracing::error!(task = %name, "rebuild failed:\n{e:#}"),
            Err(e) => tracing::error!(task = %name, "rebuild panicked: {e}"),
        }

        state.send_replace(GroupState::Idle);
    }
}

/// Splits a path or glob into a canonicalized static root path (for
/// watching) and a compiled absolute Pattern (for matching).
pub(crate) fn resolve_watch_path(
    base: &Utf8Path,
    glob_str: &str,
) -> Result<(Utf8PathBuf, Pattern), WatchError> {
    let path = base.join(glob_str);

    // Split path into static root and dynamic suffix (containing wildcards)
    let components: Vec<_> = path.components().collect();
    let split_idx = components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[']))
        .unwrap_or(components.len());

    let root_part: Utf8PathBuf = components.iter().take(split_idx).collect();
    let suffix_part: Utf8PathBuf = components.iter().skip(split_idx).collect();

    // Canonicalize the static root (must exist on disk)
    let absolute_root = root_part
        .canonicalize_utf8()
        .map_err(|source| WatchError::Resolve {
            path: glob_str.to_string(),
            source,
        })?;

    // A concrete file is watched through its parent, so that atomic writes
    // (write to a temporary file, then rename) are caught as well.
    let (watch_root, pattern) = if suffix_part.as_str().is_empty() && absolute_root.is_file() {
        let parent = absolute_root
            .parent()
            .unwrap_or(&absolute_root)
            .to_path_buf();
        let pattern = Pattern::new(&Pattern::escape(absolute_root.as_str()))?;
        (parent, pattern)
    } else if suffix_part.as_str().is_empty() {
        let escaped = Pattern::escape(absolute_root.as_str());
        let pattern = Pattern::new(&format!("{escaped}/**/*"))?;
        (absolute_root, pattern)
    } else {
        let escaped = Pattern::escape(absolute_root.as_str());
        let pattern = Pattern::new(&format!("{escaped}/{suffix_part}"))?;
        (absolute_root, pattern)
    };

    Ok((watch_root, pattern))
}

/// Reduces a set of paths to the minimal set of watch roots.
///
/// If we watch `/a` and `/a/b`, we only need to watch `/a` because
/// the watcher is recursive.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered: Vec<Utf8PathBuf> = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}
