//! Source watching with per-rule debounce
//!
//! `notify` events are turned into source-relative [`WatchEvent`]s and sent
//! over an mpsc channel. One dispatch loop matches them against the
//! [`WatchRule`]s, keeps a trailing debounce window per rule in a
//! [`DebounceQueue`], and runs a rule's sequence once its window closes.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::GlobSet;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{Result, SiteError};
use crate::task::Task;
use crate::tasks::build_globset;

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Change,
    Remove,
    /// Access and metadata-only events
    Other,
}

impl From<&EventKind> for ChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => ChangeKind::Add,
            EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => ChangeKind::Other,
            EventKind::Modify(_) => ChangeKind::Change,
            EventKind::Remove(_) => ChangeKind::Remove,
            _ => ChangeKind::Other,
        }
    }
}

/// Which change kinds a rule reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    AddChangeRemove,
    All,
}

impl EventFilter {
    fn accepts(self, kind: ChangeKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::AddChangeRemove => kind != ChangeKind::Other,
        }
    }
}

/// A change to one source file, relative to the source root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Globs, an event filter and the tasks to run when they match
#[derive(Debug, Clone)]
pub struct WatchRule {
    pub name: &'static str,
    pub patterns: Vec<&'static str>,
    globs: GlobSet,
    pub filter: EventFilter,
    pub sequence: Vec<Task>,
}

impl WatchRule {
    pub fn new(
        name: &'static str,
        patterns: &[&'static str],
        filter: EventFilter,
        sequence: &[Task],
    ) -> Result<Self> {
        Ok(Self {
            name,
            patterns: patterns.to_vec(),
            globs: build_globset(patterns)?,
            filter,
            sequence: sequence.to_vec(),
        })
    }

    /// The dev server's rules
    pub fn defaults() -> Result<Vec<WatchRule>> {
        use EventFilter::*;

        Ok(vec![
            WatchRule::new(
                "templates",
                &["pages/**/*", "partials/**/*"],
                AddChangeRemove,
                &[Task::Html, Task::Reload],
            )?,
            WatchRule::new("styles", &["scss/**/*"], AddChangeRemove, &[Task::Style, Task::Reload])?,
            WatchRule::new("scripts", &["js/**/*"], AddChangeRemove, &[Task::Scripts, Task::Reload])?,
            WatchRule::new("images", &["img/**/*"], All, &[Task::Images, Task::Reload])?,
        ])
    }

    pub fn matches(&self, event: &WatchEvent) -> bool {
        self.filter.accepts(event.kind) && self.globs.is_match(&event.path)
    }
}

#[derive(Debug)]
struct Pending {
    deadline: Instant,
    paths: Vec<PathBuf>,
}

/// Trailing debounce per rule: every push restarts that rule's window
#[derive(Debug)]
pub struct DebounceQueue {
    delay: Duration,
    pending: Vec<Option<Pending>>,
}

impl DebounceQueue {
    pub fn new(rules: usize, delay: Duration) -> Self {
        Self {
            delay,
            pending: (0..rules).map(|_| None).collect(),
        }
    }

    pub fn push(&mut self, rule: usize, path: PathBuf, now: Instant) {
        let deadline = now + self.delay;
        if let Some(pending) = &mut self.pending[rule] {
            pending.deadline = deadline;
            if !pending.paths.contains(&path) {
                pending.paths.push(path);
            }
            return;
        }
        self.pending[rule] = Some(Pending {
            deadline,
            paths: vec![path],
        });
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().flatten().map(|p| p.deadline).min()
    }

    /// Take every batch whose window has closed, in rule order
    pub fn pop_due(&mut self, now: Instant) -> Vec<(usize, Vec<PathBuf>)> {
        let mut due = Vec::new();
        for (rule, slot) in self.pending.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(|p| p.deadline <= now) {
                if let Some(pending) = slot.take() {
                    due.push((rule, pending.paths));
                }
            }
        }
        due
    }

    /// Take everything, due or not
    pub fn drain(&mut self) -> Vec<(usize, Vec<PathBuf>)> {
        self.pending
            .iter_mut()
            .enumerate()
            .filter_map(|(rule, slot)| slot.take().map(|p| (rule, p.paths)))
            .collect()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Feed events through the debounce queue and run each due batch.
/// Sequences run inline, so events arriving meanwhile coalesce into the
/// next batch. Returns once the channel closes and the queue is flushed.
pub async fn dispatch<F, Fut>(
    rules: &[WatchRule],
    delay: Duration,
    mut rx: mpsc::Receiver<WatchEvent>,
    mut run: F,
) where
    F: FnMut(&WatchRule, Vec<PathBuf>) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut queue = DebounceQueue::new(rules.len(), delay);

    loop {
        let deadline = queue.next_deadline();
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                for (i, rule) in rules.iter().enumerate() {
                    if rule.matches(&event) {
                        tracing::trace!(rule = rule.name, path = %event.path.display(), "queued");
                        queue.push(i, event.path.clone(), Instant::now());
                    }
                }
            }
            _ = sleep_until(deadline) => {
                for (i, paths) in queue.pop_due(Instant::now()) {
                    run_batch(&rules[i], paths, &mut run).await;
                }
            }
        }
    }

    for (i, paths) in queue.drain() {
        run_batch(&rules[i], paths, &mut run).await;
    }
}

async fn run_batch<F, Fut>(rule: &WatchRule, paths: Vec<PathBuf>, run: &mut F)
where
    F: FnMut(&WatchRule, Vec<PathBuf>) -> Fut,
    Fut: Future<Output = ()>,
{
    tracing::info!(
        rule = rule.name,
        files = paths.len(),
        "change detected: {}",
        paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    run(rule, paths).await;
}

/// Watch `source_dir` recursively. Dropping the returned watcher stops the
/// event stream.
pub fn watch_sources(
    source_dir: &Path,
) -> Result<(RecommendedWatcher, mpsc::Receiver<WatchEvent>)> {
    let (tx, rx) = mpsc::channel(256);

    let root = source_dir.to_path_buf();
    let canonical = source_dir
        .canonicalize()
        .unwrap_or_else(|_| source_dir.to_path_buf());

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("watch error: {}", e);
                return;
            }
        };
        let kind = ChangeKind::from(&event.kind);
        for path in event.paths {
            let rel = path
                .strip_prefix(&root)
                .or_else(|_| path.strip_prefix(&canonical));
            if let Ok(rel) = rel {
                // Err only means the dispatch loop is gone
                let _ = tx.blocking_send(WatchEvent {
                    path: rel.to_path_buf(),
                    kind,
                });
            }
        }
    })
    .map_err(|e| SiteError::Watch { source: e })?;

    watcher
        .watch(source_dir, RecursiveMode::Recursive)
        .map_err(|e| SiteError::Watch { source: e })?;

    tracing::debug!(dir = %source_dir.display(), "watching sources");
    Ok((watcher, rx))
}
