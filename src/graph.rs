//! Targets and their task graphs
//!
//! Every task is a target on its own. The pipelines declare their tasks in
//! stages; each task depends on every task of the stage before it. The
//! declaration becomes a petgraph DAG, and the execution plan groups it
//! back into stages by dependency depth.

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::{Result, SiteError};
use crate::task::Task;

/// `Clean → [Copy ∥ Images] → [Html ∥ Style ∥ Scripts]`
pub const BUILD_STAGES: &[&[Task]] = &[
    &[Task::Clean],
    &[Task::Copy, Task::Images],
    &[Task::Html, Task::Style, Task::Scripts],
];

/// A name accepted on the command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub name: &'static str,
    pub description: &'static str,
    /// Declared stages, in order
    pub stages: Vec<Vec<Task>>,
    /// Start the dev server once the stages are done
    pub serve: bool,
}

impl Target {
    fn task(task: Task) -> Self {
        Self {
            name: task.name(),
            description: task.description(),
            stages: vec![vec![task]],
            serve: false,
        }
    }

    fn build() -> Self {
        Self {
            name: "build",
            description: "Clean, then copy and optimise assets, then compile pages, styles and scripts",
            stages: BUILD_STAGES.iter().map(|s| s.to_vec()).collect(),
            serve: false,
        }
    }

    fn dev() -> Self {
        Self {
            name: "default",
            description: "Build, then serve with live reload",
            serve: true,
            ..Self::build()
        }
    }

    /// Every target, single tasks first
    pub fn all() -> Vec<Target> {
        Task::ALL
            .into_iter()
            .map(Target::task)
            .chain([Target::build(), Target::dev()])
            .collect()
    }

    pub fn names() -> Vec<String> {
        Self::all().iter().map(|t| t.name.to_string()).collect()
    }

    /// Look a target up by name
    pub fn find(name: &str) -> Result<Target> {
        Self::all()
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| SiteError::TargetNotFound {
                name: name.to_string(),
                available: Self::names(),
            })
    }

    /// Whether running this target rewrites the output tree
    pub fn writes_output(&self) -> bool {
        self.stages
            .iter()
            .flatten()
            .any(|t| !matches!(t, Task::Reload | Task::Deploy))
    }
}

/// The task dependency graph of one target
#[derive(Debug)]
pub struct TaskGraph {
    graph: DiGraph<Task, ()>,
    task_to_index: HashMap<Task, NodeIndex>,
}

impl TaskGraph {
    /// Build the graph from a target's stage declaration
    pub fn for_target(target: &Target) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut task_to_index: HashMap<Task, NodeIndex> = HashMap::new();

        for stage in &target.stages {
            for &task in stage {
                task_to_index
                    .entry(task)
                    .or_insert_with(|| graph.add_node(task));
            }
        }

        // Edge goes from dependency TO dependent (dep must run first)
        for pair in target.stages.windows(2) {
            for dep in &pair[0] {
                for task in &pair[1] {
                    graph.add_edge(task_to_index[dep], task_to_index[task], ());
                }
            }
        }

        if is_cyclic_directed(&graph) {
            let cycle = target
                .stages
                .iter()
                .map(|s| s.iter().map(|t| t.name()).collect::<Vec<_>>().join(", "))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(SiteError::CyclicDependency {
                cycle: format!("{}: {}", target.name, cycle),
            });
        }

        Ok(Self {
            graph,
            task_to_index,
        })
    }

    /// Tasks in dependency order
    pub fn execution_order(&self) -> Result<Vec<Task>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| SiteError::CyclicDependency {
            cycle: self.graph[cycle.node_id()].to_string(),
        })?;

        Ok(sorted.into_iter().map(|idx| self.graph[idx]).collect())
    }

    /// Direct dependencies of a task
    pub fn dependencies(&self, task: Task) -> Vec<Task> {
        let Some(&idx) = self.task_to_index.get(&task) else {
            return Vec::new();
        };
        let mut deps: Vec<Task> = self
            .graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .map(|dep| self.graph[dep])
            .collect();
        deps.sort();
        deps
    }
}

/// Stages of tasks that can run in parallel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    /// Tasks in dependency order
    pub tasks: Vec<Task>,
    /// Every task of a stage depends only on earlier stages
    pub stages: Vec<Vec<Task>>,
}

impl ExecutionPlan {
    pub fn from_graph(graph: &TaskGraph) -> Result<Self> {
        let tasks = graph.execution_order()?;

        // A task goes one stage after its deepest dependency
        let mut stages: Vec<Vec<Task>> = Vec::new();
        let mut depth: HashMap<Task, usize> = HashMap::new();

        for &task in &tasks {
            let target_stage = graph
                .dependencies(task)
                .iter()
                .filter_map(|dep| depth.get(dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);

            while stages.len() <= target_stage {
                stages.push(Vec::new());
            }
            stages[target_stage].push(task);
            depth.insert(task, target_stage);
        }

        for stage in &mut stages {
            stage.sort();
        }

        Ok(Self { tasks, stages })
    }

    /// Build the graph for `target` and plan it
    pub fn for_target(target: &Target) -> Result<Self> {
        Self::from_graph(&TaskGraph::for_target(target)?)
    }
}
