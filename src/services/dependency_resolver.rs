//! Best-effort dependency graph analysis over `WorkerTask::dependencies`.
//!
//! The Task Planner calls `detect_cycle` to reject a decomposition with a
//! circular dependency when dependencies are allowed. `topological_sort`
//! and `calculate_depth` are available for callers who want to order or
//! weight a task set by its dependency structure ahead of spawning, but
//! the default execution path does not currently gate worker start on
//! dependency completion (see the `allowDependencies` note in
//! `DESIGN.md`).

use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::models::WorkerTask;

#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyResolver;

fn detect_cycle_util(
    node: Uuid,
    graph: &HashMap<Uuid, Vec<Uuid>>,
    visited: &mut HashSet<Uuid>,
    rec_stack: &mut HashSet<Uuid>,
    path: &mut Vec<Uuid>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(&node) {
        for &neighbor in neighbors {
            if !visited.contains(&neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(&neighbor) {
                if let Some(cycle_start) = path.iter().position(|&id| id == neighbor) {
                    path.drain(0..cycle_start);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}

fn calculate_depth_recursive(
    task: &WorkerTask,
    task_map: &HashMap<Uuid, &WorkerTask>,
    visited: &mut HashSet<Uuid>,
) -> Result<u32> {
    if visited.contains(&task.id) {
        return Err(anyhow!("circular dependency detected at task {}", task.id));
    }
    visited.insert(task.id);

    let mut depths = Vec::new();
    for &dep_id in &task.dependencies {
        if let Some(&dep_task) = task_map.get(&dep_id) {
            depths.push(calculate_depth_recursive(dep_task, task_map, visited)?);
        }
    }
    let max_depth = depths.into_iter().max().map_or(0, |d| d + 1);

    visited.remove(&task.id);
    Ok(max_depth)
}

impl DependencyResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Every dependency id either names another task in `available_tasks`
    /// or the task itself (self-dependency is nonsensical but not this
    /// method's concern to reject).
    pub fn validate_dependencies(&self, task: &WorkerTask, available_tasks: &[WorkerTask]) -> Result<()> {
        let available_ids: HashSet<Uuid> = available_tasks.iter().map(|t| t.id).collect();
        for dep_id in &task.dependencies {
            if !available_ids.contains(dep_id) && *dep_id != task.id {
                return Err(anyhow!("dependency task {dep_id} not found"));
            }
        }
        Ok(())
    }

    /// Best-effort cycle detection (per the Non-goal: not exhaustive
    /// beyond a single DFS pass over the given task set). Returns the
    /// cycle's path if one is found.
    pub fn detect_cycle(&self, tasks: &[WorkerTask]) -> Option<Vec<Uuid>> {
        let mut graph: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for task in tasks {
            graph.entry(task.id).or_default().extend(task.dependencies.iter().copied());
        }

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for task_id in graph.keys() {
            if !visited.contains(task_id)
                && detect_cycle_util(*task_id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(path);
            }
        }
        None
    }

    /// Kahn's algorithm; dependencies appear before their dependents.
    pub fn topological_sort(&self, tasks: &[WorkerTask]) -> Result<Vec<WorkerTask>> {
        if let Some(cycle) = self.detect_cycle(tasks) {
            return Err(anyhow!("circular dependency detected: {:?}", cycle));
        }

        let mut task_map: HashMap<Uuid, WorkerTask> =
            tasks.iter().map(|t| (t.id, t.clone())).collect();
        let mut in_degree: HashMap<Uuid, usize> = HashMap::new();
        let mut graph: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

        for task in tasks {
            in_degree.entry(task.id).or_insert(0);
            for &dep_id in &task.dependencies {
                graph.entry(dep_id).or_default().push(task.id);
                *in_degree.entry(task.id).or_insert(0) += 1;
            }
        }

        let mut queue: Vec<Uuid> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut sorted = Vec::new();
        while let Some(node_id) = queue.pop() {
            if let Some(task) = task_map.remove(&node_id) {
                sorted.push(task);
            }
            if let Some(neighbors) = graph.get(&node_id) {
                for &neighbor in neighbors {
                    if let Some(degree) = in_degree.get_mut(&neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push(neighbor);
                        }
                    }
                }
            }
        }

        if sorted.len() != tasks.len() {
            return Err(anyhow!("topological sort failed: cycle or disconnected graph"));
        }
        Ok(sorted)
    }

    /// Longest dependency chain reaching this task. `PriorityScorer` does
    /// not currently consume this directly; see the `allowDependencies`
    /// note in `DESIGN.md`.
    pub fn calculate_depth(&self, task: &WorkerTask, all_tasks: &[WorkerTask]) -> Result<u32> {
        let task_map: HashMap<Uuid, &WorkerTask> = all_tasks.iter().map(|t| (t.id, t)).collect();
        let mut visited = HashSet::new();
        calculate_depth_recursive(task, &task_map, &mut visited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_deps(id: Uuid, dependencies: Vec<Uuid>) -> WorkerTask {
        let mut task = WorkerTask::new("test instruction");
        task.id = id;
        task.dependencies = dependencies;
        task
    }

    #[test]
    fn validates_when_dependency_present() {
        let resolver = DependencyResolver::new();
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();

        let task1 = task_with_deps(id1, vec![]);
        let task2 = task_with_deps(id2, vec![id1]);

        assert!(resolver.validate_dependencies(&task2, &[task1]).is_ok());
    }

    #[test]
    fn rejects_missing_dependency() {
        let resolver = DependencyResolver::new();
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let task = task_with_deps(id1, vec![id2]);

        assert!(resolver.validate_dependencies(&task, &[]).is_err());
    }

    #[test]
    fn detects_no_cycle_in_chain() {
        let resolver = DependencyResolver::new();
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let tasks = vec![task_with_deps(id1, vec![]), task_with_deps(id2, vec![id1])];
        assert!(resolver.detect_cycle(&tasks).is_none());
    }

    #[test]
    fn detects_direct_cycle() {
        let resolver = DependencyResolver::new();
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let tasks = vec![task_with_deps(id1, vec![id2]), task_with_deps(id2, vec![id1])];
        assert!(resolver.detect_cycle(&tasks).is_some());
    }

    #[test]
    fn topological_sort_orders_dependencies_first() {
        let resolver = DependencyResolver::new();
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let id3 = Uuid::new_v4();

        let task1 = task_with_deps(id1, vec![]);
        let task2 = task_with_deps(id2, vec![id1]);
        let task3 = task_with_deps(id3, vec![id2]);

        let sorted = resolver
            .topological_sort(&[task3.clone(), task1.clone(), task2.clone()])
            .unwrap();

        assert_eq!(sorted[0].id, id1);
        assert_eq!(sorted[1].id, id2);
        assert_eq!(sorted[2].id, id3);
    }

    #[test]
    fn topological_sort_rejects_cycle() {
        let resolver = DependencyResolver::new();
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let tasks = vec![task_with_deps(id1, vec![id2]), task_with_deps(id2, vec![id1])];
        assert!(resolver.topological_sort(&tasks).is_err());
    }

    #[test]
    fn calculates_chain_depth() {
        let resolver = DependencyResolver::new();
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let id3 = Uuid::new_v4();

        let task1 = task_with_deps(id1, vec![]);
        let task2 = task_with_deps(id2, vec![id1]);
        let task3 = task_with_deps(id3, vec![id2]);
        let all = vec![task1.clone(), task2.clone(), task3.clone()];

        assert_eq!(resolver.calculate_depth(&task1, &all).unwrap(), 0);
        assert_eq!(resolver.calculate_depth(&task2, &all).unwrap(), 1);
        assert_eq!(resolver.calculate_depth(&task3, &all).unwrap(), 2);
    }
}
