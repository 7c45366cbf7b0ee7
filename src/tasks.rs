//! Task Manager (Component D): a per-session dependency-ordered task graph.
//!
//! Transitions: `pending -> in_progress -> (completed | failed)` or
//! `pending -> skipped`. A failed task does not block its dependents unless
//! the dependency edge was registered as "hard".

use crate::types::{Task, TaskId, TaskStatus};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One dependency edge's strictness: soft (default) lets dependents become
/// ready once the dependency reaches any terminal state; hard requires the
/// dependency to specifically complete or be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DependencyKind {
    Soft,
    Hard,
}

/// Snapshot of task manager state, for persistence.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskSnapshot {
    pub tasks: Vec<Task>,
    pub order: Vec<TaskId>,
}

pub struct TaskManager {
    tasks: HashMap<TaskId, Task>,
    order: Vec<TaskId>,
    hard_deps: HashMap<(TaskId, TaskId), DependencyKind>,
    next_seq: u64,
    workspace_root: PathBuf,
}

impl TaskManager {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            tasks: HashMap::new(),
            order: Vec::new(),
            hard_deps: HashMap::new(),
            next_seq: 0,
            workspace_root,
        }
    }

    fn fresh_task_id(&mut self) -> TaskId {
        self.next_seq += 1;
        TaskId::new(format!("task-{}", self.next_seq)).expect("generated id is non-empty")
    }

    /// Create a new task with the given description and dependencies
    /// (defaulting to soft edges), returning its generated id.
    pub fn create_task(&mut self, description: impl Into<String>, dependencies: Vec<TaskId>) -> Result<TaskId> {
        for dep in &dependencies {
            if !self.tasks.contains_key(dep) {
                return Err(Error::TaskNotFound(dep.clone()));
            }
        }
        let task_id = self.fresh_task_id();
        let task = Task::new(task_id.clone(), description, dependencies);
        self.order.push(task_id.clone());
        self.tasks.insert(task_id.clone(), task);
        Ok(task_id)
    }

    /// Register a dependency edge as hard: `dependent` only becomes ready
    /// once `dependency` specifically completes or is skipped, not merely
    /// reaches any terminal state.
    pub fn mark_hard_dependency(&mut self, dependent: TaskId, dependency: TaskId) {
        self.hard_deps.insert((dependent, dependency), DependencyKind::Hard);
    }

    pub fn get(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Update a task's status and optionally its result fields. Enforces
    /// the lifecycle: only `pending` tasks may move to `in_progress` or
    /// `skipped`; only `in_progress` tasks may move to `completed` or
    /// `failed`.
    pub fn update_task(
        &mut self,
        task_id: &TaskId,
        status: Option<TaskStatus>,
        result_summary: Option<String>,
        result_documents: Option<Vec<String>>,
        timestamp: i64,
    ) -> Result<()> {
        let task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.clone()))?;

        if let Some(new_status) = status {
            let valid = match (task.status, new_status) {
                (TaskStatus::Pending, TaskStatus::InProgress) => true,
                (TaskStatus::Pending, TaskStatus::Skipped) => true,
                (TaskStatus::InProgress, TaskStatus::Completed) => true,
                (TaskStatus::InProgress, TaskStatus::Failed) => true,
                (a, b) if a == b => true,
                _ => false,
            };
            if !valid {
                return Err(Error::invalid_argument(format!(
                    "invalid task transition {:?} -> {:?}",
                    task.status, new_status
                )));
            }
            if new_status == TaskStatus::InProgress {
                task.start_time = Some(timestamp);
            }
            if new_status.is_terminal() {
                task.end_time = Some(timestamp);
            }
            task.status = new_status;
        }
        if let Some(summary) = result_summary {
            task.result_summary = Some(summary);
        }
        if let Some(docs) = result_documents {
            task.result_documents = docs;
        }
        Ok(())
    }

    fn dependency_satisfied(&self, dependent: &TaskId, dep_id: &TaskId) -> bool {
        let Some(dep) = self.tasks.get(dep_id) else {
            return false;
        };
        let kind = self
            .hard_deps
            .get(&(dependent.clone(), dep_id.clone()))
            .copied()
            .unwrap_or(DependencyKind::Soft);
        match kind {
            DependencyKind::Soft => dep.status.is_terminal(),
            DependencyKind::Hard => dep.status.unblocks_dependents(),
        }
    }

    /// Tasks in insertion order that are pending and whose dependencies are
    /// all satisfied.
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|id| {
                let Some(task) = self.tasks.get(*id) else {
                    return false;
                };
                task.status == TaskStatus::Pending
                    && task
                        .dependencies
                        .iter()
                        .all(|dep| self.dependency_satisfied(id, dep))
            })
            .cloned()
            .collect()
    }

    /// True once every task has reached a terminal state.
    pub fn all_done(&self) -> bool {
        self.tasks.values().all(|t| t.status.is_terminal())
    }

    pub fn tasks(&self) -> Vec<&Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id)).collect()
    }

    pub fn to_snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            tasks: self.order.iter().filter_map(|id| self.tasks.get(id)).cloned().collect(),
            order: self.order.clone(),
        }
    }

    pub fn from_snapshot(workspace_root: PathBuf, snapshot: TaskSnapshot) -> Self {
        let next_seq = snapshot
            .order
            .iter()
            .filter_map(|id| id.as_str().strip_prefix("task-"))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        let tasks = snapshot
            .tasks
            .into_iter()
            .map(|t| (t.task_id.clone(), t))
            .collect();
        Self {
            tasks,
            order: snapshot.order,
            hard_deps: HashMap::new(),
            next_seq,
            workspace_root,
        }
    }

    pub async fn persist(&self) -> Result<()> {
        let target = self.workspace_root.join("tasks.json");
        let tmp = self.workspace_root.join("tasks.json.tmp");
        let json = serde_json::to_vec_pretty(&self.to_snapshot())?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &target).await.map_err(Error::Io)?;
        Ok(())
    }

    pub async fn load(workspace_root: PathBuf) -> Result<Self> {
        let path = workspace_root.join("tasks.json");
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: TaskSnapshot = serde_json::from_slice(&bytes)?;
                Ok(Self::from_snapshot(workspace_root, snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new(workspace_root)),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mgr() -> TaskManager {
        TaskManager::new(PathBuf::from("/tmp/does-not-exist"))
    }

    #[test]
    fn test_create_task_assigns_ids_in_order() {
        let mut m = mgr();
        let t1 = m.create_task("first", vec![]).unwrap();
        let t2 = m.create_task("second", vec![]).unwrap();
        assert_ne!(t1, t2);
        assert_eq!(m.tasks().len(), 2);
    }

    #[test]
    fn test_create_task_rejects_unknown_dependency() {
        let mut m = mgr();
        let bogus = TaskId::new("nope").unwrap();
        assert!(m.create_task("x", vec![bogus]).is_err());
    }

    #[test]
    fn test_ready_tasks_respects_dependencies() {
        let mut m = mgr();
        let t1 = m.create_task("first", vec![]).unwrap();
        let t2 = m.create_task("second", vec![t1.clone()]).unwrap();

        assert_eq!(m.ready_tasks(), vec![t1.clone()]);

        m.update_task(&t1, Some(TaskStatus::InProgress), None, None, 1).unwrap();
        m.update_task(&t1, Some(TaskStatus::Completed), None, None, 2).unwrap();

        assert_eq!(m.ready_tasks(), vec![t2]);
    }

    #[test]
    fn test_failed_soft_dependency_unblocks_dependent() {
        let mut m = mgr();
        let t1 = m.create_task("first", vec![]).unwrap();
        let t2 = m.create_task("second", vec![t1.clone()]).unwrap();

        m.update_task(&t1, Some(TaskStatus::InProgress), None, None, 1).unwrap();
        m.update_task(&t1, Some(TaskStatus::Failed), None, None, 2).unwrap();

        assert_eq!(m.ready_tasks(), vec![t2]);
    }

    #[test]
    fn test_failed_hard_dependency_blocks_dependent() {
        let mut m = mgr();
        let t1 = m.create_task("first", vec![]).unwrap();
        let t2 = m.create_task("second", vec![t1.clone()]).unwrap();
        m.mark_hard_dependency(t2.clone(), t1.clone());

        m.update_task(&t1, Some(TaskStatus::InProgress), None, None, 1).unwrap();
        m.update_task(&t1, Some(TaskStatus::Failed), None, None, 2).unwrap();

        assert!(m.ready_tasks().is_empty());
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut m = mgr();
        let t1 = m.create_task("first", vec![]).unwrap();
        assert!(m.update_task(&t1, Some(TaskStatus::Completed), None, None, 1).is_err());
    }

    #[test]
    fn test_all_done() {
        let mut m = mgr();
        let t1 = m.create_task("first", vec![]).unwrap();
        assert!(!m.all_done());
        m.update_task(&t1, Some(TaskStatus::InProgress), None, None, 1).unwrap();
        m.update_task(&t1, Some(TaskStatus::Completed), Some("done".into()), None, 2)
            .unwrap();
        assert!(m.all_done());
        assert_eq!(m.get(&t1).unwrap().result_summary.as_deref(), Some("done"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut m = mgr();
        let t1 = m.create_task("first", vec![]).unwrap();
        m.update_task(&t1, Some(TaskStatus::InProgress), None, None, 1).unwrap();

        let snapshot = m.to_snapshot();
        let restored = TaskManager::from_snapshot(PathBuf::from("/tmp/does-not-exist"), snapshot);
        assert_eq!(restored.get(&t1).unwrap().status, TaskStatus::InProgress);

        let t2 = {
            let mut restored = restored;
            restored.create_task("second", vec![]).unwrap()
        };
        assert_ne!(t2, t1);
    }
}
