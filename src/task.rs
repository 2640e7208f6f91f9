//! Tasks and Execution Plans
//!
//! A task is spawned when a message is classified as task intent:
//! - Forward-only status machine (pending → in-progress → completed/failed)
//! - Collaborator set and message log
//! - Optional execution plan whose steps are completed from outside
//!
//! Tasks stay on the [`TaskBoard`] after reaching a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Task errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Invalid task transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Unknown step {step_id} in task {task_id}")]
    UnknownStep { task_id: String, step_id: String },

    #[error("Task {0} has no execution plan")]
    NoPlan(String),
}

// ============ Status & Priority ============

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Only strictly forward moves out of a non-terminal status
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

// ============ Execution Plan ============

/// Plan step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// One step of an execution plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub assigned_to: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub estimated_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub status: StepStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mitigation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub criteria: Vec<String>,
}

/// Structured plan returned by the owner's oracle
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub risks: Vec<Risk>,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
}

impl ExecutionPlan {
    /// Single pending step covering the whole task
    pub fn single_step(description: &str, owner: &str) -> Self {
        Self {
            steps: vec![PlanStep {
                id: "1".to_string(),
                description: description.to_string(),
                assigned_to: Some(owner.to_string()),
                estimated_time: None,
                dependencies: Vec::new(),
                status: StepStatus::Pending,
            }],
            risks: Vec::new(),
            checkpoints: Vec::new(),
        }
    }

    /// (completed, total)
    pub fn progress(&self) -> (usize, usize) {
        let completed = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        (completed, self.steps.len())
    }

    /// Completed fraction in [0, 1]; an empty plan counts as done
    pub fn ratio(&self) -> f64 {
        let (completed, total) = self.progress();
        if total == 0 {
            1.0
        } else {
            completed as f64 / total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        let (completed, total) = self.progress();
        completed == total
    }
}

/// Accept strings or numbers where the oracle is sloppy about types
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(value_to_string(value))
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(match value {
        serde_json::Value::Null => None,
        other => Some(value_to_string(other)),
    })
}

fn lenient_strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(match value {
        serde_json::Value::Array(items) => items.into_iter().map(value_to_string).collect(),
        serde_json::Value::Null => Vec::new(),
        other => vec![value_to_string(other)],
    })
}

fn value_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

// ============ Task ============

/// Entry in a task's message log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskMessage {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A unit of delegated work
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub description: String,
    pub assigned_agent: String,
    pub status: TaskStatus,
    pub collaborators: BTreeSet<String>,
    pub messages: Vec<TaskMessage>,
    pub required_skills: Vec<String>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,
}

impl Task {
    pub fn new(description: &str, assigned_agent: &str) -> Self {
        Self {
            id: format!("task-{}", Uuid::new_v4()),
            description: description.to_string(),
            assigned_agent: assigned_agent.to_string(),
            status: TaskStatus::Pending,
            collaborators: BTreeSet::new(),
            messages: Vec::new(),
            required_skills: Vec::new(),
            priority: Priority::default(),
            created_at: Utc::now(),
            plan: None,
        }
    }

    /// Move to `next`, rejecting backward moves and exits from terminal states
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        debug!("Task {}: {} -> {}", self.id, self.status, next);
        self.status = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn add_collaborator(&mut self, agent_id: &str) {
        self.collaborators.insert(agent_id.to_string());
    }

    pub fn add_message(&mut self, sender: &str, content: &str) {
        self.messages.push(TaskMessage {
            sender: sender.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Mark one plan step completed; returns false if it already was
    pub fn complete_step(&mut self, step_id: &str) -> Result<bool, TaskError> {
        let task_id = self.id.clone();
        let plan = self.plan.as_mut().ok_or_else(|| TaskError::NoPlan(task_id.clone()))?;
        let step = plan
            .steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or_else(|| TaskError::UnknownStep {
                task_id,
                step_id: step_id.to_string(),
            })?;

        if step.status == StepStatus::Completed {
            return Ok(false);
        }
        step.status = StepStatus::Completed;
        Ok(true)
    }
}

// ============ Progress ============

/// Collaborator activity as reported in progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorState {
    Working,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollaboratorProgress {
    pub id: String,
    pub status: CollaboratorState,
}

/// Progress snapshot broadcast by the poll loop
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub task_id: String,
    pub percentage: f64,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub collaborators: Vec<CollaboratorProgress>,
}

// ============ Task Board ============

/// Task handle shared between the board and the scheduler loops
pub type SharedTask = Arc<RwLock<Task>>;

/// Every task ever created, by id
#[derive(Default)]
pub struct TaskBoard {
    tasks: RwLock<HashMap<String, SharedTask>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: Task) -> SharedTask {
        let id = task.id.clone();
        let shared = Arc::new(RwLock::new(task));
        self.tasks.write().await.insert(id.clone(), shared.clone());
        info!("Task {} added to board", id);
        shared
    }

    pub async fn get(&self, task_id: &str) -> Option<SharedTask> {
        self.tasks.read().await.get(task_id).cloned()
    }

    /// Snapshots of all tasks, oldest first
    pub async fn snapshot(&self) -> Vec<Task> {
        let handles: Vec<SharedTask> = self.tasks.read().await.values().cloned().collect();
        let mut tasks = Vec::with_capacity(handles.len());
        for handle in handles {
            tasks.push(handle.read().await.clone());
        }
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    /// Mark a plan step completed (idempotent)
    pub async fn complete_step(&self, task_id: &str, step_id: &str) -> Result<Task, TaskError> {
        let shared = self
            .get(task_id)
            .await
            .ok_or_else(|| TaskError::UnknownTask(task_id.to_string()))?;
        let mut task = shared.write().await;
        if task.complete_step(step_id)? {
            info!("Task {}: step {} completed", task_id, step_id);
        }
        Ok(task.clone())
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planned_task() -> Task {
        let mut task = Task::new("write report", "A");
        task.plan = Some(ExecutionPlan {
            steps: vec![
                PlanStep {
                    id: "1".into(),
                    description: "draft".into(),
                    assigned_to: None,
                    estimated_time: None,
                    dependencies: vec![],
                    status: StepStatus::Pending,
                },
                PlanStep {
                    id: "2".into(),
                    description: "review".into(),
                    assigned_to: None,
                    estimated_time: None,
                    dependencies: vec!["1".into()],
                    status: StepStatus::Pending,
                },
            ],
            risks: vec![],
            checkpoints: vec![],
        });
        task
    }

    #[test]
    fn test_task_id_format() {
        let task = Task::new("x", "A");
        assert!(task.id.starts_with("task-"));
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_forward_transitions() {
        let mut task = Task::new("x", "A");
        task.transition(TaskStatus::InProgress).unwrap();
        task.transition(TaskStatus::Completed).unwrap();
        assert!(task.is_terminal());

        let mut task = Task::new("y", "A");
        task.transition(TaskStatus::Failed).unwrap();
    }

    #[test]
    fn test_rejects_backward_and_terminal_exits() {
        let mut task = Task::new("x", "A");
        task.transition(TaskStatus::InProgress).unwrap();
        assert!(task.transition(TaskStatus::Pending).is_err());
        assert!(task.transition(TaskStatus::InProgress).is_err());

        task.transition(TaskStatus::Failed).unwrap();
        let err = task.transition(TaskStatus::Completed).unwrap_err();
        assert_eq!(
            err,
            TaskError::InvalidTransition {
                from: TaskStatus::Failed,
                to: TaskStatus::Completed
            }
        );
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn test_complete_step_is_idempotent() {
        let mut task = planned_task();
        assert!(task.complete_step("1").unwrap());
        assert!(!task.complete_step("1").unwrap());
        assert_eq!(task.plan.as_ref().unwrap().progress(), (1, 2));
    }

    #[test]
    fn test_complete_step_errors() {
        let mut task = planned_task();
        assert!(matches!(
            task.complete_step("9"),
            Err(TaskError::UnknownStep { .. })
        ));
        let mut bare = Task::new("x", "A");
        assert!(matches!(bare.complete_step("1"), Err(TaskError::NoPlan(_))));
    }

    #[test]
    fn test_empty_plan_counts_as_complete() {
        let plan = ExecutionPlan::default();
        assert_eq!(plan.ratio(), 1.0);
        assert!(plan.is_complete());
    }

    #[test]
    fn test_plan_parses_loose_oracle_output() {
        let raw = r#"{
            "steps": [
                {"id": 1, "description": "gather", "assignedTo": "B", "estimatedTime": 2, "dependencies": []},
                {"id": "2", "description": "write", "estimatedTime": "1h", "dependencies": [1], "status": "in-progress"}
            ],
            "checkpoints": [{"description": "done", "criteria": ["reviewed"]}]
        }"#;
        let plan: ExecutionPlan = serde_json::from_str(raw).unwrap();
        assert_eq!(plan.steps[0].id, "1");
        assert_eq!(plan.steps[0].estimated_time.as_deref(), Some("2"));
        assert_eq!(plan.steps[1].dependencies, vec!["1"]);
        assert_eq!(plan.steps[1].status, StepStatus::InProgress);
        assert!(plan.risks.is_empty());
    }

    #[test]
    fn test_task_serializes_camel_case() {
        let task = Task::new("x", "A");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["assignedAgent"], "A");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["priority"], "medium");
        assert!(json.get("plan").is_none());
    }

    #[tokio::test]
    async fn test_board_complete_step() {
        let board = TaskBoard::new();
        let task = planned_task();
        let id = task.id.clone();
        board.insert(task).await;

        let updated = board.complete_step(&id, "2").await.unwrap();
        assert_eq!(updated.plan.unwrap().progress(), (1, 2));
        assert!(matches!(
            board.complete_step("task-missing", "1").await,
            Err(TaskError::UnknownTask(_))
        ));
        assert_eq!(board.snapshot().await.len(), 1);
    }
}
