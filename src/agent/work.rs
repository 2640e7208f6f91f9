//! Task ownership
//!
//! The speaking agent owns any task its message spawns: it moves the task to
//! in-progress, asks the oracle for an execution plan and hands the task to
//! the scheduler.

use std::sync::Arc;
use tracing::{info, warn};

use super::node::Agent;
use super::prompts;
use crate::events::NetworkEvent;
use crate::extract::{extract_or_default, Extraction};
use crate::oracle::{CompletionRequest, OracleError, Purpose};
use crate::scheduler::TaskScheduler;
use crate::task::{ExecutionPlan, SharedTask, Task, TaskStatus};

impl Agent {
    /// Take ownership of `task` and start its background loops
    ///
    /// Returns false when the task could not be started. An oracle failure
    /// marks the task failed and gives the workload unit back.
    pub async fn handle_task(self: &Arc<Self>, task: SharedTask, scheduler: &TaskScheduler) -> bool {
        let snapshot = {
            let mut t = task.write().await;
            if let Err(e) = t.transition(TaskStatus::InProgress) {
                warn!("Agent {} cannot start task {}: {}", self.id(), t.id, e);
                return false;
            }
            t.clone()
        };
        self.events.emit(NetworkEvent::Task { task: snapshot.clone() });
        self.update_workload(1).await;

        let plan = match self.create_execution_plan(&snapshot).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Agent {} planning failed for {}: {}", self.id(), snapshot.id, e);
                let failed = {
                    let mut t = task.write().await;
                    if let Err(e) = t.transition(TaskStatus::Failed) {
                        warn!("Task {} not failed: {}", t.id, e);
                    }
                    t.clone()
                };
                self.events.emit(NetworkEvent::Task { task: failed });
                self.update_workload(-1).await;
                return false;
            }
        };

        if plan.is_default() {
            warn!("Agent {} got no usable plan for {}, using a single step", self.id(), snapshot.id);
        }
        let plan = plan.into_inner();
        info!(
            "Agent {} planned task {} in {} steps",
            self.id(),
            snapshot.id,
            plan.steps.len()
        );
        task.write().await.plan = Some(plan);

        scheduler.start(task, self.clone()).await;
        true
    }

    /// Ask the oracle for a plan; unparseable replies fall back to one step
    pub async fn create_execution_plan(&self, task: &Task) -> Result<Extraction<ExecutionPlan>, OracleError> {
        let body = serde_json::to_string(task).unwrap_or_else(|_| task.description.clone());
        let request = CompletionRequest::new(Purpose::Plan, prompts::plan_system()).with_user_message(body);

        let reply = self.oracle.complete(request).await?;
        Ok(extract_or_default(&reply, || {
            ExecutionPlan::single_step(&task.description, self.id())
        }))
    }
}
