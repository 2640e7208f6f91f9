//! Task Scheduler
//!
//! Drives the two background loops of every in-progress task:
//! - Collaboration pulse: nudges idle collaborators for a progress report
//! - Progress poll: broadcasts progress and completes the task once every
//!   plan step is done, returning the owner's workload unit
//!
//! Both loops end on their own once the task is terminal; `cancel` and
//! `shutdown` stop them early.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::agent::{prompts, Agent};
use crate::config::NetworkTimings;
use crate::events::{EventBus, NetworkEvent};
use crate::periodic::PeriodicTask;
use crate::registry::AgentRegistry;
use crate::task::{CollaboratorProgress, CollaboratorState, SharedTask, TaskProgress, TaskStatus};

/// Loops owned for one task
struct TaskLoops {
    pulse: PeriodicTask,
    poll: PeriodicTask,
}

impl TaskLoops {
    fn is_finished(&self) -> bool {
        self.pulse.is_finished() && self.poll.is_finished()
    }

    fn cancel(&self) {
        self.pulse.cancel();
        self.poll.cancel();
    }
}

pub struct TaskScheduler {
    registry: AgentRegistry,
    events: EventBus,
    timings: NetworkTimings,
    loops: Mutex<HashMap<String, TaskLoops>>,
}

impl TaskScheduler {
    pub fn new(registry: AgentRegistry, events: EventBus, timings: NetworkTimings) -> Self {
        Self {
            registry,
            events,
            timings,
            loops: Mutex::new(HashMap::new()),
        }
    }

    /// Start pulse and poll for `task`, owned by `owner`
    pub async fn start(&self, task: SharedTask, owner: Arc<Agent>) {
        let task_id = task.read().await.id.clone();
        let loops = self.spawn_loops(task, owner);

        let mut all = self.loops.lock().unwrap_or_else(|e| e.into_inner());
        all.retain(|_, l| !l.is_finished());
        info!("Scheduling loops for task {}", task_id);
        all.insert(task_id, loops);
    }

    fn spawn_loops(&self, task: SharedTask, owner: Arc<Agent>) -> TaskLoops {
        let registry = self.registry.clone();
        let events = self.events.clone();

        let pulse = {
            let task = task.clone();
            let owner = owner.clone();
            let registry = registry.clone();
            let events = events.clone();
            PeriodicTask::spawn("task-pulse", self.timings.pulse_interval, move || {
                let task = task.clone();
                let owner = owner.clone();
                let registry = registry.clone();
                let events = events.clone();
                async move { collaboration_pulse(&task, &owner, &registry, &events).await }
            })
        };

        let poll = PeriodicTask::spawn_immediate("task-poll", self.timings.poll_interval, move || {
            let task = task.clone();
            let owner = owner.clone();
            let registry = registry.clone();
            let events = events.clone();
            async move { progress_poll(&task, &owner, &registry, &events).await }
        });

        TaskLoops { pulse, poll }
    }

    /// Stop the loops of one task
    pub fn cancel(&self, task_id: &str) -> bool {
        let removed = self
            .loops
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(task_id);
        match removed {
            Some(loops) => {
                loops.cancel();
                info!("Cancelled loops for task {}", task_id);
                true
            }
            None => false,
        }
    }

    /// Stop every loop
    pub fn shutdown(&self) {
        let drained: Vec<(String, TaskLoops)> = self
            .loops
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        for (id, loops) in drained {
            debug!("Stopping loops for task {}", id);
            loops.cancel();
        }
    }

    /// Ids of tasks whose loops are still running
    pub fn active_tasks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .loops
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, l)| !l.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One pulse: ask every idle collaborator for a progress report
async fn collaboration_pulse(
    task: &SharedTask,
    owner: &Agent,
    registry: &AgentRegistry,
    events: &EventBus,
) -> ControlFlow<()> {
    let (description, ratio, collaborators) = {
        let t = task.read().await;
        if t.is_terminal() {
            return ControlFlow::Break(());
        }
        let ratio = t.plan.as_ref().map(|p| p.ratio()).unwrap_or(0.0);
        (t.description.clone(), ratio, t.collaborators.clone())
    };

    let prompt = prompts::progress_report(&description, ratio);
    for id in collaborators {
        let Some(agent) = registry.get(&id).await else {
            continue;
        };
        if agent.is_participating().await {
            continue;
        }
        if let Some(reply) = agent.generate_response(&prompt, "", Some(owner.id())).await {
            task.write().await.add_message(&id, &reply);
            events.emit(NetworkEvent::message(&id, &reply));
        }
    }

    if task.read().await.is_terminal() {
        ControlFlow::Break(())
    } else {
        ControlFlow::Continue(())
    }
}

/// One poll: broadcast progress, complete the task when every step is done
async fn progress_poll(
    task: &SharedTask,
    owner: &Agent,
    registry: &AgentRegistry,
    events: &EventBus,
) -> ControlFlow<()> {
    let (task_id, completed, total, collaborators) = {
        let t = task.read().await;
        if t.is_terminal() {
            return ControlFlow::Break(());
        }
        let (completed, total) = t.plan.as_ref().map(|p| p.progress()).unwrap_or((0, 0));
        (t.id.clone(), completed, total, t.collaborators.clone())
    };

    let ratio = if total == 0 {
        1.0
    } else {
        completed as f64 / total as f64
    };

    let mut statuses = Vec::with_capacity(collaborators.len());
    for id in collaborators {
        let working = match registry.get(&id).await {
            Some(agent) => agent.workload().await > 0,
            None => false,
        };
        statuses.push(CollaboratorProgress {
            id,
            status: if working {
                CollaboratorState::Working
            } else {
                CollaboratorState::Completed
            },
        });
    }

    events.emit(NetworkEvent::TaskProgress {
        progress: TaskProgress {
            task_id: task_id.clone(),
            percentage: ratio * 100.0,
            completed_steps: completed,
            total_steps: total,
            collaborators: statuses,
        },
    });

    if completed < total {
        return ControlFlow::Continue(());
    }

    let finished = {
        let mut t = task.write().await;
        match t.transition(TaskStatus::Completed) {
            Ok(()) => Some(t.clone()),
            Err(e) => {
                debug!("Task {} already settled: {}", task_id, e);
                None
            }
        }
    };

    if let Some(snapshot) = finished {
        info!("Task {} completed", task_id);
        events.emit(NetworkEvent::Task { task: snapshot });
        owner.update_workload(-1).await;
    }
    ControlFlow::Break(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InteractionRules;
    use crate::oracle::{CompletionOracle, CompletionRequest, OracleError};
    use crate::task::{ExecutionPlan, Task};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::RwLock;

    struct EchoOracle;

    #[async_trait]
    impl CompletionOracle for EchoOracle {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, OracleError> {
            Ok("on it".to_string())
        }
    }

    fn agent(id: &str, events: &EventBus) -> Arc<Agent> {
        Agent::new(
            id,
            "signer",
            None,
            Arc::new(InteractionRules::default()),
            Arc::new(EchoOracle),
            events.clone(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_completes_task_and_releases_workload() {
        let events = EventBus::new();
        let registry = AgentRegistry::new();
        let owner = agent("A", &events);
        registry.insert(owner.clone()).await;
        owner.update_workload(1).await;

        let mut task = Task::new("write", "A");
        task.transition(TaskStatus::InProgress).unwrap();
        task.plan = Some(ExecutionPlan::single_step("write", "A"));
        let task_id = task.id.clone();
        let shared = Arc::new(RwLock::new(task));

        let scheduler = TaskScheduler::new(registry, events.clone(), NetworkTimings::default());
        let mut rx = events.subscribe();
        scheduler.start(shared.clone(), owner.clone()).await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        match rx.recv().await.unwrap() {
            NetworkEvent::TaskProgress { progress } => {
                assert_eq!(progress.task_id, task_id);
                assert_eq!(progress.percentage, 0.0);
            }
            other => panic!("unexpected {:?}", other),
        }

        shared.write().await.complete_step("1").unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(shared.read().await.status, TaskStatus::Completed);
        assert_eq!(owner.workload().await, 0);

        // pulse notices the terminal status on its next tick
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(scheduler.active_tasks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulse_reaches_idle_collaborators() {
        let events = EventBus::new();
        let registry = AgentRegistry::new();
        let owner = agent("A", &events);
        let helper = agent("B", &events);
        registry.insert(owner.clone()).await;
        registry.insert(helper.clone()).await;

        let mut task = Task::new("write", "A");
        task.transition(TaskStatus::InProgress).unwrap();
        task.add_collaborator("B");
        task.plan = Some(ExecutionPlan::single_step("write", "A"));
        let shared = Arc::new(RwLock::new(task));

        let scheduler = TaskScheduler::new(registry, events.clone(), NetworkTimings::default());
        scheduler.start(shared.clone(), owner).await;

        // B has no edge toward A, so it answers with the minimum strength (above the gate)
        tokio::time::sleep(Duration::from_secs(11)).await;
        let messages = shared.read().await.messages.clone();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, "B");
        assert_eq!(messages[0].content, "on it");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_loops() {
        let events = EventBus::new();
        let registry = AgentRegistry::new();
        let owner = agent("A", &events);

        let mut task = Task::new("write", "A");
        task.transition(TaskStatus::InProgress).unwrap();
        task.plan = Some(ExecutionPlan::single_step("write", "A"));
        let task_id = task.id.clone();
        let shared = Arc::new(RwLock::new(task));

        let scheduler = TaskScheduler::new(registry, events, NetworkTimings::default());
        scheduler.start(shared, owner).await;
        assert_eq!(scheduler.active_tasks(), vec![task_id.clone()]);
        assert!(scheduler.cancel(&task_id));
        assert!(!scheduler.cancel(&task_id));
        assert!(scheduler.active_tasks().is_empty());
    }
}
