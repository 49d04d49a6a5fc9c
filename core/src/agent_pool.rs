//! Owns every [`Agent`] instance: assigns sequential per-class identities,
//! starts the configured floor, and runs the auto-scaling tick.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, AgentSnapshot, PermissionPolicy};
use crate::error::Result;
use crate::event_bus::EventBus;
use crate::interaction::InteractionService;
use crate::models::ScalingConfig;
use crate::runtime::{AgentRuntimeFactory, WorktreeManager};
use crate::task_service::TaskService;

pub const SCALE_TICK: Duration = Duration::from_secs(10);

/// Static configuration for one agent class, as loaded from the daemon's
/// configuration alongside the task definition.
#[derive(Debug, Clone)]
pub struct AgentClassConfig {
    pub class: String,
    pub process_name: String,
    pub instructions: String,
    pub scaling: Option<ScalingConfig>,
    pub permission_policy: PermissionPolicy,
}

struct Slot {
    class: String,
    status: watch::Receiver<AgentSnapshot>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry plus lifecycle manager for every running agent. A pool-wide
/// read-write lock guards the agent map; the sequence-number map has its own
/// mutex, matching the independent-resource discipline described for
/// `AgentPool.agents`.
pub struct AgentPool {
    classes: Vec<AgentClassConfig>,
    agents: StdRwLock<HashMap<String, Slot>>,
    sequence: StdMutex<HashMap<String, BTreeSet<u32>>>,
    runtime_factory: Arc<dyn AgentRuntimeFactory>,
    worktree: Arc<dyn WorktreeManager>,
    task_service: Arc<TaskService>,
    interactions: Arc<InteractionService>,
    domain_events: Arc<EventBus>,
    root_cancel: CancellationToken,
}

impl AgentPool {
    pub fn new(
        classes: Vec<AgentClassConfig>,
        runtime_factory: Arc<dyn AgentRuntimeFactory>,
        worktree: Arc<dyn WorktreeManager>,
        task_service: Arc<TaskService>,
        interactions: Arc<InteractionService>,
        domain_events: Arc<EventBus>,
    ) -> Self {
        Self {
            classes,
            agents: StdRwLock::new(HashMap::new()),
            sequence: StdMutex::new(HashMap::new()),
            runtime_factory,
            worktree,
            task_service,
            interactions,
            domain_events,
            root_cancel: CancellationToken::new(),
        }
    }

    /// Creates `max(1, scaling.min)` agents per configured class and starts
    /// their main loops.
    pub fn start(&self) -> Result<()> {
        let classes = self.classes.clone();
        for class in &classes {
            let floor = class.scaling.map(|s| s.min.max(1)).unwrap_or(1);
            for _ in 0..floor {
                self.spawn_agent(class)?;
            }
        }
        Ok(())
    }

    fn next_sequence(&self, class: &str) -> u32 {
        let mut sequence = self.sequence.lock().unwrap();
        let used = sequence.entry(class.to_string()).or_default();
        let mut candidate = 1u32;
        while used.contains(&candidate) {
            candidate += 1;
        }
        used.insert(candidate);
        candidate
    }

    fn release_sequence(&self, class: &str, agent_id: &str) {
        let Some(suffix) = agent_id.strip_prefix(&format!("{class}-")) else {
            return;
        };
        if let Ok(n) = suffix.parse::<u32>() {
            if let Some(used) = self.sequence.lock().unwrap().get_mut(class) {
                used.remove(&n);
            }
        }
    }

    fn spawn_agent(&self, class: &AgentClassConfig) -> Result<String> {
        let seq = self.next_sequence(&class.class);
        let agent_id = if seq > 9999 {
            format!("{}-{seq}", class.class)
        } else {
            format!("{}-{seq:04}", class.class)
        };

        let (agent, status) = Agent::new(
            agent_id.clone(),
            class.class.clone(),
            class.process_name.clone(),
            class.instructions.clone(),
            class.scaling,
            self.runtime_factory.clone(),
            self.worktree.clone(),
            self.task_service.clone(),
            self.interactions.clone(),
            self.domain_events.clone(),
            class.permission_policy.clone(),
        );

        let cancel = self.root_cancel.child_token();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { agent.run(run_cancel).await });

        self.agents.write().unwrap().insert(
            agent_id.clone(),
            Slot { class: class.class.clone(), status, cancel, handle },
        );
        Ok(agent_id)
    }

    fn stop_agent(&self, agent_id: &str) -> Option<JoinHandle<()>> {
        let slot = self.agents.write().unwrap().remove(agent_id)?;
        slot.cancel.cancel();
        self.release_sequence(&slot.class, agent_id);
        Some(slot.handle)
    }

    /// Snapshot every agent's observable state for a class, without holding
    /// the registry lock while inspecting it.
    fn snapshots_for(&self, class: &str) -> Vec<AgentSnapshot> {
        let slots: Vec<_> = self
            .agents
            .read()
            .unwrap()
            .iter()
            .filter(|(_, slot)| slot.class == class)
            .map(|(id, slot)| (id.clone(), slot.status.clone()))
            .collect();
        slots.into_iter().map(|(_, rx)| rx.borrow().clone()).collect()
    }

    /// One evaluation of the auto-scaling policy across every `scaling.auto`
    /// class: at most one action per class per call.
    pub fn scale_tick(&self) {
        for class in &self.classes {
            let Some(scaling) = class.scaling else { continue };
            if !scaling.auto {
                continue;
            }
            let snapshots = self.snapshots_for(&class.class);
            let total = snapshots.len() as u32;
            let busy = snapshots.iter().filter(|s| s.is_busy()).count() as u32;
            let idle = snapshots.iter().filter(|s| s.is_idle()).count() as u32;

            if busy == total && total < scaling.max {
                if let Err(error) = self.spawn_agent(class) {
                    tracing::warn!(class = %class.class, %error, "failed to scale up");
                }
                continue;
            }

            if idle >= 2 && total > scaling.min {
                let agents = self.agents.read().unwrap();
                let victim = agents
                    .iter()
                    .find(|(_, slot)| slot.class == class.class && slot.status.borrow().is_idle())
                    .map(|(id, _)| id.clone());
                drop(agents);
                if let Some(agent_id) = victim {
                    tracing::info!(agent_id = %agent_id, "scaling down idle agent");
                    self.stop_agent(&agent_id);
                }
            }
        }
    }

    /// Spawns the periodic auto-scaling loop, returning its handle so the
    /// caller can drop/abort it alongside the rest of the daemon's workers.
    pub fn spawn_scaling_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = self.clone();
        let cancel = self.root_cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SCALE_TICK);
            loop {
                tokio::select! {
                    _ = ticker.tick() => pool.scale_tick(),
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }

    /// Cancels every agent concurrently, then waits for them to drain,
    /// bounded by `drain_window`. Individual stop failures are logged, not
    /// propagated. Agents still running once the window elapses are left to
    /// finish in the background — their handles are not retained, so this
    /// call always returns within `drain_window`.
    pub async fn stop(&self, drain_window: Duration) {
        self.root_cancel.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut agents = self.agents.write().unwrap();
            agents.drain().map(|(_, slot)| slot.handle).collect()
        };
        let drain = futures_util::future::join_all(handles);
        match tokio::time::timeout(drain_window, drain).await {
            Ok(results) => {
                for result in results {
                    if let Err(error) = result {
                        tracing::warn!(%error, "agent worker task ended abnormally during shutdown");
                    }
                }
            }
            Err(_) => {
                tracing::warn!("agent pool drain window elapsed with agents still running");
            }
        }
    }

    /// Whether `agent_id` currently names a live agent in the pool.
    pub fn contains(&self, agent_id: &str) -> bool {
        self.agents.read().unwrap().contains_key(agent_id)
    }

    pub fn agent_count(&self) -> usize {
        self.agents.read().unwrap().len()
    }
}
