//! Question/permission-request interactions raised by a running agent and
//! answered by a human operator through the Runner.
//!
//! Two independent delivery paths exist on purpose: [`InteractionService`]
//! itself (create/respond/expire/subscribe, the Runner-facing surface) and
//! the embedded [`InteractionWaiterRegistry`] (register/deliver/unregister,
//! used in-process by an `Agent` mediating its `AgentRuntime`'s permission
//! callback without polling).

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};

use crate::error::{Result, TaskError};
use crate::models::{Interaction, InteractionKind, InteractionOption, InteractionStatus};
use crate::validation::TaskValidator;

const STREAM_CAPACITY: usize = 128;

/// One update delivered to a [`InteractionService::subscribe`] stream.
/// A terminal event (`responded` or `expired`) is always the last one a
/// subscriber sees for a given interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub interaction: Interaction,
}

/// Maps `interaction_id -> single-slot delivery sink`, with a `pending`
/// buffer for deliveries that race ahead of registration. At most one of
/// `waiters[id]`/`pending[id]` is populated at any time.
#[derive(Default)]
pub struct InteractionWaiterRegistry {
    waiters: StdMutex<HashMap<String, oneshot::Sender<Interaction>>>,
    pending: StdMutex<HashMap<String, Interaction>>,
}

impl InteractionWaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a receiver that resolves the moment a terminal state is
    /// delivered for `id`. If one already arrived and was buffered, it is
    /// handed over immediately.
    pub fn register(&self, id: &str) -> oneshot::Receiver<Interaction> {
        let (tx, rx) = oneshot::channel();
        if let Some(interaction) = self.pending.lock().unwrap().remove(id) {
            let _ = tx.send(interaction);
            return rx;
        }
        self.waiters.lock().unwrap().insert(id.to_string(), tx);
        rx
    }

    /// Deliver a terminal interaction to its waiter, or buffer it if no
    /// waiter has registered yet.
    pub fn deliver(&self, interaction: Interaction) {
        let waiter = self.waiters.lock().unwrap().remove(&interaction.id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(interaction);
            }
            None => {
                self.pending.lock().unwrap().insert(interaction.id.clone(), interaction);
            }
        }
    }

    /// Drop any registered waiter or buffered delivery for `id`.
    pub fn unregister(&self, id: &str) {
        self.waiters.lock().unwrap().remove(id);
        self.pending.lock().unwrap().remove(id);
    }
}

pub struct InteractionService {
    interactions: StdMutex<HashMap<String, Interaction>>,
    streams: StdMutex<HashMap<String, broadcast::Sender<InteractionEvent>>>,
    waiters: InteractionWaiterRegistry,
}

impl Default for InteractionService {
    fn default() -> Self {
        Self {
            interactions: StdMutex::new(HashMap::new()),
            streams: StdMutex::new(HashMap::new()),
            waiters: InteractionWaiterRegistry::new(),
        }
    }
}

impl InteractionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waiters(&self) -> &InteractionWaiterRegistry {
        &self.waiters
    }

    fn stream_sender(&self, task_id: &str) -> broadcast::Sender<InteractionEvent> {
        self.streams
            .lock()
            .unwrap()
            .entry(task_id.to_string())
            .or_insert_with(|| broadcast::channel(STREAM_CAPACITY).0)
            .clone()
    }

    fn broadcast(&self, task_id: &str, interaction: &Interaction) {
        let sender = self.stream_sender(task_id);
        // No subscribers is the common case and not an error.
        let _ = sender.send(InteractionEvent { interaction: interaction.clone() });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_interaction(
        &self,
        id: String,
        task_id: &str,
        agent_id: &str,
        kind: InteractionKind,
        title: String,
        description: String,
        options: Vec<InteractionOption>,
    ) -> Result<Interaction> {
        TaskValidator::validate_id("interaction id", &id)?;
        TaskValidator::validate_id("task id", task_id)?;
        TaskValidator::validate_id("agent id", agent_id)?;
        TaskValidator::validate_title(&title)?;

        let interaction = Interaction::new(id, task_id.to_string(), agent_id.to_string(), kind, title, description, options);
        self.interactions
            .lock()
            .unwrap()
            .insert(interaction.id.clone(), interaction.clone());
        self.broadcast(task_id, &interaction);
        Ok(interaction)
    }

    pub fn get_interaction_response(&self, id: &str) -> Result<Interaction> {
        self.interactions
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| TaskError::not_found("interaction", id))
    }

    /// Records the operator's answer and wakes whoever is registered on the
    /// waiter for this interaction. Fails with `AlreadyTerminal` if the
    /// interaction was already responded to or has expired.
    pub fn respond_interaction(&self, id: &str, response: String) -> Result<Interaction> {
        let interaction = {
            let mut interactions = self.interactions.lock().unwrap();
            let interaction = interactions.get_mut(id).ok_or_else(|| TaskError::not_found("interaction", id))?;
            if interaction.is_terminal() {
                return Err(TaskError::AlreadyTerminal(id.to_string()));
            }
            interaction.status = InteractionStatus::Responded;
            interaction.response = Some(response);
            interaction.responded_at = Some(chrono::Utc::now());
            interaction.clone()
        };

        self.waiters.deliver(interaction.clone());
        self.broadcast(&interaction.task_id, &interaction);
        Ok(interaction)
    }

    /// Administrative or task-terminal expiry. No-op error path mirrors
    /// `respond_interaction`: an already-terminal interaction is not
    /// re-expired.
    pub fn expire_interaction(&self, id: &str) -> Result<Interaction> {
        let interaction = {
            let mut interactions = self.interactions.lock().unwrap();
            let interaction = interactions.get_mut(id).ok_or_else(|| TaskError::not_found("interaction", id))?;
            if interaction.is_terminal() {
                return Err(TaskError::AlreadyTerminal(id.to_string()));
            }
            interaction.status = InteractionStatus::Expired;
            interaction.responded_at = Some(chrono::Utc::now());
            interaction.clone()
        };

        self.waiters.deliver(interaction.clone());
        self.broadcast(&interaction.task_id, &interaction);
        Ok(interaction)
    }

    /// Expire every still-pending interaction belonging to `task_id` — used
    /// when the owning task reaches a terminal status.
    pub fn expire_all_for_task(&self, task_id: &str) -> Vec<String> {
        let ids: Vec<String> = self
            .interactions
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.task_id == task_id && !i.is_terminal())
            .map(|i| i.id.clone())
            .collect();
        for id in &ids {
            let _ = self.expire_interaction(id);
        }
        ids
    }

    pub fn subscribe(&self, task_id: &str) -> broadcast::Receiver<InteractionEvent> {
        self.stream_sender(task_id).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> InteractionService {
        InteractionService::new()
    }

    #[test]
    fn create_then_get_round_trips() {
        let svc = service();
        let created = svc
            .create_interaction(
                "I1".into(),
                "T1",
                "dev-0001",
                InteractionKind::Question,
                "Which branch?".into(),
                "desc".into(),
                vec![],
            )
            .unwrap();
        let fetched = svc.get_interaction_response("I1").unwrap();
        assert_eq!(created.id, fetched.id);
        assert_eq!(fetched.status, InteractionStatus::Pending);
    }

    #[test]
    fn respond_wakes_registered_waiter() {
        let svc = service();
        svc.create_interaction("I1".into(), "T1", "dev-0001", InteractionKind::Question, "q".into(), "d".into(), vec![])
            .unwrap();

        let rx = svc.waiters().register("I1");
        svc.respond_interaction("I1", "allow".into()).unwrap();

        let delivered = rx.try_recv().expect("waiter should have been woken");
        assert_eq!(delivered.response, Some("allow".to_string()));
    }

    #[test]
    fn s4_response_races_ahead_of_register() {
        let svc = service();
        svc.create_interaction("I1".into(), "T1", "dev-0001", InteractionKind::PermissionRequest, "q".into(), "d".into(), vec![])
            .unwrap();

        // Client responds before the agent ever calls register().
        svc.respond_interaction("I1", "allow".into()).unwrap();

        let rx = svc.waiters().register("I1");
        let delivered = rx.try_recv().expect("buffered delivery must be handed over immediately");
        assert_eq!(delivered.response, Some("allow".to_string()));
    }

    #[test]
    fn respond_twice_is_already_terminal() {
        let svc = service();
        svc.create_interaction("I1".into(), "T1", "dev-0001", InteractionKind::Question, "q".into(), "d".into(), vec![])
            .unwrap();
        svc.respond_interaction("I1", "a".into()).unwrap();
        let second = svc.respond_interaction("I1", "b".into());
        assert!(matches!(second, Err(TaskError::AlreadyTerminal(_))));
    }

    #[test]
    fn unregister_drops_pending_buffer() {
        let svc = service();
        svc.create_interaction("I1".into(), "T1", "dev-0001", InteractionKind::Question, "q".into(), "d".into(), vec![])
            .unwrap();
        svc.respond_interaction("I1", "a".into()).unwrap();
        svc.waiters().unregister("I1");
        let rx = svc.waiters().register("I1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscribe_receives_creation_and_terminal_event() {
        let svc = service();
        let mut rx = svc.subscribe("T1");
        svc.create_interaction("I1".into(), "T1", "dev-0001", InteractionKind::Question, "q".into(), "d".into(), vec![])
            .unwrap();
        svc.respond_interaction("I1", "a".into()).unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.interaction.status, InteractionStatus::Pending);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.interaction.status, InteractionStatus::Responded);
    }

    #[test]
    fn expire_all_for_task_only_touches_pending() {
        let svc = service();
        svc.create_interaction("I1".into(), "T1", "dev-0001", InteractionKind::Question, "q".into(), "d".into(), vec![])
            .unwrap();
        svc.create_interaction("I2".into(), "T1", "dev-0001", InteractionKind::Question, "q2".into(), "d".into(), vec![])
            .unwrap();
        svc.respond_interaction("I1", "a".into()).unwrap();

        let expired = svc.expire_all_for_task("T1");
        assert_eq!(expired, vec!["I2".to_string()]);
        assert_eq!(svc.get_interaction_response("I1").unwrap().status, InteractionStatus::Responded);
        assert_eq!(svc.get_interaction_response("I2").unwrap().status, InteractionStatus::Expired);
    }
}
