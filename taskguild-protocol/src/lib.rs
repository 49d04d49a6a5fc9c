//! Transport-edge RPC surface for the task-orchestration daemon.
//!
//! Wraps [`task_core::task_service::TaskService`],
//! [`task_core::interaction::InteractionService`], and
//! [`task_core::event_bus::EventBus`] behind one JSON-RPC style HTTP
//! endpoint plus three SSE streams — see [`server::router`]. The RPC
//! surface itself (method names, request/response shapes) lives in
//! [`serialization`]; error mapping lives in [`error`].
//!
//! # Architecture
//!
//! - [`error`] — `ProtocolError`, the RPC-edge error taxonomy and its
//!   JSON-RPC code mapping.
//! - [`serialization`] — request/response DTOs for every RPC operation.
//! - [`handler`] — `TaskGuildHandler`, the bridge from RPC calls to the core
//!   services, plus the agent status board and event log the core itself
//!   has no slot for.
//! - [`server`] — the axum `Router` and its handlers.

pub mod error;
pub mod handler;
pub mod serialization;
pub mod server;

pub use error::ProtocolError;
pub use handler::TaskGuildHandler;
pub use server::{router, serve};
