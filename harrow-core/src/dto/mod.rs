//! Data Transfer Objects for inter-service communication
//!
//! Request and response bodies exchanged between the agent, the gateway and
//! the CLI, plus the container stop webhook payload.

pub mod hook;
pub mod job;
