//! Core domain types
//!
//! These types are owned by the agent's job registry and travel unchanged
//! to the gateway and the CLI.

pub mod job;
