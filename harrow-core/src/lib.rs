//! Harrow Core
//!
//! Core types shared by the Harrow test job agent, its client and the gateway.
//!
//! This crate contains:
//! - Domain types: job descriptor, job state and status
//! - DTOs: request/response bodies exchanged over HTTP

pub mod domain;
pub mod dto;
