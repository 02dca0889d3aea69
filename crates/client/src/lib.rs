//! Job orchestration client for the allocation-simulation service.
//!
//! Provides the HTTP job API wrapper, the multiplexed WebSocket
//! progress channel, typed wire schemas, reconnection logic, and the
//! [`controller::JobController`] state machine that ties them together.

pub mod api;
pub mod backoff;
pub mod channel;
pub mod config;
pub mod controller;
pub mod messages;
