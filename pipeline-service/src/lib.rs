//! pipeline-service: document conversion jobs over HTTP.
//!
//! Requests are validated, registered with the [`services::StatusTracker`] and queued by
//! the [`services::JobDispatcher`]; a fixed [`workers::WorkerPool`] drains the queue and
//! drives each job through the external [`workers::Converter`].
pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
pub mod workers;
