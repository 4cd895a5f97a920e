//! GPU Job Dispatch Layer
//!
//! This library provides the core of the gpu-dispatch system: an always-on
//! orchestrator API that registers and queues GPU-bound image-processing
//! jobs, a worker adapter that drives them through the inference engine on
//! the GPU host, and an idle detector that powers the host down after a
//! sustained window of zero queued work.

pub mod app_state;
pub mod config;
pub mod db;
pub mod idle;
pub mod models;
pub mod routes;
pub mod services;
pub mod worker;
