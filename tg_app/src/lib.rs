//! # tg_app
//!
//! Shared utilities for the tollgate server binary

pub mod cli;
pub mod config_loader;
pub mod shutdown_handler;
pub mod tracing_setup;
