//! Archgraph - an in-memory architecture dependency graph engine.
//!
//! The crate models software modules and their dependencies, enforces
//! structural rules, computes change impact and circular dependencies,
//! simulates edits before they land and executes multi-step plans atomically
//! with snapshot/rollback support.
//!
//! The entry point for services is [`registry::GraphRegistry`], which owns one
//! [`registry::ProjectEngine`] per project and hydrates it from an
//! [`persistence::ArchitectureStore`] on first access.

#![forbid(unsafe_code)]

// Public modules for library usage
pub mod analysis;
pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod id_generation;
pub mod monitor;
pub mod persistence;
pub mod plan;
pub mod registry;
pub mod rules;
pub mod simulation;
pub mod versioning;

// Filesystem commands (init, repository discovery)
pub mod commands;

// Public CLI module (needed by binary)
pub mod cli;

// Internal modules (not exposed as public API)
pub(crate) mod app;
pub(crate) mod output;
