//! Core of the governance engine.
//!
//! Shared primitives (errors, store root, broker, config, output) and the
//! engine proper: context schema, decisions, policies, the evaluator
//! registry, the orchestrator and the gate.

pub mod broker;
pub mod config;
pub mod context;
pub mod db;
pub mod decision;
pub mod decision_log;
pub mod error;
pub mod evaluator;
pub mod gate;
pub mod orchestrator;
pub mod output;
pub mod policy;
pub mod policy_store;
pub mod registry;
pub mod schemas;
pub mod store;
pub mod time;
