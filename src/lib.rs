//! # Claude Watcher
//!
//! Session usage and quota tracking for Claude Code, driven by the
//! session-end hook.
//!
//! ## Overview
//!
//! Each finished session's JSONL transcript is parsed into statistics
//! (prompts, tool calls, token counts, files touched) plus any quota
//! messages the assistant or system emitted. Sessions are priced per model
//! and stored in SQLite, quota messages become limit events annotated with
//! the usage accumulated since the previous event, and two rolling windows
//! (the plan's short window and a weekly one) track consumption against
//! preset or learned token limits.
//!
//! ## Features
//!
//! - `colors` (default): Enables terminal color output via owo-colors

/// Command-line argument parsing
pub mod cli;

/// Settings resolution from flags, environment, and the settings file
pub mod config;

/// SQLite persistence for sessions, limit events, and plan state
pub mod db;

/// Text output for the subcommands
pub mod display;

/// Quota message classification
pub mod limits;

/// Data models for hooks, transcript lines, sessions, and plans
pub mod models;

/// Model-specific pricing calculations
pub mod pricing;

/// Session ingestion and limit learning
pub mod tracker;

/// Streaming transcript parser
pub mod transcript;

/// Utility functions for paths, identity, and formatting
pub mod utils;

/// Usage window resets and metrics
pub mod window;
