//! CLI module - command-line interface
//!
//! Contains the coordinator REPL and slash-command parsing.

pub mod commands;
pub mod repl;

pub use repl::{run_once, Repl};
