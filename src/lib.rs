//! Interpret model-generated automation scripts inside a sandbox directory.
//!
//! [`engine::ScriptEngine`] is the entry point: it classifies each line of a
//! script, runs commands through an [`exec::CommandRunner`] while tracking the
//! working directory, and returns a [`report::ScriptReport`].

pub mod backend;
pub mod cli;
pub mod config;
pub mod engine;
pub mod exec;
pub mod log;
pub mod render;
pub mod report;
pub mod sandbox;
pub mod script;
pub mod shell_completion;
