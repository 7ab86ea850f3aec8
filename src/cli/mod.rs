//! CLI module for toolgate - command-line interface and subcommands.
//!
//! One binary runs every process of a deployment: the gateway, either tool
//! provider, or the interactive client.

pub mod commands;

pub use commands::Cli;
