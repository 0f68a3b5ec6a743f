//! Nix interaction layer
//!
//! This module handles all interactions with NixOS:
//! - Configuration source detection (flakes vs channels)
//! - Generation listing and metadata parsing
//! - Building closures
//! - Closure diffs and specialisation lookup
//! - Command execution (profile updates, activation, deletion)

pub mod build;
pub mod commands;
pub mod detect;
pub mod diff;
pub mod generations;
pub mod specialisation;
