//! # guardian-rdp: screen streaming server and viewer
//!
//! Library half of the `guardian-rdp` binary.
//!
//! - **config**: TOML configuration, pipeline factory and address helpers.
//! - **display**: `SnapshotSink`, the headless viewer display.
//! - **viewer**: `TerminalSink`, the live full-screen terminal viewer.

pub mod config;
pub mod display;
pub mod viewer;
