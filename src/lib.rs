//! Cli/daemon pair that turns a Zei octahedron into a time tracking remote. Rotating the device
//! starts the activity assigned to the side facing up and stops whatever ran before.
//!

pub mod cli;
pub mod config;
pub mod daemon;
pub mod link;
pub mod notes;
pub mod remote;
pub mod utils;
