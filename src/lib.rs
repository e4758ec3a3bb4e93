//! stackup provisions the AGiXT platform, optionally with the ezlocalai
//! inference sidecar, either as a single-host container stack or on a
//! self-hosted k3s cluster.
//!
//! The deployment core never talks to the host directly. Commands, files,
//! sleeping and public-address lookup go through the seams in [`system`],
//! so every step can be driven by the in-memory doubles in
//! [`system::testing`].

pub mod cli;
pub mod cluster;
pub mod config;
pub mod deploy;
pub mod exposure;
pub mod gpu;
pub mod manifest;
pub mod system;
