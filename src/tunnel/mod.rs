// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Tunnel lifecycle: spawning, supervising and terminating telepresence.

pub mod manager;
pub mod process;

pub use manager::TunnelManager;
pub use process::{TunnelProcess, TunnelState};
