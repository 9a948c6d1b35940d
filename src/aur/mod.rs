/*
 * aurforge - AUR build helper with full dependency-graph resolution.
 * Copyright (C) 2025  aurforge contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! AUR (Arch User Repository) support module.
//!
//! Provides:
//! - RPC metadata client with caching
//! - Package-node graph resolution with session-scoped dedup
//! - Snapshot fetching and makepkg builds
//! - The recursive build orchestrator

pub mod builder;
pub mod client;
pub mod orchestrator;
pub mod package;

pub use client::{AurRecord, MetadataSource, RpcClient};
pub use orchestrator::Orchestrator;
pub use package::{Origin, Package, Session};

use serde::Deserialize;

/// AUR RPC API response wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    pub version: u32,
    #[serde(rename = "type")]
    pub response_type: String,
    pub resultcount: usize,
    pub results: Vec<AurRecord>,
    pub error: Option<String>,
}
