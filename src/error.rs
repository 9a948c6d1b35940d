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

//! Error types for resolution, build, and install phases.

use thiserror::Error;

/// Main error type for aurforge operations
#[derive(Debug, Error)]
pub enum AurforgeError {
    /// A required dependency exists in no known universe (local, repos, AUR).
    /// Fatal to the owning package only; the orchestrator drops the package
    /// and continues with the rest of the set.
    #[error("dependency '{dependency}' of '{package}' is not available from any source")]
    UnsatisfiableDependency { package: String, dependency: String },

    /// A name was requested while still on its own resolution path
    #[error("cyclic dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// Snapshot download or extraction failed for one package
    #[error("could not fetch sources for '{package}': {reason}")]
    FetchFailed { package: String, reason: String },

    /// makepkg invocation failed for one package
    #[error("build failed for '{package}': {reason}")]
    BuildFailed {
        package: String,
        reason: String,
        exit_code: Option<i32>,
    },

    /// A package-manager batch call failed. Triggers immediate cleanup for
    /// that phase; the run continues with subsequent independent phases.
    #[error("install failed during {phase}: {reason}")]
    InstallFailed { phase: String, reason: String },

    /// Metadata service did not answer within the request timeout
    #[error("metadata service timed out for {url}")]
    MetadataTimeout { url: String },

    /// Metadata service connection failed
    #[error("metadata service unreachable at {url}: {message}")]
    MetadataConnection { url: String, message: String },

    /// Metadata service still failing after all retry attempts
    #[error("metadata service unreachable at {url} after {attempts} attempts")]
    MetadataRetriesExhausted { url: String, attempts: u32 },

    /// RPC answered but flagged the request as erroneous
    #[error("metadata service error: {message}")]
    MetadataService { message: String },

    /// File system errors around the storage root
    #[error("file system error for '{path}': {message}")]
    FileSystem {
        path: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl AurforgeError {
    /// Metadata-service failures abort the whole invocation; everything else
    /// is handled at package or phase level.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AurforgeError::MetadataTimeout { .. }
                | AurforgeError::MetadataConnection { .. }
                | AurforgeError::MetadataRetriesExhausted { .. }
                | AurforgeError::MetadataService { .. }
        )
    }

    /// Create a filesystem error
    pub fn filesystem(
        path: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        AurforgeError::FileSystem {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }
}

/// Result type alias for aurforge operations
pub type AurforgeResult<T> = std::result::Result<T, AurforgeError>;
