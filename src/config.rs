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

//! Configuration with file, environment, and CLI precedence.

use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

/// What to do with per-package source directories after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeepSources {
    /// Remove sources for built and skipped packages alike
    None,
    /// Retain sources only for packages that were skipped
    Skipped,
    /// Retain all sources
    All,
}

impl FromStr for KeepSources {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(KeepSources::None),
            "skipped" => Ok(KeepSources::Skipped),
            "all" => Ok(KeepSources::All),
            other => Err(format!(
                "invalid source retention mode '{}' (expected none, skipped or all)",
                other
            )),
        }
    }
}

/// Rebuild behavior for already-installed packages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rebuild {
    /// Installed packages are left alone
    #[default]
    No,
    /// Requested packages are rebuilt even when installed
    Package,
    /// Requested packages and their AUR dependency tree are rebuilt
    Tree,
}

/// Main configuration, threaded explicitly into every component
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the local storage tree (cache/, build/, logs/)
    pub storage_root: PathBuf,

    /// AUR RPC base URL
    pub rpc_url: String,

    /// Bounded worker pool size for concurrent package resolution
    pub resolve_jobs: usize,

    /// Per-request timeout against the metadata service, in seconds
    pub request_timeout_secs: u64,

    /// Metadata request attempts before giving up
    pub request_retries: u32,

    /// Source retention mode
    pub keep_sources: KeepSources,

    /// Build packages but skip the final install phase
    #[serde(skip)]
    pub build_only: bool,

    /// Install requested packages as dependencies
    #[serde(skip)]
    pub install_as_dep: bool,

    /// Accept every review without prompting
    #[serde(skip)]
    pub noconfirm: bool,

    /// Rebuild mode for installed packages
    #[serde(skip)]
    pub rebuild: Rebuild,
}

impl Default for Config {
    fn default() -> Self {
        let storage_root = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("aurforge");
        Self {
            storage_root,
            rpc_url: "https://aur.archlinux.org/rpc/".to_string(),
            resolve_jobs: 8,
            request_timeout_secs: 30,
            request_retries: 3,
            keep_sources: KeepSources::None,
            build_only: false,
            install_as_dep: false,
            noconfirm: false,
            rebuild: Rebuild::No,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then `~/.config/aurforge/config.toml`,
    /// then `AURFORGE_*` environment overrides.
    pub fn load() -> Self {
        let mut config = Config::default();

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("aurforge").join("config.toml");
            if user_config.exists() {
                if let Ok(content) = fs::read_to_string(&user_config) {
                    match toml::from_str::<Config>(&content) {
                        Ok(parsed) => config = parsed,
                        Err(e) => {
                            tracing::warn!("ignoring malformed {}: {}", user_config.display(), e);
                        }
                    }
                }
            }
        }

        config.apply_env_overrides()
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("AURFORGE_ROOT") {
            if !val.is_empty() {
                self.storage_root = PathBuf::from(val);
            }
        }
        if let Ok(val) = std::env::var("AURFORGE_RPC_URL") {
            if !val.is_empty() {
                self.rpc_url = val;
            }
        }
        if let Ok(val) = std::env::var("AURFORGE_RESOLVE_JOBS") {
            if let Ok(n) = val.parse() {
                self.resolve_jobs = n;
            }
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.resolve_jobs == 0 {
            return Err("resolve_jobs must be at least 1".to_string());
        }
        if self.resolve_jobs > 32 {
            return Err("resolve_jobs must be at most 32".to_string());
        }
        if self.request_retries == 0 {
            return Err("request_retries must be at least 1".to_string());
        }
        Ok(())
    }

    /// Built artifacts land here (also used as PKGDEST during builds)
    pub fn cache_dir(&self) -> PathBuf {
        self.storage_root.join("cache")
    }

    /// Per-package working directories
    pub fn build_dir(&self) -> PathBuf {
        self.storage_root.join("build")
    }

    /// Build tool logs
    pub fn log_dir(&self) -> PathBuf {
        self.storage_root.join("logs")
    }

    /// Create the storage tree if missing
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.cache_dir())?;
        fs::create_dir_all(self.build_dir())?;
        fs::create_dir_all(self.log_dir())?;
        Ok(())
    }
}
