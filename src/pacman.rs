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

//! Package-manager collaborator: local state queries and install/remove
//! transactions, driven through the pacman CLI.

use anyhow::{anyhow, Context, Result};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Interface to the system package manager.
///
/// The solver and transaction engine stay on pacman's side of this seam;
/// aurforge only queries state and hands over batch installs/removals.
pub trait PackageManager: Send + Sync {
    /// Versions of installed packages not tracked by official repositories
    fn installed_versions(&self) -> Result<HashMap<String, String>>;

    /// Whether a sync database carries this name
    fn is_in_repos(&self, name: &str) -> bool;

    /// Whether anything installed locally satisfies this name (including
    /// provides and version constraints)
    fn find_local_satisfier(&self, name: &str) -> bool;

    /// Batch-install repo packages
    fn install_repo_packages(&self, names: &[String], as_dependency: bool) -> Result<()>;

    /// Batch-install built artifact files
    fn install_package_files(&self, paths: &[PathBuf], as_dependency: bool) -> Result<()>;

    /// Batch-remove packages together with their unneeded dependencies
    fn remove_packages(&self, names: &[String]) -> Result<()>;

    /// Compare two package versions with pacman's vercmp semantics
    fn compare_versions(&self, a: &str, b: &str) -> Ordering;
}

/// The real pacman, invoked as a subprocess
pub struct Pacman;

impl Pacman {
    pub fn new() -> Result<Self> {
        which::which("pacman").context("pacman not found in PATH")?;
        Ok(Self)
    }
}

impl PackageManager for Pacman {
    fn installed_versions(&self) -> Result<HashMap<String, String>> {
        let output = Command::new("pacman")
            .args(["-Qm"])
            .stderr(Stdio::null())
            .output()
            .context("failed to run pacman -Qm")?;

        // pacman -Qm exits non-zero when no foreign packages exist
        if !output.status.success() {
            return Ok(HashMap::new());
        }

        Ok(parse_query_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn is_in_repos(&self, name: &str) -> bool {
        Command::new("pacman")
            .args(["-Si", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn find_local_satisfier(&self, name: &str) -> bool {
        // pacman -T prints unsatisfied deps and exits 0 iff all are satisfied
        Command::new("pacman")
            .args(["-T", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn install_repo_packages(&self, names: &[String], as_dependency: bool) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        let mut cmd = Command::new("sudo");
        cmd.args(["pacman", "-S", "--noconfirm", "--needed"]);
        if as_dependency {
            cmd.arg("--asdeps");
        }
        cmd.args(names);

        let status = cmd
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .context("failed to run pacman -S")?;

        if !status.success() {
            return Err(anyhow!(
                "pacman -S failed for {} package(s)",
                names.len()
            ));
        }
        Ok(())
    }

    fn install_package_files(&self, paths: &[PathBuf], as_dependency: bool) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut cmd = Command::new("sudo");
        cmd.args(["pacman", "-U", "--noconfirm"]);
        if as_dependency {
            cmd.arg("--asdeps");
        }
        cmd.args(paths);

        let status = cmd
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .context("failed to run pacman -U")?;

        if !status.success() {
            return Err(anyhow!(
                "pacman -U failed for {} file(s)",
                paths.len()
            ));
        }
        Ok(())
    }

    fn remove_packages(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        let status = Command::new("sudo")
            .args(["pacman", "-Rns", "--noconfirm"])
            .args(names)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .context("failed to run pacman -Rns")?;

        if !status.success() {
            return Err(anyhow!(
                "pacman -Rns failed for {} package(s)",
                names.len()
            ));
        }
        Ok(())
    }

    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        let output = Command::new("vercmp")
            .args([a, b])
            .stderr(Stdio::null())
            .output();

        if let Ok(output) = output {
            if output.status.success() {
                let text = String::from_utf8_lossy(&output.stdout);
                if let Ok(n) = text.trim().parse::<i32>() {
                    return n.cmp(&0);
                }
            }
        }

        // vercmp unavailable; fall back to a lexicographic comparison
        a.cmp(b)
    }
}

/// Parse `pacman -Q`-style output (one `name version` pair per line)
fn parse_query_list(text: &str) -> HashMap<String, String> {
    let mut versions = HashMap::new();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        if let (Some(name), Some(version)) = (parts.next(), parts.next()) {
            versions.insert(name.to_string(), version.to_string());
        }
    }
    versions
}
