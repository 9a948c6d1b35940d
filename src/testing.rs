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

//! In-memory fakes for the external collaborators, shared by the unit
//! tests. The pacman fake records every mutating call so tests can assert
//! on call ordering.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::aur::builder::SourceBuilder;
use crate::aur::client::{AurRecord, MetadataSource};
use crate::aur::package::Package;
use crate::cache::parse_artifact_name;
use crate::error::{AurforgeError, AurforgeResult};
use crate::pacman::PackageManager;
use crate::review::ReviewGate;

/// Build a minimal AUR record fixture (version `1.0-1`)
pub fn record(name: &str, deps: &[&str], makedeps: &[&str], optdeps: &[&str]) -> AurRecord {
    AurRecord {
        name: name.to_string(),
        package_base: name.to_string(),
        version: "1.0-1".to_string(),
        description: Some(format!("{} fixture", name)),
        url: None,
        maintainer: Some("tester".to_string()),
        first_submitted: 1_600_000_000,
        num_votes: 1,
        popularity: 0.1,
        out_of_date: None,
        depends: deps.iter().map(|s| s.to_string()).collect(),
        make_depends: makedeps.iter().map(|s| s.to_string()).collect(),
        opt_depends: optdeps.iter().map(|s| s.to_string()).collect(),
        conflicts: vec![],
        provides: vec![],
        replaces: vec![],
        groups: vec![],
        license: vec!["MIT".to_string()],
    }
}

/// Metadata service backed by a fixed record set
pub struct FakeMetadata {
    records: HashMap<String, AurRecord>,
    fail: bool,
}

impl FakeMetadata {
    pub fn with_records(records: Vec<AurRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.name.clone(), r)).collect(),
            fail: false,
        }
    }

    /// A service that is unreachable; every call times out
    pub fn unreachable() -> Self {
        Self {
            records: HashMap::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl MetadataSource for FakeMetadata {
    async fn info(&self, names: &[String]) -> AurforgeResult<Vec<AurRecord>> {
        if self.fail {
            return Err(AurforgeError::MetadataTimeout {
                url: "fake://rpc".to_string(),
            });
        }
        Ok(names
            .iter()
            .filter_map(|n| self.records.get(n).cloned())
            .collect())
    }

    async fn search(&self, term: &str) -> AurforgeResult<Vec<AurRecord>> {
        if self.fail {
            return Err(AurforgeError::MetadataTimeout {
                url: "fake://rpc".to_string(),
            });
        }
        Ok(self
            .records
            .values()
            .filter(|r| r.name.contains(term))
            .cloned()
            .collect())
    }
}

/// Package manager fake with a mutable installed set and a call journal
#[derive(Default)]
pub struct FakePacman {
    installed: Mutex<HashSet<String>>,
    foreign: HashMap<String, String>,
    repos: HashSet<String>,
    pub calls: Mutex<Vec<String>>,
    fail_repo_install: bool,
    fail_file_install: bool,
}

impl FakePacman {
    pub fn with_repo_package(mut self, name: &str) -> Self {
        self.repos.insert(name.to_string());
        self
    }

    pub fn failing_repo_install(mut self) -> Self {
        self.fail_repo_install = true;
        self
    }

    pub fn failing_file_install(mut self) -> Self {
        self.fail_file_install = true;
        self
    }

    pub fn with_installed(self, name: &str) -> Self {
        self.installed
            .lock()
            .unwrap()
            .insert(name.to_string());
        self
    }

    pub fn with_foreign(mut self, name: &str, version: &str) -> Self {
        self.foreign.insert(name.to_string(), version.to_string());
        self.installed.lock().unwrap().insert(name.to_string());
        self
    }

    fn journal(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }

    pub fn journal_entries(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl PackageManager for FakePacman {
    fn installed_versions(&self) -> anyhow::Result<HashMap<String, String>> {
        Ok(self.foreign.clone())
    }

    fn is_in_repos(&self, name: &str) -> bool {
        self.repos.contains(name)
    }

    fn find_local_satisfier(&self, name: &str) -> bool {
        self.installed.lock().unwrap().contains(name)
    }

    fn install_repo_packages(&self, names: &[String], as_dependency: bool) -> anyhow::Result<()> {
        self.journal(format!(
            "repo-install[asdeps={}]:{}",
            as_dependency,
            names.join(",")
        ));
        if self.fail_repo_install {
            anyhow::bail!("refusing repo install");
        }
        let mut installed = self.installed.lock().unwrap();
        for name in names {
            installed.insert(name.clone());
        }
        Ok(())
    }

    fn install_package_files(&self, paths: &[PathBuf], as_dependency: bool) -> anyhow::Result<()> {
        let names: Vec<String> = paths
            .iter()
            .filter_map(|p| p.file_name().and_then(|f| f.to_str()))
            .filter_map(|f| parse_artifact_name(f).map(|(name, _)| name))
            .collect();
        self.journal(format!(
            "file-install[asdeps={}]:{}",
            as_dependency,
            names.join(",")
        ));
        if self.fail_file_install {
            anyhow::bail!("refusing file install");
        }
        let mut installed = self.installed.lock().unwrap();
        for name in names {
            installed.insert(name);
        }
        Ok(())
    }

    fn remove_packages(&self, names: &[String]) -> anyhow::Result<()> {
        self.journal(format!("remove:{}", names.join(",")));
        let mut installed = self.installed.lock().unwrap();
        for name in names {
            installed.remove(name);
        }
        Ok(())
    }

    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }
}

/// Builder fake: "fetches" by creating a working directory with a stub
/// PKGBUILD, "builds" by dropping an artifact file into a cache directory
pub struct FakeBuilder {
    root: PathBuf,
    pub calls: Mutex<Vec<String>>,
    fail_builds: HashSet<String>,
}

impl FakeBuilder {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            calls: Mutex::new(Vec::new()),
            fail_builds: HashSet::new(),
        }
    }

    pub fn failing_for(root: &Path, names: &[&str]) -> Self {
        Self {
            root: root.to_path_buf(),
            calls: Mutex::new(Vec::new()),
            fail_builds: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn journal_entries(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn source_dir_for(&self, base: &str) -> PathBuf {
        self.root.join("build").join(base)
    }
}

#[async_trait]
impl SourceBuilder for FakeBuilder {
    async fn fetch(&self, record: &AurRecord) -> AurforgeResult<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("fetch:{}", record.name));

        let dir = self.source_dir_for(&record.package_base);
        std::fs::create_dir_all(&dir).map_err(|e| {
            AurforgeError::filesystem(dir.display().to_string(), "create fake workdir", e)
        })?;
        std::fs::write(dir.join("PKGBUILD"), format!("pkgname={}\n", record.name)).map_err(
            |e| AurforgeError::filesystem(dir.display().to_string(), "write fake PKGBUILD", e),
        )?;
        Ok(dir)
    }

    fn build(&self, _source_dir: &Path, name: &str) -> AurforgeResult<Vec<PathBuf>> {
        self.calls.lock().unwrap().push(format!("build:{}", name));

        if self.fail_builds.contains(name) {
            return Err(AurforgeError::BuildFailed {
                package: name.to_string(),
                reason: "fixture build failure".to_string(),
                exit_code: Some(2),
            });
        }

        let cache = self.root.join("cache");
        std::fs::create_dir_all(&cache).map_err(|e| {
            AurforgeError::filesystem(cache.display().to_string(), "create fake cache", e)
        })?;
        let artifact = cache.join(format!("{}-1.0-1-x86_64.pkg.tar", name));
        std::fs::write(&artifact, b"artifact").map_err(|e| {
            AurforgeError::filesystem(artifact.display().to_string(), "write fake artifact", e)
        })?;
        Ok(vec![artifact])
    }
}

/// Review gate rejecting a fixed name set
pub struct RejectNames {
    reject: HashSet<String>,
}

impl RejectNames {
    pub fn new(names: &[&str]) -> Self {
        Self {
            reject: names.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ReviewGate for RejectNames {
    fn review(&self, pkg: &Package) -> bool {
        !self.reject.contains(&pkg.name)
    }
}
