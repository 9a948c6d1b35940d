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

//! Package nodes and the session-scoped dependency graph.
//!
//! A [`Session`] owns one resolution pass: every distinct package name maps
//! to at most one [`Package`] node, shared via `Arc` between all of its
//! dependents. Construction classifies the name against the local state, the
//! sync repositories and the AUR, then recursively resolves declared
//! dependency lists through the same session so diamonds collapse into a
//! single node.

use futures::future::BoxFuture;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

use super::builder::SourceBuilder;
use super::client::{parse_dependency, parse_optdep, AurRecord, MetadataSource};
use crate::config::{Config, Rebuild};
use crate::error::{AurforgeError, AurforgeResult};
use crate::pacman::PackageManager;
use crate::review::ReviewGate;

/// Where a package can be satisfied from, computed once at classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Not installed, not in any repo, no AUR record
    Unavailable,
    /// Only known as a local install (foreign, vanished from the AUR)
    Installed,
    /// Official repositories only
    RepoOnly,
    /// AUR record only
    AurOnly,
    /// AUR record and official repositories both
    Both,
}

impl Origin {
    fn classify(installed: bool, in_repos: bool, in_aur: bool) -> Self {
        match (in_aur, in_repos) {
            (true, true) => Origin::Both,
            (true, false) => Origin::AurOnly,
            (false, true) => Origin::RepoOnly,
            (false, false) => {
                if installed {
                    Origin::Installed
                } else {
                    Origin::Unavailable
                }
            }
        }
    }
}

/// Review gate outcome for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Result of a best-effort source removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    AlreadyAbsent,
    /// Removal failed; logged, never fatal
    Failed,
}

/// One package name within a resolution session
pub struct Package {
    pub name: String,
    pub installed: bool,
    pub origin: Origin,
    pub version: Option<String>,
    pub record: Option<AurRecord>,
    source_dir: Option<PathBuf>,
    deps: Vec<Arc<Package>>,
    makedeps: Vec<Arc<Package>>,
    optdeps: Vec<(Arc<Package>, Vec<String>)>,
    review_status: Mutex<ReviewStatus>,
    built: OnceLock<Vec<PathBuf>>,
    sources_present: AtomicBool,
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("installed", &self.installed)
            .field("deps", &self.deps.iter().map(|d| &d.name).collect::<Vec<_>>())
            .field("makedeps", &self.makedeps.iter().map(|d| &d.name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Package {
    fn leaf(name: String, installed: bool, origin: Origin) -> Self {
        Self {
            name,
            installed,
            origin,
            version: None,
            record: None,
            source_dir: None,
            deps: Vec::new(),
            makedeps: Vec::new(),
            optdeps: Vec::new(),
            review_status: Mutex::new(ReviewStatus::Pending),
            built: OnceLock::new(),
            sources_present: AtomicBool::new(false),
        }
    }

    pub fn in_aur(&self) -> bool {
        matches!(self.origin, Origin::AurOnly | Origin::Both)
    }

    pub fn in_repos(&self) -> bool {
        matches!(self.origin, Origin::RepoOnly | Origin::Both)
    }

    /// Whether this name can be satisfied at all (locally, from repos, or by
    /// building from the AUR)
    pub fn satisfiable(&self) -> bool {
        self.installed || self.origin != Origin::Unavailable
    }

    /// A make-dependency can be met when it is installed, repo-installable,
    /// or buildable from source
    pub fn makedep_satisfiable(&self) -> bool {
        self.satisfiable()
    }

    /// Apply the review gate. The gate runs at most once per session; later
    /// calls return the recorded outcome.
    pub fn review(&self, gate: &dyn ReviewGate) -> bool {
        let mut status = self
            .review_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *status {
            ReviewStatus::Pending => {
                let accepted = gate.review(self);
                *status = if accepted {
                    ReviewStatus::Accepted
                } else {
                    ReviewStatus::Rejected
                };
                accepted
            }
            ReviewStatus::Accepted => true,
            ReviewStatus::Rejected => false,
        }
    }

    pub fn review_status(&self) -> ReviewStatus {
        *self
            .review_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Direct make-dependency nodes
    pub fn makedeps(&self) -> &[Arc<Package>] {
        &self.makedeps
    }

    /// Direct regular dependency nodes
    pub fn deps(&self) -> &[Arc<Package>] {
        &self.deps
    }

    /// Optional dependencies as (name, descriptions) pairs; informational
    /// only, never consumed for build or install decisions
    pub fn optdeps(&self) -> Vec<(String, Vec<String>)> {
        self.optdeps
            .iter()
            .map(|(node, descs)| (node.name.clone(), descs.clone()))
            .collect()
    }

    /// Currently-uninstalled, repo-satisfiable packages in the regular
    /// dependency closure of this node
    pub fn repo_deps(&self) -> Vec<Arc<Package>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.walk_deps(&mut seen, &mut |node| {
            if node.in_repos() && !node.installed {
                out.push(node.clone());
            }
        });
        out
    }

    /// Built artifacts collected across the regular dependency closure
    pub fn dep_artifacts(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.walk_deps(&mut seen, &mut |node| {
            out.extend(node.built_pkgs().iter().cloned());
        });
        out
    }

    /// Depth-first walk over the regular dependency closure, excluding self
    fn walk_deps(&self, seen: &mut HashSet<String>, visit: &mut impl FnMut(&Arc<Package>)) {
        for dep in &self.deps {
            if seen.insert(dep.name.clone()) {
                visit(dep);
                dep.walk_deps(seen, visit);
            }
        }
    }

    /// Artifact files produced by this node's build, empty until success
    pub fn built_pkgs(&self) -> &[PathBuf] {
        self.built.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn source_dir(&self) -> Option<&Path> {
        self.source_dir.as_deref()
    }

    pub fn sources_present(&self) -> bool {
        self.sources_present.load(AtomicOrdering::Relaxed)
    }

    /// Build this node via the session's build toolchain.
    ///
    /// With `recursive`, uninstalled AUR-origin regular dependencies are
    /// built and their artifacts installed (as dependencies) first, so the
    /// toolchain's own dependency check can succeed. Prerequisites that are
    /// neither installed nor buildable fail the build.
    pub fn build(&self, session: &Session, recursive: bool) -> AurforgeResult<()> {
        if self.built.get().is_some() {
            return Ok(());
        }

        if recursive {
            for dep in &self.deps {
                let force_rebuild = session.cfg.rebuild == Rebuild::Tree && dep.in_aur();
                // the classification snapshot goes stale once the
                // orchestrator starts installing, so ask pacman live
                let satisfied =
                    dep.installed || session.pacman.find_local_satisfier(&dep.name);
                if satisfied && !force_rebuild {
                    continue;
                }
                if dep.in_aur() {
                    if dep.built_pkgs().is_empty() {
                        dep.build(session, recursive)?;
                    }
                    if !satisfied {
                        // the toolchain resolves prerequisites against the
                        // installed state, so the artifact goes in first
                        session
                            .pacman
                            .install_package_files(&dep.built_pkgs().to_vec(), true)
                            .map_err(|e| AurforgeError::InstallFailed {
                                phase: format!("build prerequisite '{}'", dep.name),
                                reason: e.to_string(),
                            })?;
                    }
                } else {
                    return Err(AurforgeError::BuildFailed {
                        package: self.name.clone(),
                        reason: format!("prerequisite '{}' is not installed", dep.name),
                        exit_code: None,
                    });
                }
            }
        }

        let source_dir = self.source_dir.as_deref().ok_or_else(|| {
            AurforgeError::BuildFailed {
                package: self.name.clone(),
                reason: "no sources fetched".to_string(),
                exit_code: None,
            }
        })?;

        let artifacts = session.builder.build(source_dir, &self.name)?;
        // first (and only) build of this node in the session
        let _ = self.built.set(artifacts);
        Ok(())
    }

    /// Best-effort removal of the working directory. Idempotent; permission
    /// problems surface as a warning, never as an abort.
    pub fn remove_sources(&self) -> RemoveOutcome {
        let Some(dir) = self.source_dir.as_deref() else {
            return RemoveOutcome::AlreadyAbsent;
        };
        if !dir.exists() {
            self.sources_present.store(false, AtomicOrdering::Relaxed);
            return RemoveOutcome::AlreadyAbsent;
        }
        match std::fs::remove_dir_all(dir) {
            Ok(()) => {
                self.sources_present.store(false, AtomicOrdering::Relaxed);
                tracing::debug!("removed sources of {} at {}", self.name, dir.display());
                RemoveOutcome::Removed
            }
            Err(e) => {
                tracing::warn!(
                    "could not remove sources of {} at {}: {}",
                    self.name,
                    dir.display(),
                    e
                );
                RemoveOutcome::Failed
            }
        }
    }
}

/// Candidate classification for a requested name set
#[derive(Debug, Default)]
pub struct Classified {
    /// Names with an AUR record; these proceed to node construction
    pub aur: Vec<String>,
    /// Names only available from official repositories
    pub repo_only: Vec<String>,
    /// Names available nowhere
    pub not_found: Vec<String>,
    /// Names already satisfied locally and up to date (install action only)
    pub satisfied: Vec<String>,
}

/// One resolution pass: collaborators plus the name-keyed node cache
pub struct Session {
    pub cfg: Config,
    pub metadata: Arc<dyn MetadataSource>,
    pub pacman: Arc<dyn PackageManager>,
    pub builder: Arc<dyn SourceBuilder>,
    nodes: AsyncMutex<HashMap<String, Arc<Package>>>,
}

impl Session {
    pub fn new(
        cfg: Config,
        metadata: Arc<dyn MetadataSource>,
        pacman: Arc<dyn PackageManager>,
        builder: Arc<dyn SourceBuilder>,
    ) -> Self {
        Self {
            cfg,
            metadata,
            pacman,
            builder,
            nodes: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Split requested names into the disjoint candidate sets.
    ///
    /// Order within each set follows the input order so reporting stays
    /// deterministic. With rebuild mode off, names whose installed version
    /// is not older than the AUR candidate land in `satisfied`.
    pub async fn classify(&self, names: &[String]) -> AurforgeResult<Classified> {
        let mut unique = Vec::new();
        let mut seen = HashSet::new();
        for name in names {
            if seen.insert(name.clone()) {
                unique.push(name.clone());
            }
        }

        let records: HashMap<String, AurRecord> = self
            .metadata
            .info(&unique)
            .await?
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();
        let foreign = self.pacman.installed_versions().unwrap_or_default();

        let mut classified = Classified::default();
        for name in unique {
            if let Some(record) = records.get(&name) {
                let up_to_date = match foreign.get(&name) {
                    Some(installed_version) => {
                        self.pacman
                            .compare_versions(installed_version, &record.version)
                            != std::cmp::Ordering::Less
                    }
                    None => self.pacman.find_local_satisfier(&name),
                };
                if self.cfg.rebuild == Rebuild::No && up_to_date {
                    classified.satisfied.push(name);
                } else {
                    classified.aur.push(name);
                }
            } else if self.pacman.is_in_repos(&name) {
                classified.repo_only.push(name);
            } else if self.pacman.find_local_satisfier(&name) {
                classified.satisfied.push(name);
            } else {
                classified.not_found.push(name);
            }
        }
        Ok(classified)
    }

    /// Resolve a single name into its (possibly shared) node
    pub async fn resolve(&self, name: &str) -> AurforgeResult<Arc<Package>> {
        self.resolve_inner(name.to_string(), Vec::new()).await
    }

    /// Construct nodes for a candidate set concurrently, bounded by the
    /// configured worker pool. Failed constructions are logged and dropped;
    /// a failure never cancels sibling constructions. Metadata-service
    /// failures abort the pass. Result order follows input order.
    pub async fn resolve_all(&self, names: &[String]) -> AurforgeResult<Vec<Arc<Package>>> {
        let tasks = names.iter().cloned().enumerate().map(|(idx, name)| {
            async move {
                match self.resolve(&name).await {
                    Ok(node) => Ok((idx, Some(node))),
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => {
                        tracing::warn!("skipping {}: {}", name, e);
                        Ok((idx, None))
                    }
                }
            }
        });

        let mut indexed: Vec<(usize, Option<Arc<Package>>)> = futures::stream::iter(tasks)
            .buffer_unordered(self.cfg.resolve_jobs)
            .collect::<Vec<AurforgeResult<_>>>()
            .await
            .into_iter()
            .collect::<AurforgeResult<Vec<_>>>()?;

        indexed.sort_by_key(|(idx, _)| *idx);
        Ok(indexed.into_iter().filter_map(|(_, node)| node).collect())
    }

    fn resolve_inner(
        &self,
        name: String,
        path: Vec<String>,
    ) -> BoxFuture<'_, AurforgeResult<Arc<Package>>> {
        Box::pin(async move {
            if let Some(existing) = self.nodes.lock().await.get(&name) {
                return Ok(existing.clone());
            }

            if let Some(pos) = path.iter().position(|p| *p == name) {
                let mut cycle = path[pos..].to_vec();
                cycle.push(name.clone());
                return Err(AurforgeError::CyclicDependency { cycle });
            }

            let installed = self.pacman.find_local_satisfier(&name);
            let in_repos = self.pacman.is_in_repos(&name);
            let record = self
                .metadata
                .info(std::slice::from_ref(&name))
                .await?
                .into_iter()
                .find(|r| r.name == name);
            let origin = Origin::classify(installed, in_repos, record.is_some());

            let pkg = match record {
                None => Package::leaf(name.clone(), installed, origin),
                Some(record) => {
                    self.construct_aur_node(&name, installed, origin, record, &path)
                        .await?
                }
            };

            // entry() keeps the first finisher canonical if two workers
            // raced on the same name
            let mut nodes = self.nodes.lock().await;
            let canonical = nodes
                .entry(name)
                .or_insert_with(|| Arc::new(pkg))
                .clone();
            Ok(canonical)
        })
    }

    async fn construct_aur_node(
        &self,
        name: &str,
        installed: bool,
        origin: Origin,
        record: AurRecord,
        path: &[String],
    ) -> AurforgeResult<Package> {
        // sources are fetched up front: the review gate needs a PKGBUILD to
        // inspect and upgrades of installed nodes rebuild from them
        let source_dir = Some(self.builder.fetch(&record).await?);

        let mut child_path = path.to_vec();
        child_path.push(name.to_string());

        let mut deps = Vec::new();
        for entry in &record.depends {
            let (dep_name, _) = parse_dependency(entry);
            let child = self
                .resolve_inner(dep_name.clone(), child_path.clone())
                .await?;
            if !child.satisfiable() {
                return Err(AurforgeError::UnsatisfiableDependency {
                    package: name.to_string(),
                    dependency: dep_name,
                });
            }
            deps.push(child);
        }

        // merely-unavailable makedeps stay in the list; the orchestrator
        // routes their owner to the skipped set
        let mut makedeps = Vec::new();
        for entry in &record.make_depends {
            let (dep_name, _) = parse_dependency(entry);
            let child = self.resolve_inner(dep_name, child_path.clone()).await?;
            makedeps.push(child);
        }

        let mut optdeps: Vec<(Arc<Package>, Vec<String>)> = Vec::new();
        for entry in &record.opt_depends {
            let (dep_name, desc) = parse_optdep(entry);
            match self.resolve_inner(dep_name.clone(), child_path.clone()).await {
                Ok(child) => {
                    let descs = desc.into_iter().collect::<Vec<_>>();
                    match optdeps.iter().position(|(node, _)| node.name == child.name) {
                        Some(i) => optdeps[i].1.extend(descs),
                        None => optdeps.push((child, descs)),
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::debug!("ignoring optional dependency {} of {}: {}", dep_name, name, e);
                }
            }
        }

        let sources_present = source_dir.is_some();
        Ok(Package {
            name: name.to_string(),
            installed,
            origin,
            version: Some(record.version.clone()),
            record: Some(record),
            source_dir,
            deps,
            makedeps,
            optdeps,
            review_status: Mutex::new(ReviewStatus::Pending),
            built: OnceLock::new(),
            sources_present: AtomicBool::new(sources_present),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, FakeBuilder, FakeMetadata, FakePacman};
    use std::sync::Arc;

    fn session(metadata: FakeMetadata, pacman: FakePacman, builder: FakeBuilder) -> Session {
        let cfg = Config {
            resolve_jobs: 4,
            ..Config::default()
        };
        Session::new(cfg, Arc::new(metadata), Arc::new(pacman), Arc::new(builder))
    }

    #[tokio::test]
    async fn test_diamond_resolves_to_shared_node() {
        // a -> b, a -> c, b -> d, c -> d
        let metadata = FakeMetadata::with_records(vec![
            record("a", &["b", "c"], &[], &[]),
            record("b", &["d"], &[], &[]),
            record("c", &["d"], &[], &[]),
            record("d", &[], &[], &[]),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, FakePacman::default(), FakeBuilder::new(tmp.path()));

        let a = s.resolve("a").await.unwrap();
        assert_eq!(a.deps().len(), 2);
        let b = &a.deps()[0];
        let c = &a.deps()[1];
        let d_via_b = &b.deps()[0];
        let d_via_c = &c.deps()[0];
        assert!(Arc::ptr_eq(d_via_b, d_via_c), "diamond tip must be one shared node");
    }

    #[tokio::test]
    async fn test_unsatisfiable_dependency_fails_construction() {
        let metadata = FakeMetadata::with_records(vec![record("a", &["ghost"], &[], &[])]);
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, FakePacman::default(), FakeBuilder::new(tmp.path()));

        let err = s.resolve("a").await.unwrap_err();
        match err {
            AurforgeError::UnsatisfiableDependency { package, dependency } => {
                assert_eq!(package, "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("expected UnsatisfiableDependency, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_unsatisfiable_excludes_dependents_transitively() {
        // top -> mid -> ghost: failure of mid propagates into top
        let metadata = FakeMetadata::with_records(vec![
            record("top", &["mid"], &[], &[]),
            record("mid", &["ghost"], &[], &[]),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, FakePacman::default(), FakeBuilder::new(tmp.path()));

        assert!(s.resolve("top").await.is_err());
        let resolved = s.resolve_all(&["top".to_string()]).await.unwrap();
        assert!(resolved.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_detected() {
        let metadata = FakeMetadata::with_records(vec![
            record("a", &["b"], &[], &[]),
            record("b", &["a"], &[], &[]),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, FakePacman::default(), FakeBuilder::new(tmp.path()));

        let err = s.resolve("a").await.unwrap_err();
        match err {
            AurforgeError::CyclicDependency { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected CyclicDependency, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_makedep_cycle_detected() {
        let metadata = FakeMetadata::with_records(vec![
            record("x", &[], &["y"], &[]),
            record("y", &[], &["x"], &[]),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, FakePacman::default(), FakeBuilder::new(tmp.path()));

        assert!(matches!(
            s.resolve("x").await.unwrap_err(),
            AurforgeError::CyclicDependency { .. }
        ));
    }

    #[tokio::test]
    async fn test_unavailable_makedep_kept_for_accounting() {
        let metadata = FakeMetadata::with_records(vec![record("a", &[], &["ghost"], &[])]);
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, FakePacman::default(), FakeBuilder::new(tmp.path()));

        let a = s.resolve("a").await.unwrap();
        assert_eq!(a.makedeps().len(), 1);
        assert!(!a.makedeps()[0].makedep_satisfiable());
    }

    #[tokio::test]
    async fn test_optdep_failure_is_swallowed() {
        // optional dep has an unsatisfiable hard dep of its own
        let metadata = FakeMetadata::with_records(vec![
            record("a", &[], &[], &["extra: shiny bits"]),
            record("extra", &["ghost"], &[], &[]),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, FakePacman::default(), FakeBuilder::new(tmp.path()));

        let a = s.resolve("a").await.unwrap();
        assert!(a.optdeps().is_empty());
    }

    #[tokio::test]
    async fn test_optdep_descriptions_carried() {
        let metadata = FakeMetadata::with_records(vec![
            record("a", &[], &[], &["extra: shiny bits"]),
            record("extra", &[], &[], &[]),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, FakePacman::default(), FakeBuilder::new(tmp.path()));

        let a = s.resolve("a").await.unwrap();
        let optdeps = a.optdeps();
        assert_eq!(optdeps.len(), 1);
        assert_eq!(optdeps[0].0, "extra");
        assert_eq!(optdeps[0].1, vec!["shiny bits".to_string()]);
    }

    #[tokio::test]
    async fn test_classify_partitions() {
        let metadata = FakeMetadata::with_records(vec![record("buildme", &[], &[], &[])]);
        let pacman = FakePacman::default()
            .with_repo_package("zlib")
            .with_installed("local-thing");
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, pacman, FakeBuilder::new(tmp.path()));

        let names: Vec<String> = ["buildme", "zlib", "local-thing", "nowhere"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let classified = s.classify(&names).await.unwrap();
        assert_eq!(classified.aur, vec!["buildme"]);
        assert_eq!(classified.repo_only, vec!["zlib"]);
        assert_eq!(classified.satisfied, vec!["local-thing"]);
        assert_eq!(classified.not_found, vec!["nowhere"]);
    }

    #[tokio::test]
    async fn test_classify_not_found_is_truly_nowhere() {
        let metadata = FakeMetadata::with_records(vec![]);
        let pacman = FakePacman::default();
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, pacman, FakeBuilder::new(tmp.path()));

        let classified = s.classify(&["missing".to_string()]).await.unwrap();
        assert_eq!(classified.not_found, vec!["missing"]);
        assert!(!s.pacman.find_local_satisfier("missing"));
        assert!(!s.pacman.is_in_repos("missing"));
    }

    #[tokio::test]
    async fn test_classify_skips_up_to_date_installed() {
        let metadata = FakeMetadata::with_records(vec![record("tool", &[], &[], &[])]);
        let pacman = FakePacman::default().with_foreign("tool", "1.0-1");
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, pacman, FakeBuilder::new(tmp.path()));

        let classified = s.classify(&["tool".to_string()]).await.unwrap();
        assert_eq!(classified.satisfied, vec!["tool"]);
        assert!(classified.aur.is_empty());
    }

    #[tokio::test]
    async fn test_classify_keeps_outdated_installed() {
        // record() stamps version 1.0-1; an older foreign install must
        // stay a build candidate
        let metadata = FakeMetadata::with_records(vec![record("tool", &[], &[], &[])]);
        let pacman = FakePacman::default().with_foreign("tool", "0.9-1");
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, pacman, FakeBuilder::new(tmp.path()));

        let classified = s.classify(&["tool".to_string()]).await.unwrap();
        assert_eq!(classified.aur, vec!["tool"]);
    }

    #[tokio::test]
    async fn test_resolve_all_preserves_input_order() {
        let metadata = FakeMetadata::with_records(vec![
            record("one", &[], &[], &[]),
            record("two", &[], &[], &[]),
            record("three", &[], &[], &[]),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, FakePacman::default(), FakeBuilder::new(tmp.path()));

        let names: Vec<String> = ["one", "two", "three"].iter().map(|s| s.to_string()).collect();
        let nodes = s.resolve_all(&names).await.unwrap();
        let resolved: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(resolved, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_review_runs_once() {
        use crate::review::ReviewGate;
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingGate(AtomicUsize);
        impl ReviewGate for CountingGate {
            fn review(&self, _pkg: &Package) -> bool {
                self.0.fetch_add(1, Ordering::SeqCst);
                false
            }
        }

        let metadata = FakeMetadata::with_records(vec![record("a", &[], &[], &[])]);
        let tmp = tempfile::tempdir().unwrap();
        let s = session(metadata, FakePacman::default(), FakeBuilder::new(tmp.path()));
        let a = s.resolve("a").await.unwrap();

        let gate = CountingGate(AtomicUsize::new(0));
        assert!(!a.review(&gate));
        assert!(!a.review(&gate));
        assert_eq!(gate.0.load(Ordering::SeqCst), 1);
        assert_eq!(a.review_status(), ReviewStatus::Rejected);
    }

    #[test]
    fn test_origin_classification() {
        assert_eq!(Origin::classify(false, false, false), Origin::Unavailable);
        assert_eq!(Origin::classify(true, false, false), Origin::Installed);
        assert_eq!(Origin::classify(false, true, false), Origin::RepoOnly);
        assert_eq!(Origin::classify(false, false, true), Origin::AurOnly);
        assert_eq!(Origin::classify(true, true, true), Origin::Both);
    }

    #[test]
    fn test_remove_sources_outcomes() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("pkg");
        std::fs::create_dir_all(&dir).unwrap();

        let pkg = Package {
            source_dir: Some(dir.clone()),
            sources_present: AtomicBool::new(true),
            ..Package::leaf("pkg".to_string(), false, Origin::AurOnly)
        };

        assert_eq!(pkg.remove_sources(), RemoveOutcome::Removed);
        assert!(!pkg.sources_present());
        assert_eq!(pkg.remove_sources(), RemoveOutcome::AlreadyAbsent);

        let no_sources = Package::leaf("leaf".to_string(), true, Origin::Installed);
        assert_eq!(no_sources.remove_sources(), RemoveOutcome::AlreadyAbsent);
    }
}
