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

//! The build orchestrator: recursive resolve-and-build over a requested
//! name set, with transient make-dependency bookkeeping and source cleanup.

use console::style;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::package::{Package, Session};
use crate::config::KeepSources;
use crate::error::{AurforgeError, AurforgeResult};
use crate::review::ReviewGate;

/// Drives the full pipeline for one invocation. Holds the session (and with
/// it the node cache shared across recursive passes) plus the review gate.
pub struct Orchestrator {
    pub session: Session,
    review: Arc<dyn ReviewGate>,
}

impl Orchestrator {
    pub fn new(session: Session, review: Arc<dyn ReviewGate>) -> Self {
        Self { session, review }
    }

    /// Resolve, review, build, and install a requested name set.
    ///
    /// Make-dependencies only available from the AUR are handled by a
    /// recursive invocation before anything else is installed; the node
    /// cache in the session guarantees no name is resolved twice across
    /// recursion levels.
    pub async fn resolve_and_build(
        &self,
        names: &[String],
        install_as_dep: bool,
    ) -> AurforgeResult<()> {
        self.orchestrate(names.to_vec(), install_as_dep, false).await
    }

    fn orchestrate(
        &self,
        names: Vec<String>,
        install_as_dep: bool,
        prerequisite_pass: bool,
    ) -> BoxFuture<'_, AurforgeResult<()>> {
        Box::pin(async move {
            // classification; repo-only and not-found names are reported,
            // never fatal
            let classified = self.session.classify(&names).await?;
            for name in &classified.repo_only {
                println!(
                    "{} {} is available from the official repositories, install it with pacman",
                    style("::").yellow().bold(),
                    style(name).white().bold()
                );
            }
            for name in &classified.not_found {
                println!(
                    "{} {} was not found in any known source",
                    style("::").red().bold(),
                    style(name).white().bold()
                );
            }
            for name in &classified.satisfied {
                println!(
                    "{} {} is already installed and up to date",
                    style("::").green().bold(),
                    style(name).white().bold()
                );
            }
            if classified.aur.is_empty() {
                tracing::info!("nothing to build");
                return Ok(());
            }

            // concurrent node construction; failures were already logged and
            // dropped inside resolve_all
            let nodes = self.session.resolve_all(&classified.aur).await?;

            // review gate, exactly once per node
            let mut accepted: Vec<Arc<Package>> = Vec::new();
            let mut skipped: Vec<Arc<Package>> = Vec::new();
            for node in nodes {
                if node.review(self.review.as_ref()) {
                    accepted.push(node);
                } else {
                    println!(
                        "{} skipping {} (review rejected)",
                        style("::").yellow().bold(),
                        style(&node.name).white().bold()
                    );
                    skipped.push(node);
                }
            }

            // a package whose build prerequisites cannot be met is never
            // attempted: the owner moves to the skipped set
            let mut buildable = Vec::new();
            for node in accepted {
                let missing = node
                    .makedeps()
                    .iter()
                    .find(|m| !m.makedep_satisfiable())
                    .map(|m| m.name.clone());
                match missing {
                    Some(name) => {
                        tracing::warn!(
                            "skipping {}: make dependency '{}' cannot be satisfied",
                            node.name,
                            name
                        );
                        skipped.push(node);
                    }
                    None => buildable.push(node),
                }
            }
            let accepted = buildable;

            // aggregate uninstalled make-dependencies by origin; repo wins
            // when a name is available from both universes
            let mut md_aur: Vec<String> = Vec::new();
            let mut md_repos: Vec<String> = Vec::new();
            for node in &accepted {
                for md in node.makedeps() {
                    if md.installed {
                        continue;
                    }
                    if md.in_repos() {
                        push_unique(&mut md_repos, &md.name);
                    } else if md.in_aur() {
                        push_unique(&mut md_aur, &md.name);
                    }
                }
            }
            let transient_makedeps: Vec<String> =
                md_aur.iter().chain(md_repos.iter()).cloned().collect();

            // make-dependencies that themselves need building come first
            if !md_aur.is_empty() {
                tracing::info!(
                    "building {} make dependency(ies) from the AUR first",
                    md_aur.len()
                );
                self.orchestrate(md_aur.clone(), true, true).await?;
            }

            // one batch install for everything repo-satisfiable
            let mut repo_batch: Vec<String> = Vec::new();
            for node in &accepted {
                for dep in node.repo_deps() {
                    push_unique(&mut repo_batch, &dep.name);
                }
            }
            for name in &md_repos {
                push_unique(&mut repo_batch, name);
            }
            if !repo_batch.is_empty() {
                if let Err(e) = self.session.pacman.install_repo_packages(&repo_batch, true) {
                    let err = AurforgeError::InstallFailed {
                        phase: "repository dependencies".to_string(),
                        reason: e.to_string(),
                    };
                    tracing::error!("{}", err);
                }
            }

            // builds; a failed build affects only its own node
            for node in &accepted {
                match node.build(&self.session, true) {
                    Ok(()) => self.print_optdep_advisories(node),
                    Err(e) => tracing::error!("{}", e),
                }
            }
            let built_count = accepted
                .iter()
                .filter(|n| !n.built_pkgs().is_empty())
                .count();
            if built_count < accepted.len() {
                println!(
                    "{} built {} of {} package(s)",
                    style("::").yellow().bold(),
                    built_count,
                    accepted.len()
                );
            }

            // artifact collection: own artifacts vs. those pulled in from
            // the dependency closure
            let mut built_pkgs: Vec<PathBuf> = Vec::new();
            for node in &accepted {
                built_pkgs.extend(node.built_pkgs().iter().cloned());
            }
            let mut built_deps: Vec<PathBuf> = Vec::new();
            for node in &accepted {
                for artifact in node.dep_artifacts() {
                    if !built_pkgs.contains(&artifact) && !built_deps.contains(&artifact) {
                        built_deps.push(artifact);
                    }
                }
            }

            // install phase. A prerequisite pass must install regardless of
            // build-only: its output is what the caller's builds run against.
            let mut cleaned = false;
            if !self.session.cfg.build_only || prerequisite_pass {
                if !built_deps.is_empty() {
                    if let Err(e) = self.session.pacman.install_package_files(&built_deps, true) {
                        let err = AurforgeError::InstallFailed {
                            phase: "dependency artifacts".to_string(),
                            reason: e.to_string(),
                        };
                        tracing::error!("{}", err);
                        self.cleanup(&accepted, &skipped);
                        cleaned = true;
                    }
                }
                if !built_pkgs.is_empty() {
                    if let Err(e) = self
                        .session
                        .pacman
                        .install_package_files(&built_pkgs, install_as_dep)
                    {
                        let err = AurforgeError::InstallFailed {
                            phase: "package artifacts".to_string(),
                            reason: e.to_string(),
                        };
                        tracing::error!("{}", err);
                        if !cleaned {
                            self.cleanup(&accepted, &skipped);
                            cleaned = true;
                        }
                    }
                }
            }

            // tear down make-dependencies that exist only for this session
            let removable: Vec<String> = transient_makedeps
                .into_iter()
                .filter(|name| self.session.pacman.find_local_satisfier(name))
                .collect();
            if !removable.is_empty() {
                tracing::info!(
                    "removing {} transient make dependency(ies)",
                    removable.len()
                );
                if let Err(e) = self.session.pacman.remove_packages(&removable) {
                    tracing::warn!("could not remove transient make dependencies: {}", e);
                }
            }

            if !cleaned {
                self.cleanup(&accepted, &skipped);
            }
            Ok(())
        })
    }

    /// Upgrade every foreign package whose AUR candidate is newer
    pub async fn sync_upgrade(&self) -> AurforgeResult<()> {
        let foreign = match self.session.pacman.installed_versions() {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("cannot enumerate foreign packages: {}", e);
                return Ok(());
            }
        };
        if foreign.is_empty() {
            println!("{} no foreign packages installed", style("::").cyan().bold());
            return Ok(());
        }

        let mut names: Vec<String> = foreign.keys().cloned().collect();
        names.sort();

        let records: HashMap<String, _> = self
            .session
            .metadata
            .info(&names)
            .await?
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();

        let mut upgradable = Vec::new();
        for name in &names {
            match records.get(name) {
                None => println!(
                    "{} {} is installed but unknown to the AUR",
                    style("::").yellow().bold(),
                    style(name).white().bold()
                ),
                Some(record) => {
                    if self
                        .session
                        .pacman
                        .compare_versions(&foreign[name], &record.version)
                        == std::cmp::Ordering::Less
                    {
                        println!(
                            "{} {} {} -> {}",
                            style("::").cyan().bold(),
                            style(name).white().bold(),
                            style(&foreign[name]).red(),
                            style(&record.version).green()
                        );
                        upgradable.push(name.clone());
                    }
                }
            }
        }

        if upgradable.is_empty() {
            println!("{} everything is up to date", style("::").green().bold());
            return Ok(());
        }

        self.resolve_and_build(&upgradable, false).await
    }

    /// Apply the retention policy over both result sets
    fn cleanup(&self, accepted: &[Arc<Package>], skipped: &[Arc<Package>]) {
        match self.session.cfg.keep_sources {
            KeepSources::All => {}
            KeepSources::Skipped => {
                for node in accepted {
                    node.remove_sources();
                }
            }
            KeepSources::None => {
                for node in accepted.iter().chain(skipped.iter()) {
                    node.remove_sources();
                }
            }
        }
    }

    fn print_optdep_advisories(&self, node: &Package) {
        let optdeps = node.optdeps();
        if optdeps.is_empty() {
            return;
        }
        println!(
            "   {} optional dependencies for {}:",
            style("->").blue(),
            style(&node.name).cyan()
        );
        for (name, descs) in optdeps {
            if descs.is_empty() {
                println!("      {}", name);
            } else {
                println!("      {}: {}", name, descs.join("; "));
            }
        }
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}
