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

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;

mod aur;
mod cache;
mod config;
mod error;
mod logging;
mod pacman;
mod review;
#[cfg(test)]
mod testing;

use aur::client::MetadataSource;
use aur::{Orchestrator, RpcClient, Session};
use config::{Config, KeepSources, Rebuild};
use pacman::{PackageManager, Pacman};
use review::{AcceptAll, InteractiveReview, ReviewGate};

#[derive(Parser)]
#[command(name = "aurforge")]
#[command(version)]
#[command(about = "Build and install AUR packages with full dependency resolution.")]
struct Cli {
    /// Build and install packages (default when targets are given)
    #[arg(short = 'S', long)]
    install: bool,
    /// Rebuild requested packages even when they are installed
    #[arg(long)]
    rebuild: bool,
    /// Rebuild requested packages and their whole AUR dependency tree
    #[arg(long)]
    rebuild_tree: bool,
    /// Search the AUR
    #[arg(short = 's', long)]
    search: bool,
    /// Show detailed package information
    #[arg(short = 'i', long)]
    info: bool,
    /// Rebuild every foreign package with a newer AUR version
    #[arg(short = 'u', long)]
    sysupgrade: bool,
    /// Sweep cached artifacts, keeping the newest per installed package
    #[arg(long)]
    clean_cache: bool,
    /// Remove all cached artifacts and working directories
    #[arg(long)]
    clean_all: bool,

    /// Install requested packages as dependencies
    #[arg(long)]
    asdeps: bool,
    /// Local storage root (holds cache/, build/ and logs/)
    #[arg(long, value_name = "PATH")]
    root: Option<PathBuf>,
    /// Source retention after a run: none, skipped or all
    #[arg(long, value_name = "MODE")]
    keep_sources: Option<KeepSources>,
    /// Build without installing the results
    #[arg(long)]
    build_only: bool,
    /// Accept every review prompt
    #[arg(long)]
    noconfirm: bool,
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(value_name = "PACKAGES")]
    targets: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Help,
    Install,
    Search,
    Info,
    SyncUpgrade,
    CleanCache,
    CleanAll,
}

impl Cli {
    /// The primary actions are mutually exclusive
    fn action(&self) -> Result<Action> {
        let primaries = [
            ("--install", self.install),
            ("--rebuild", self.rebuild),
            ("--rebuild-tree", self.rebuild_tree),
            ("--search", self.search),
            ("--info", self.info),
            ("--sysupgrade", self.sysupgrade),
            ("--clean-cache", self.clean_cache),
            ("--clean-all", self.clean_all),
        ];
        let chosen: Vec<&str> = primaries
            .iter()
            .filter(|(_, set)| *set)
            .map(|(name, _)| *name)
            .collect();
        if chosen.len() > 1 {
            bail!("conflicting actions: {}", chosen.join(", "));
        }

        let action = match chosen.first().copied() {
            None if self.targets.is_empty() => Action::Help,
            None | Some("--install") | Some("--rebuild") | Some("--rebuild-tree") => {
                Action::Install
            }
            Some("--search") => Action::Search,
            Some("--info") => Action::Info,
            Some("--sysupgrade") => Action::SyncUpgrade,
            Some("--clean-cache") => Action::CleanCache,
            Some("--clean-all") => Action::CleanAll,
            Some(other) => bail!("unhandled action {}", other),
        };

        if matches!(action, Action::Install | Action::Search | Action::Info)
            && self.targets.is_empty()
        {
            bail!("this action needs at least one package name");
        }
        Ok(action)
    }

    fn rebuild_mode(&self) -> Rebuild {
        if self.rebuild_tree {
            Rebuild::Tree
        } else if self.rebuild {
            Rebuild::Package
        } else {
            Rebuild::No
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_with_level(logging::level_for_verbosity(cli.verbose));

    let action = cli.action()?;
    if action == Action::Help {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    }

    let mut cfg = Config::load();
    if let Some(root) = &cli.root {
        cfg.storage_root = root.clone();
    }
    if let Some(mode) = cli.keep_sources {
        cfg.keep_sources = mode;
    }
    cfg.build_only = cli.build_only;
    cfg.install_as_dep = cli.asdeps;
    cfg.noconfirm = cli.noconfirm;
    cfg.rebuild = cli.rebuild_mode();
    cfg.validate().map_err(|e| anyhow!(e))?;

    match action {
        Action::Help => Ok(()),
        Action::Search => {
            let client = RpcClient::new(&cfg)?;
            let term = cli.targets.join(" ");
            let results = client.search(&term).await?;
            render_search(&results);
            Ok(())
        }
        Action::Info => {
            let client = RpcClient::new(&cfg)?;
            let records = client.info(&cli.targets).await?;
            for name in &cli.targets {
                match records.iter().find(|r| &r.name == name) {
                    Some(record) => render_info(record),
                    None => println!(
                        "{} {} was not found in the AUR",
                        style("::").red().bold(),
                        style(name).white().bold()
                    ),
                }
            }
            Ok(())
        }
        Action::CleanCache | Action::CleanAll => {
            let pacman = Pacman::new()?;
            let keep_installed = action == Action::CleanCache;
            let removed = cache::clean_cache(&cfg.cache_dir(), &pacman, keep_installed)?;
            println!(
                "{} removed {} cached artifact(s)",
                style("::").cyan().bold(),
                removed
            );
            if action == Action::CleanAll {
                let cleared = cache::clean_build_tree(&cfg.build_dir())?;
                println!(
                    "{} cleared {} working director(ies)",
                    style("::").cyan().bold(),
                    cleared
                );
            }
            Ok(())
        }
        Action::Install | Action::SyncUpgrade => {
            cfg.ensure_layout()?;

            let pacman: Arc<dyn PackageManager> = Arc::new(Pacman::new()?);
            let metadata: Arc<dyn MetadataSource> = Arc::new(RpcClient::new(&cfg)?);
            let builder = Arc::new(aur::builder::MakepkgBuilder::new(&cfg)?);
            let gate: Arc<dyn ReviewGate> = if cfg.noconfirm {
                Arc::new(AcceptAll)
            } else {
                Arc::new(InteractiveReview)
            };

            let install_as_dep = cfg.install_as_dep;
            let session = Session::new(cfg, metadata, pacman, builder);
            let orchestrator = Orchestrator::new(session, gate);

            if action == Action::SyncUpgrade {
                orchestrator.sync_upgrade().await?;
            } else {
                orchestrator
                    .resolve_and_build(&cli.targets, install_as_dep)
                    .await?;
            }
            Ok(())
        }
    }
}

fn render_search(results: &[aur::AurRecord]) {
    if results.is_empty() {
        println!("{} no matches", style("::").yellow().bold());
        return;
    }

    let mut sorted: Vec<&aur::AurRecord> = results.iter().collect();
    sorted.sort_by(|a, b| {
        b.popularity
            .partial_cmp(&a.popularity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Package").fg(Color::Cyan),
        Cell::new("Version").fg(Color::Cyan),
        Cell::new("Votes").fg(Color::Cyan),
        Cell::new("Pop").fg(Color::Cyan),
        Cell::new("Description").fg(Color::Cyan),
    ]);

    for record in sorted {
        table.add_row(vec![
            Cell::new(&record.name).fg(Color::White),
            Cell::new(&record.version).fg(if record.out_of_date.is_some() {
                Color::Red
            } else {
                Color::Green
            }),
            Cell::new(record.num_votes.to_string()),
            Cell::new(format!("{:.2}", record.popularity)),
            Cell::new(record.description.as_deref().unwrap_or("")),
        ]);
    }

    println!("{}", table);
}

fn render_info(record: &aur::AurRecord) {
    let label = |text: &str| style(format!("{:<16}", text)).cyan().bold();
    let list = |items: &[String]| {
        if items.is_empty() {
            "(none)".to_string()
        } else {
            items.join("  ")
        }
    };

    println!();
    println!("{} {}", label("Name"), style(&record.name).white().bold());
    println!("{} {}", label("Version"), style(&record.version).green());
    if let Some(desc) = &record.description {
        println!("{} {}", label("Description"), desc);
    }
    if let Some(url) = &record.url {
        println!("{} {}", label("URL"), style(url).blue().underlined());
    }
    println!("{} {}", label("Licenses"), list(&record.license));
    println!("{} {}", label("Groups"), list(&record.groups));
    println!("{} {}", label("Provides"), list(&record.provides));
    println!("{} {}", label("Depends On"), list(&record.depends));
    println!("{} {}", label("Make Deps"), list(&record.make_depends));
    println!("{} {}", label("Optional Deps"), list(&record.opt_depends));
    println!("{} {}", label("Conflicts With"), list(&record.conflicts));
    println!("{} {}", label("Replaces"), list(&record.replaces));
    println!(
        "{} {}",
        label("Maintainer"),
        record.maintainer.as_deref().unwrap_or("(orphan)")
    );
    if let Some(date) = chrono::DateTime::from_timestamp(record.first_submitted as i64, 0) {
        println!("{} {}", label("First Submitted"), date.format("%Y-%m-%d"));
    }
    println!("{} {}", label("Votes"), record.num_votes);
    println!("{} {:.2}", label("Popularity"), record.popularity);
    match record.out_of_date {
        Some(ts) => {
            let flagged = chrono::DateTime::from_timestamp(ts as i64, 0)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "yes".to_string());
            println!(
                "{} {}",
                label("Out of Date"),
                style(format!("flagged {}", flagged)).red()
            );
        }
        None => println!("{} no", label("Out of Date")),
    }
}
