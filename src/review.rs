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

//! The review gate: a yes/no policy applied to each package before it may
//! enter the build set.

use console::style;
use std::io::{self, BufRead, Write};

use crate::aur::package::Package;

/// Per-package build approval. Called exactly once per node per session by
/// [`Package::review`]; rejected packages move to the skipped set.
pub trait ReviewGate: Send + Sync {
    fn review(&self, pkg: &Package) -> bool;
}

/// Accept everything (`--noconfirm`)
pub struct AcceptAll;

impl ReviewGate for AcceptAll {
    fn review(&self, _pkg: &Package) -> bool {
        true
    }
}

/// Show the build recipe and ask for confirmation on stdin
pub struct InteractiveReview;

impl InteractiveReview {
    fn prompt(&self, pkg: &Package) -> io::Result<bool> {
        print!(
            "{} build {} {}? [Y/n] ",
            style("::").cyan().bold(),
            style(&pkg.name).yellow().bold(),
            style(pkg.version.as_deref().unwrap_or("")).green()
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;
        let answer = input.trim().to_lowercase();
        Ok(answer.is_empty() || answer.starts_with('y'))
    }
}

impl ReviewGate for InteractiveReview {
    fn review(&self, pkg: &Package) -> bool {
        let Some(source_dir) = pkg.source_dir() else {
            tracing::warn!("{} has no fetched sources to review, rejecting", pkg.name);
            return false;
        };

        let pkgbuild = source_dir.join("PKGBUILD");
        match std::fs::read_to_string(&pkgbuild) {
            Ok(content) => {
                println!();
                println!(
                    "{} {} {}",
                    style("::").cyan().bold(),
                    style("PKGBUILD of").white(),
                    style(&pkg.name).yellow().bold()
                );
                if let Some(desc) = pkg.record.as_ref().and_then(|r| r.description.as_deref()) {
                    println!("   {}", style(desc).dim());
                }
                println!("{}", style("-".repeat(60)).dim());
                print!("{}", content);
                if !content.ends_with('\n') {
                    println!();
                }
                println!("{}", style("-".repeat(60)).dim());
            }
            Err(e) => {
                tracing::warn!("cannot read {}: {}", pkgbuild.display(), e);
                return false;
            }
        }

        match self.prompt(pkg) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("review prompt failed for {}: {}", pkg.name, e);
                false
            }
        }
    }
}
