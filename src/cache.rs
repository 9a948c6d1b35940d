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

//! Cache and build-directory maintenance sweeps.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::pacman::PackageManager;

const ARTIFACT_SUFFIXES: &[&str] = &[".pkg.tar.zst", ".pkg.tar.xz", ".pkg.tar.gz", ".pkg.tar"];

/// Split an artifact filename (`name-ver-rel-arch.pkg.tar*`) into package
/// name and `ver-rel`
pub fn parse_artifact_name(filename: &str) -> Option<(String, String)> {
    let stem = ARTIFACT_SUFFIXES
        .iter()
        .find_map(|suffix| filename.strip_suffix(suffix))?;

    // the last three dash-separated fields are version, release, arch
    let mut parts: Vec<&str> = stem.rsplitn(4, '-').collect();
    if parts.len() != 4 {
        return None;
    }
    parts.reverse();
    let name = parts[0];
    let version = format!("{}-{}", parts[1], parts[2]);
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), version))
}

/// Sweep the artifact cache.
///
/// With `keep_installed`, each installed package keeps only its
/// lexicographically newest cached file and uninstalled packages lose all of
/// theirs; without it every cached artifact goes. Returns the number of
/// removed files; individual failures are logged and skipped.
pub fn clean_cache(
    cache_dir: &Path,
    pacman: &dyn PackageManager,
    keep_installed: bool,
) -> Result<usize> {
    if !cache_dir.exists() {
        return Ok(0);
    }

    let mut by_name: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in fs::read_dir(cache_dir)
        .with_context(|| format!("cannot read cache dir {}", cache_dir.display()))?
    {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let Some((name, _version)) = parse_artifact_name(&filename) else {
            tracing::debug!("ignoring non-artifact cache entry {}", filename);
            continue;
        };
        by_name.entry(name).or_default().push(filename);
    }

    let mut removed = 0;
    for (name, mut files) in by_name {
        files.sort();
        let keep_newest = keep_installed && pacman.find_local_satisfier(&name);
        let doomed: &[String] = if keep_newest {
            &files[..files.len() - 1]
        } else {
            &files[..]
        };
        for filename in doomed {
            let path = cache_dir.join(filename);
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!("removed cached artifact {}", filename);
                    removed += 1;
                }
                Err(e) => tracing::warn!("could not remove {}: {}", path.display(), e),
            }
        }
    }

    Ok(removed)
}

/// Recursively clear the per-package working directories
pub fn clean_build_tree(build_dir: &Path) -> Result<usize> {
    if !build_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(build_dir)
        .with_context(|| format!("cannot read build dir {}", build_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("could not remove {}: {}", path.display(), e),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePacman;

    #[test]
    fn test_parse_artifact_name() {
        let (name, version) = parse_artifact_name("widget-2.1-1-x86_64.pkg.tar.zst").unwrap();
        assert_eq!(name, "widget");
        assert_eq!(version, "2.1-1");

        let (name, version) = parse_artifact_name("my-long-name-1.0-2-any.pkg.tar").unwrap();
        assert_eq!(name, "my-long-name");
        assert_eq!(version, "1.0-2");

        assert!(parse_artifact_name("notanartifact.txt").is_none());
        assert!(parse_artifact_name("short-1.0.pkg.tar").is_none());
    }

    #[test]
    fn test_clean_cache_keeps_newest_of_installed() {
        let tmp = tempfile::tempdir().unwrap();
        for version in ["1.0-1", "1.1-1", "1.2-1"] {
            std::fs::write(
                tmp.path().join(format!("tool-{}-x86_64.pkg.tar", version)),
                b"x",
            )
            .unwrap();
        }

        let pacman = FakePacman::default().with_installed("tool");
        let removed = clean_cache(tmp.path(), &pacman, true).unwrap();
        assert_eq!(removed, 2);

        let left: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(left, vec!["tool-1.2-1-x86_64.pkg.tar"]);

        // a second sweep is a no-op
        assert_eq!(clean_cache(tmp.path(), &pacman, true).unwrap(), 0);
    }

    #[test]
    fn test_clean_cache_removes_all_when_uninstalled() {
        let tmp = tempfile::tempdir().unwrap();
        for version in ["1.0-1", "1.1-1"] {
            std::fs::write(
                tmp.path().join(format!("gone-{}-any.pkg.tar.zst", version)),
                b"x",
            )
            .unwrap();
        }

        let pacman = FakePacman::default();
        let removed = clean_cache(tmp.path(), &pacman, true).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_clean_cache_removes_everything_without_keep() {
        let tmp = tempfile::tempdir().unwrap();
        for version in ["1.0-1", "1.1-1", "1.2-1"] {
            std::fs::write(
                tmp.path().join(format!("tool-{}-x86_64.pkg.tar", version)),
                b"x",
            )
            .unwrap();
        }

        let pacman = FakePacman::default().with_installed("tool");
        let removed = clean_cache(tmp.path(), &pacman, false).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_clean_build_tree() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("pkg-a/src")).unwrap();
        std::fs::create_dir_all(tmp.path().join("pkg-b")).unwrap();
        std::fs::write(tmp.path().join("stray.tar.gz"), b"x").unwrap();

        let removed = clean_build_tree(tmp.path()).unwrap();
        assert_eq!(removed, 3);
        assert!(tmp.path().exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_clean_missing_dirs_are_noops() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        let pacman = FakePacman::default();
        assert_eq!(clean_cache(&missing, &pacman, true).unwrap(), 0);
        assert_eq!(clean_build_tree(&missing).unwrap(), 0);
    }
}
