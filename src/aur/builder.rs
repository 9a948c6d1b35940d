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

//! Source fetching and makepkg builds.

use anyhow::Context;
use async_trait::async_trait;
use console::style;
use flate2::read::GzDecoder;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use super::client::AurRecord;
use crate::config::Config;
use crate::error::{AurforgeError, AurforgeResult};

/// The build-toolchain collaborator: fetches a package's sources and turns
/// them into installable artifacts.
#[async_trait]
pub trait SourceBuilder: Send + Sync {
    /// Download and unpack the snapshot; returns the working directory
    async fn fetch(&self, record: &AurRecord) -> AurforgeResult<PathBuf>;

    /// Run the toolchain in `source_dir`; returns the produced artifact files
    fn build(&self, source_dir: &Path, name: &str) -> AurforgeResult<Vec<PathBuf>>;
}

/// Real builder driving makepkg, with artifacts routed into the cache
/// directory and build output teed into the log directory
pub struct MakepkgBuilder {
    build_dir: PathBuf,
    cache_dir: PathBuf,
    log_dir: PathBuf,
    client: reqwest::Client,
}

impl MakepkgBuilder {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        which::which("makepkg").context("makepkg not found in PATH")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("aurforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to construct HTTP client")?;

        Ok(Self {
            build_dir: cfg.build_dir(),
            cache_dir: cfg.cache_dir(),
            log_dir: cfg.log_dir(),
            client,
        })
    }

    async fn download(&self, record: &AurRecord) -> AurforgeResult<Vec<u8>> {
        let url = record.snapshot_url();
        let fetch_err = |reason: String| AurforgeError::FetchFailed {
            package: record.name.clone(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fetch_err(format!("download of {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(fetch_err(format!("HTTP {} for {}", response.status(), url)));
        }

        let total_size = response.content_length().unwrap_or(0);
        let pb = if total_size > 0 {
            let pb = ProgressBar::new(total_size);
            if let Ok(tpl) = ProgressStyle::default_bar()
                .template("   {spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
            {
                pb.set_style(tpl.progress_chars("=>-"));
            }
            Some(pb)
        } else {
            None
        };

        let mut data = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| fetch_err(format!("download interrupted: {}", e)))?;
            data.extend_from_slice(&chunk);
            if let Some(pb) = &pb {
                pb.set_position(data.len() as u64);
            }
        }
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        Ok(data)
    }

    /// Expected artifact paths for the working directory, honoring PKGDEST
    fn packagelist(&self, source_dir: &Path, name: &str) -> AurforgeResult<Vec<PathBuf>> {
        let output = Command::new("makepkg")
            .arg("--packagelist")
            .env("PKGDEST", &self.cache_dir)
            .current_dir(source_dir)
            .stderr(Stdio::null())
            .output()
            .map_err(|e| AurforgeError::BuildFailed {
                package: name.to_string(),
                reason: format!("failed to run makepkg --packagelist: {}", e),
                exit_code: None,
            })?;

        Ok(parse_packagelist(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[async_trait]
impl SourceBuilder for MakepkgBuilder {
    async fn fetch(&self, record: &AurRecord) -> AurforgeResult<PathBuf> {
        let extract_dir = self.build_dir.join(&record.package_base);

        fs::create_dir_all(&self.build_dir).map_err(|e| {
            AurforgeError::filesystem(self.build_dir.display().to_string(), "create build dir", e)
        })?;

        // stale working directories from earlier runs are replaced
        if extract_dir.exists() {
            fs::remove_dir_all(&extract_dir).map_err(|e| {
                AurforgeError::filesystem(
                    extract_dir.display().to_string(),
                    "clean old working dir",
                    e,
                )
            })?;
        }

        println!(
            "   {} fetching {} snapshot...",
            style("->").blue(),
            style(&record.package_base).cyan()
        );

        let data = self.download(record).await?;

        let mut archive = tar::Archive::new(GzDecoder::new(data.as_slice()));
        archive.unpack(&self.build_dir).map_err(|e| {
            AurforgeError::FetchFailed {
                package: record.name.clone(),
                reason: format!("snapshot extraction failed: {}", e),
            }
        })?;

        if !extract_dir.exists() {
            return Err(AurforgeError::FetchFailed {
                package: record.name.clone(),
                reason: format!(
                    "snapshot did not contain a {} directory",
                    record.package_base
                ),
            });
        }

        tracing::debug!("sources of {} ready at {}", record.name, extract_dir.display());
        Ok(extract_dir)
    }

    fn build(&self, source_dir: &Path, name: &str) -> AurforgeResult<Vec<PathBuf>> {
        let build_err = |reason: String, code: Option<i32>| AurforgeError::BuildFailed {
            package: name.to_string(),
            reason,
            exit_code: code,
        };

        fs::create_dir_all(&self.log_dir)
            .and_then(|_| fs::create_dir_all(&self.cache_dir))
            .map_err(|e| build_err(format!("storage layout unavailable: {}", e), None))?;

        let log_path = self.log_dir.join(format!("{}-build.log", name));
        let log_file = fs::File::create(&log_path)
            .map_err(|e| build_err(format!("cannot open {}: {}", log_path.display(), e), None))?;
        let log_stderr = log_file
            .try_clone()
            .map_err(|e| build_err(format!("cannot tee build log: {}", e), None))?;

        println!(
            "   {} running makepkg for {} (log: {})",
            style("->").blue(),
            style(name).cyan(),
            log_path.display()
        );

        let status = Command::new("makepkg")
            .args(["-cs", "--noconfirm"])
            .env("PKGDEST", &self.cache_dir)
            .current_dir(source_dir)
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_stderr))
            .status()
            .map_err(|e| build_err(format!("failed to run makepkg: {}", e), None))?;

        if !status.success() {
            return Err(build_err(
                format!("makepkg exited with code {:?}", status.code()),
                status.code(),
            ));
        }

        let artifacts: Vec<PathBuf> = self
            .packagelist(source_dir, name)?
            .into_iter()
            .filter(|p| p.exists())
            .collect();

        if artifacts.is_empty() {
            return Err(build_err("no artifacts were produced".to_string(), None));
        }

        Ok(artifacts)
    }
}

/// Parse `makepkg --packagelist` output into artifact paths
fn parse_packagelist(text: &str) -> Vec<PathBuf> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect()
}
