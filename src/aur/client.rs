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

//! AUR RPC API client with caching and rate limiting.

use async_trait::async_trait;
use lru::LruCache;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::RpcResponse;
use crate::config::Config;
use crate::error::{AurforgeError, AurforgeResult};

/// One AUR package record as returned by the RPC info endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AurRecord {
    pub name: String,
    pub package_base: String,
    pub version: String,
    pub description: Option<String>,
    #[serde(rename = "URL")]
    pub url: Option<String>,
    pub maintainer: Option<String>,
    pub first_submitted: u64,
    pub num_votes: u32,
    pub popularity: f64,
    pub out_of_date: Option<u64>,

    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub make_depends: Vec<String>,
    #[serde(default)]
    pub opt_depends: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub replaces: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub license: Vec<String>,
}

impl AurRecord {
    /// Snapshot tarball URL for this record's package base
    pub fn snapshot_url(&self) -> String {
        format!(
            "https://aur.archlinux.org/cgit/aur.git/snapshot/{}.tar.gz",
            self.package_base
        )
    }
}

/// Read access to the source-repository metadata service.
///
/// A trait seam so the graph resolver can run against an in-memory fake.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch full records for a set of names; names without a record are
    /// simply absent from the result.
    async fn info(&self, names: &[String]) -> AurforgeResult<Vec<AurRecord>>;

    /// Keyword search
    async fn search(&self, term: &str) -> AurforgeResult<Vec<AurRecord>>;
}

/// AUR RPC client with an LRU metadata cache and request rate limiting
pub struct RpcClient {
    client: reqwest::Client,
    cache: Arc<RwLock<LruCache<String, CacheEntry>>>,
    base_url: String,
    retries: u32,
    last_request: Arc<RwLock<Instant>>,
    min_request_interval: Duration,
}

#[derive(Clone)]
struct CacheEntry {
    record: AurRecord,
    cached_at: Instant,
}

const CACHE_TTL: Duration = Duration::from_secs(300);
const CACHE_SIZE: usize = 512;

// AUR RPC accepts up to 250 names per info request
const BATCH_SIZE: usize = 250;

impl RpcClient {
    pub fn new(cfg: &Config) -> AurforgeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .user_agent(concat!("aurforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AurforgeError::MetadataConnection {
                url: cfg.rpc_url.clone(),
                message: format!("failed to construct HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            cache: Arc::new(RwLock::new(LruCache::new(
                NonZeroUsize::new(CACHE_SIZE).ok_or_else(|| AurforgeError::MetadataService {
                    message: "zero cache size".to_string(),
                })?,
            ))),
            base_url: cfg.rpc_url.clone(),
            retries: cfg.request_retries,
            last_request: Arc::new(RwLock::new(Instant::now())),
            min_request_interval: Duration::from_millis(100),
        })
    }

    /// Keep a minimum interval between requests so a deep resolution pass
    /// does not hammer the RPC endpoint
    async fn rate_limit(&self) {
        let mut last = self.last_request.write().await;
        let elapsed = last.elapsed();
        if elapsed < self.min_request_interval {
            tokio::time::sleep(self.min_request_interval - elapsed).await;
        }
        *last = Instant::now();
    }

    /// One GET with retry; timeouts and connection errors are retried, an
    /// answered-but-broken response is not.
    async fn request(&self, url: &str) -> AurforgeResult<RpcResponse> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.rate_limit().await;

            let result = self.client.get(url).send().await;
            match result {
                Ok(response) => {
                    return response.json::<RpcResponse>().await.map_err(|e| {
                        AurforgeError::MetadataService {
                            message: format!("malformed RPC response: {}", e),
                        }
                    });
                }
                Err(e) if attempt >= self.retries => {
                    tracing::debug!("metadata request failed terminally: {}", e);
                    if e.is_timeout() {
                        return Err(AurforgeError::MetadataTimeout {
                            url: url.to_string(),
                        });
                    }
                    return Err(AurforgeError::MetadataRetriesExhausted {
                        url: url.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_timeout() => {
                    tracing::debug!("metadata request timed out (attempt {}): {}", attempt, e);
                }
                Err(e) if e.is_connect() => {
                    tracing::debug!("metadata connection failed (attempt {}): {}", attempt, e);
                }
                Err(e) => {
                    // Not a transport problem; retrying will not help
                    return Err(AurforgeError::MetadataConnection {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn check_rpc_error(response: &RpcResponse) -> AurforgeResult<()> {
        if let Some(error) = &response.error {
            return Err(AurforgeError::MetadataService {
                message: error.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataSource for RpcClient {
    async fn info(&self, names: &[String]) -> AurforgeResult<Vec<AurRecord>> {
        if names.is_empty() {
            return Ok(vec![]);
        }

        let mut records = Vec::new();
        let mut to_fetch = Vec::new();

        {
            let cache = self.cache.read().await;
            for name in names {
                match cache.peek(name) {
                    Some(entry) if entry.cached_at.elapsed() < CACHE_TTL => {
                        records.push(entry.record.clone());
                    }
                    _ => to_fetch.push(name.clone()),
                }
            }
        }

        for chunk in to_fetch.chunks(BATCH_SIZE) {
            let args: Vec<String> = chunk
                .iter()
                .map(|n| format!("arg[]={}", urlencoding::encode(n)))
                .collect();
            let url = format!("{}?v=5&type=info&{}", self.base_url, args.join("&"));

            let response = self.request(&url).await?;
            Self::check_rpc_error(&response)?;

            {
                let mut cache = self.cache.write().await;
                for record in &response.results {
                    cache.put(
                        record.name.clone(),
                        CacheEntry {
                            record: record.clone(),
                            cached_at: Instant::now(),
                        },
                    );
                }
            }

            records.extend(response.results);
        }

        Ok(records)
    }

    async fn search(&self, term: &str) -> AurforgeResult<Vec<AurRecord>> {
        let url = format!(
            "{}?v=5&type=search&arg={}",
            self.base_url,
            urlencoding::encode(term)
        );

        let response = self.request(&url).await?;
        Self::check_rpc_error(&response)?;

        tracing::debug!("search '{}' returned {} result(s)", term, response.resultcount);
        Ok(response.results)
    }
}

/// Split a dependency string into its bare name and an optional version
/// constraint (`name>=1.2` style)
pub fn parse_dependency(dep: &str) -> (String, Option<String>) {
    let dep = dep.trim();

    for op in &[">=", "<=", "=", ">", "<"] {
        if let Some(pos) = dep.find(op) {
            let name = dep[..pos].to_string();
            let constraint = dep[pos..].to_string();
            return (name, Some(constraint));
        }
    }

    (dep.to_string(), None)
}

/// Split an optional-dependency entry (`name: free-text reason`) into name
/// and description
pub fn parse_optdep(entry: &str) -> (String, Option<String>) {
    match entry.split_once(':') {
        Some((name, desc)) => {
            let (name, _) = parse_dependency(name);
            let desc = desc.trim();
            if desc.is_empty() {
                (name, None)
            } else {
                (name, Some(desc.to_string()))
            }
        }
        None => (parse_dependency(entry).0, None),
    }
}
