use crate::checksum::sha256_on;
use crate::error::{PreloadError, PreloadErrorExt};
use crate::manifest::{ResourceEntry, ResourceManifest};
use futures::StreamExt;
use futures::future::join_all;
use lithium_domain::config::PreloadConfig;
use lithium_domain::constants::topics;
use lithium_domain::events::{PreloadProgress, PreloadStage};
use lithium_kernel::sandbox;
use lithium_message_bus::MessageBus;
use lithium_runtime::ThreadPool;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// State of a resource on disk compared to its manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResourceStatus {
    Ok,
    Missing,
    Mismatch { expected: String, actual: String },
}

impl ResourceStatus {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedResource {
    pub path: String,
    pub error: String,
}

/// Outcome of [`Preloader::preload`], paths in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadReport {
    pub total: usize,
    /// Already present with the right checksum.
    pub verified: Vec<String>,
    pub downloaded: Vec<String>,
    pub failed: Vec<FailedResource>,
}

impl PreloadReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Outcome {
    Verified,
    Downloaded,
    Failed(String),
}

/// Downloads manifest resources into a root directory and keeps them verified.
#[derive(Debug)]
pub struct Preloader {
    root: PathBuf,
    pool: Arc<ThreadPool>,
    bus: Option<MessageBus>,
    client: reqwest::Client,
    concurrency: usize,
    retries: u32,
    backoff: Duration,
    tmp_counter: AtomicU64,
}

#[derive(Debug)]
pub struct PreloaderBuilder {
    root: PathBuf,
    pool: Arc<ThreadPool>,
    bus: Option<MessageBus>,
    concurrency: usize,
    retries: u32,
    backoff: Duration,
    timeout: Duration,
    user_agent: String,
}

impl PreloaderBuilder {
    #[must_use]
    pub fn bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Simultaneous downloads; at least one.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Extra attempts after the first failed download.
    #[must_use]
    pub const fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Delay before the first retry; doubles on each further one.
    #[must_use]
    pub const fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whole-request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// # Errors
    /// [`PreloadError::Http`] if the HTTP client cannot be initialized.
    pub fn build(self) -> Result<Preloader, PreloadError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .build()
            .context("Building HTTP client")?;

        Ok(Preloader {
            root: self.root,
            pool: self.pool,
            bus: self.bus,
            client,
            concurrency: self.concurrency,
            retries: self.retries,
            backoff: self.backoff,
            tmp_counter: AtomicU64::new(0),
        })
    }
}

impl Preloader {
    #[must_use]
    pub fn builder(root: impl Into<PathBuf>, pool: Arc<ThreadPool>) -> PreloaderBuilder {
        PreloaderBuilder {
            root: root.into(),
            pool,
            bus: None,
            concurrency: 4,
            retries: 3,
            backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
            user_agent: concat!("lithium-preload/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }

    /// Builder preset from the `[preload]` config section.
    #[must_use]
    pub fn from_config(config: &PreloadConfig, pool: Arc<ThreadPool>) -> PreloaderBuilder {
        Self::builder(&config.root, pool)
            .concurrency(config.concurrency)
            .retries(config.retries)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// # Errors
    /// [`PreloadError::PathTraversal`] when `entry.path` escapes the root.
    pub fn resolve(&self, entry: &ResourceEntry) -> Result<PathBuf, PreloadError> {
        Ok(sandbox::resolve(&self.root, &entry.path)?)
    }

    /// Checks a single entry against the file on disk.
    ///
    /// # Errors
    /// [`PreloadError::PathTraversal`], or a hashing failure other than a missing file.
    pub async fn check(&self, entry: &ResourceEntry) -> Result<ResourceStatus, PreloadError> {
        let path = self.resolve(entry)?;
        Ok(match sha256_on(&self.pool, path).await? {
            None => ResourceStatus::Missing,
            Some(actual) if actual == entry.sha256 => ResourceStatus::Ok,
            Some(actual) => ResourceStatus::Mismatch { expected: entry.sha256.clone(), actual },
        })
    }

    /// Status of every entry, in manifest order.
    ///
    /// # Errors
    /// See [`check`](Self::check).
    pub async fn verify(
        &self,
        manifest: &ResourceManifest,
    ) -> Result<Vec<(ResourceEntry, ResourceStatus)>, PreloadError> {
        let mut out = Vec::with_capacity(manifest.len());
        for entry in &manifest.resources {
            out.push((entry.clone(), self.check(entry).await?));
        }
        Ok(out)
    }

    /// Brings every entry to [`ResourceStatus::Ok`], downloading what is missing or
    /// stale.
    ///
    /// Per-resource failures end up in [`PreloadReport::failed`]; the call itself only
    /// fails when some path escapes the root, before anything is downloaded.
    ///
    /// # Errors
    /// [`PreloadError::PathTraversal`].
    pub async fn preload(&self, manifest: &ResourceManifest) -> Result<PreloadReport, PreloadError> {
        let targets = manifest
            .resources
            .iter()
            .map(|entry| self.resolve(entry).map(|path| (entry, path)))
            .collect::<Result<Vec<_>, _>>()?;

        let total = targets.len();
        let permits = Semaphore::new(self.concurrency);
        let runs = targets.iter().enumerate().map(|(i, (entry, path))| {
            let permits = &permits;
            async move {
                let Ok(_permit) = permits.acquire().await else {
                    return Outcome::Failed("preload cancelled".to_owned());
                };
                self.bring_up(entry, path, i + 1, total).await
            }
        });
        let outcomes = join_all(runs).await;

        let mut report = PreloadReport { total, ..PreloadReport::default() };
        for ((entry, _), outcome) in targets.iter().zip(outcomes) {
            match outcome {
                Outcome::Verified => report.verified.push(entry.path.clone()),
                Outcome::Downloaded => report.downloaded.push(entry.path.clone()),
                Outcome::Failed(error) => {
                    report.failed.push(FailedResource { path: entry.path.clone(), error });
                },
            }
        }

        info!(
            total,
            verified = report.verified.len(),
            downloaded = report.downloaded.len(),
            failed = report.failed.len(),
            "Preload finished"
        );
        Ok(report)
    }

    async fn bring_up(&self, entry: &ResourceEntry, path: &Path, index: usize, total: usize) -> Outcome {
        let progress = |stage, message: Option<String>| {
            self.progress(PreloadProgress { path: entry.path.clone(), stage, index, total, message });
        };

        match sha256_on(&self.pool, path.to_path_buf()).await {
            Ok(Some(actual)) if actual == entry.sha256 => {
                progress(PreloadStage::Verified, None);
                return Outcome::Verified;
            },
            Ok(Some(_)) => debug!(path = %entry.path, "Checksum differs, downloading again"),
            Ok(None) => {},
            Err(e) => warn!(path = %entry.path, error = %e, "Could not hash existing file"),
        }

        let mut attempt = 0;
        loop {
            progress(PreloadStage::Downloading, None);
            match self.download(entry, path).await {
                Ok(()) => {
                    progress(PreloadStage::Completed, None);
                    return Outcome::Downloaded;
                },
                Err(e) if attempt < self.retries => {
                    let delay = self.backoff.saturating_mul(2_u32.saturating_pow(attempt));
                    attempt += 1;
                    warn!(path = %entry.path, attempt, error = %e, "Download failed, retrying");
                    progress(PreloadStage::Retrying, Some(e.to_string()));
                    tokio::time::sleep(delay).await;
                },
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "Download failed");
                    progress(PreloadStage::Failed, Some(e.to_string()));
                    return Outcome::Failed(e.to_string());
                },
            }
        }
    }

    /// One attempt: stream into a temp file beside the target, verify, rename.
    async fn download(&self, entry: &ResourceEntry, target: &Path) -> Result<(), PreloadError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.context(format!("Creating {}", parent.display()))?;
        }
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let name = target.file_name().and_then(|s| s.to_str()).unwrap_or("resource");
        let temp = target.with_file_name(format!(".{name}.part.{n}"));

        let result = self.fetch_into(entry, &temp).await;
        if let Err(e) = result {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }

        fs::rename(&temp, target)
            .await
            .context(format!("Moving {} into place", target.display()))?;
        debug!(path = %entry.path, "Resource downloaded");
        Ok(())
    }

    async fn fetch_into(&self, entry: &ResourceEntry, temp: &Path) -> Result<(), PreloadError> {
        let response = self
            .client
            .get(&entry.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(format!("GET {}", entry.url))?;

        let mut file = fs::File::create(temp).await.context(format!("Creating {}", temp.display()))?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context(format!("Reading {}", entry.url))?;
            written += chunk.len() as u64;
            file.write_all(&chunk).await.context("Writing resource")?;
        }
        file.sync_all().await.context("Syncing resource")?;
        drop(file);

        if let Some(expected) = entry.size.filter(|size| *size != written) {
            return Err(PreloadError::Checksum {
                message: format!("expected {expected} bytes, got {written}").into(),
                context: Some(entry.path.clone().into()),
            });
        }

        let actual = sha256_on(&self.pool, temp.to_path_buf()).await?.unwrap_or_default();
        if actual != entry.sha256 {
            return Err(PreloadError::Checksum {
                message: format!("expected {}, got {actual}", entry.sha256).into(),
                context: Some(entry.path.clone().into()),
            });
        }
        Ok(())
    }

    fn progress(&self, event: PreloadProgress) {
        if let Some(bus) = &self.bus
            && let Err(e) = bus.publish_json(topics::PRELOAD_PROGRESS, event)
        {
            warn!(error = %e, "Preload progress notification failed");
        }
    }
}
