//! The launch state machine.
//!
//! Each attempt runs `FetchConfig → AcquireArchive → Instantiate`. A failed
//! attempt is classified by [`LaunchError::category`] and either retried
//! from `FetchConfig` after a countdown or ends the run.

mod countdown;
mod policy;

pub use countdown::{countdown, NoPause, Pause, ThreadSleep};
pub use policy::{RetryDecision, RetryPolicy};

use crate::archive::{ArchiveBundle, ArchiveReader};
use crate::cache::{CacheRace, CacheStore};
use crate::config::LauncherConfig;
use crate::decoder::{decode, Encoding};
use crate::error::{FailureCategory, LaunchError};
use crate::fetch::{ArchiveSource, HttpArchiveSource};
use crate::loader::{DynamicLoader, ProgramInstance};
use crate::progress::ProgressSink;
use crate::remote_config::{ConfigSource, HttpConfigSource, RemoteConfig};
use crate::trust::{CertificateChainVerifier, TrustStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    FetchConfig,
    AcquireArchive,
    Instantiate,
    Done,
    Retry,
    Fatal,
}

/// Where the launched archive came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Network,
}

/// Coordinator bookkeeping across attempts.
#[derive(Debug, Clone)]
pub struct LoadAttempt {
    pub phase: Phase,
    /// Trust and load failures so far; shared retry budget.
    pub failures: u32,
    pub by_category: HashMap<FailureCategory, u32>,
    pub attempts: u32,
    pub started: Instant,
}

impl LoadAttempt {
    fn new() -> Self {
        Self {
            phase: Phase::FetchConfig,
            failures: 0,
            by_category: HashMap::new(),
            attempts: 0,
            started: Instant::now(),
        }
    }

    pub fn failures_of(&self, category: FailureCategory) -> u32 {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn record(&mut self, category: FailureCategory) {
        *self.by_category.entry(category).or_insert(0) += 1;
        if RetryPolicy::uses_budget(category) {
            self.failures += 1;
        }
    }
}

/// A running program and how it was obtained.
#[derive(Debug)]
pub struct Launched {
    pub program: ProgramInstance,
    pub origin: Origin,
    pub version: i32,
    pub attempt: LoadAttempt,
}

pub struct LoadCoordinator {
    config_source: Box<dyn ConfigSource>,
    archive_source: Box<dyn ArchiveSource>,
    verifier: Arc<dyn CertificateChainVerifier>,
    cache: Option<CacheStore>,
    policy: RetryPolicy,
    sink: Arc<dyn ProgressSink>,
    pause: Box<dyn Pause>,
}

impl LoadCoordinator {
    pub fn new(
        config_source: Box<dyn ConfigSource>,
        archive_source: Box<dyn ArchiveSource>,
        verifier: Arc<dyn CertificateChainVerifier>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config_source,
            archive_source,
            verifier,
            cache: None,
            policy: RetryPolicy::default(),
            sink,
            pause: Box::new(ThreadSleep),
        }
    }

    /// Wires HTTP sources, the default trust store and the cache from `cfg`.
    pub fn from_config(cfg: &LauncherConfig, sink: Arc<dyn ProgressSink>) -> anyhow::Result<Self> {
        let mut config_source = HttpConfigSource::new(cfg.config_url.clone());
        if let Some(template) = &cfg.endpoint_url_template {
            config_source = config_source.with_endpoint(template, cfg.endpoint);
        }
        let trust = TrustStore::with_default_sources(
            cfg.publisher.clone(),
            Some(cfg.certificate_dir()?),
            cfg.include_platform_anchors,
        );
        let cache = if cfg.cache_archive {
            Some(CacheStore::new(cfg.cache_dir()?))
        } else {
            None
        };
        Ok(Self::new(
            Box::new(config_source),
            Box::new(HttpArchiveSource::default()),
            Arc::new(trust),
            sink,
        )
        .with_cache(cache)
        .with_policy(RetryPolicy::from(&cfg.retry())))
    }

    pub fn with_cache(mut self, cache: Option<CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_pause(mut self, pause: Box<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    /// Runs attempts until one launches or the policy gives up.
    pub fn run(self) -> Result<Launched, LaunchError> {
        let mut state = LoadAttempt::new();
        let mut race = self.start_race();

        let result = loop {
            state.attempts += 1;
            tracing::info!(attempt = state.attempts, "load attempt");
            match self.attempt(&mut state, &mut race) {
                Ok((program, origin, version)) => {
                    state.phase = Phase::Done;
                    tracing::info!(
                        ?origin,
                        version,
                        attempts = state.attempts,
                        elapsed_ms = state.elapsed().as_millis() as u64,
                        "application launched"
                    );
                    break Ok(Launched {
                        program,
                        origin,
                        version,
                        attempt: state,
                    });
                }
                Err(e) => {
                    let category = e.category();
                    let failed_in = state.phase;
                    state.record(category);
                    match self.policy.decide(category, state.failures) {
                        RetryDecision::RetryAfter { wait, message } => {
                            state.phase = Phase::Retry;
                            tracing::warn!(
                                phase = ?failed_in,
                                ?category,
                                failures = state.failures,
                                wait_secs = wait.as_secs(),
                                error = %e,
                                "attempt failed, retrying"
                            );
                            countdown(&*self.sink, &*self.pause, message, wait);
                        }
                        RetryDecision::Fatal => {
                            state.phase = Phase::Fatal;
                            tracing::error!(
                                phase = ?failed_in,
                                ?category,
                                attempts = state.attempts,
                                error = %e,
                                "giving up"
                            );
                            break Err(e);
                        }
                    }
                }
            }
        };

        if let Some(race) = race.take() {
            race.cancel();
        }
        result
    }

    fn start_race(&self) -> Option<CacheRace> {
        let cache = self.cache.as_ref()?;
        match cache.spawn_race() {
            Ok(race) => Some(race),
            Err(e) => {
                tracing::warn!(error = %e, "unable to start cache read");
                None
            }
        }
    }

    fn attempt(
        &self,
        state: &mut LoadAttempt,
        race: &mut Option<CacheRace>,
    ) -> Result<(ProgramInstance, Origin, i32), LaunchError> {
        state.phase = Phase::FetchConfig;
        self.sink.progress(0, "Loading config");
        let config = self.config_source.fetch()?;
        let version = config.version()?;

        state.phase = Phase::AcquireArchive;
        self.sink.progress(0, "Loading application");
        let (mut bundle, origin) = match race.take().and_then(|r| r.resolve(version)) {
            Some(bundle) => (bundle, Origin::Cache),
            None => (self.fetch_archive(&config)?, Origin::Network),
        };

        state.phase = Phase::Instantiate;
        self.sink.progress(100, "Launching application");
        let raw = bundle.raw.take();
        let loader = Arc::new(DynamicLoader::new(bundle));
        let program = loader.create_instance(&config.entry_point())?;

        if origin == Origin::Network {
            self.write_back(version, raw);
        }
        Ok((program, origin, version))
    }

    fn fetch_archive(&self, config: &RemoteConfig) -> Result<ArchiveBundle, LaunchError> {
        let url = config.archive_url()?;
        let fetched = self.archive_source.fetch(url.as_str())?;
        let encoding = Encoding::from_header(fetched.content_encoding.as_deref())?;
        tracing::debug!(
            %url,
            %encoding,
            content_length = ?fetched.content_length,
            "decoding archive"
        );
        let stream = decode(
            fetched.body,
            fetched.content_length,
            encoding,
            Some(Arc::clone(&self.sink)),
        )
        .map_err(|e| LaunchError::io("start archive decoder", e))?;

        ArchiveReader::new()
            .verify_with(&*self.verifier)
            .capture_raw(self.cache.is_some())
            .read(stream)
    }

    fn write_back(&self, version: i32, raw: Option<Vec<u8>>) {
        let (Some(cache), Some(raw)) = (&self.cache, raw) else {
            return;
        };
        if let Err(e) = cache.write(version, &raw) {
            tracing::warn!(error = %e, "unable to update archive cache");
        }
    }
}
