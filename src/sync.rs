//! Sync orchestration.
//!
//! [`SyncEngine::run`] drives one sync pass through these states:
//!
//! ```text
//! Idle → CheckingSync ─┬─▶ UpToDate
//!                      └─▶ BuildingPayload → [DeletingOldVersion] → Importing
//!                          → Training → Publishing → RecordingSuccess
//!                                   (any of these) ─▶ Failed
//! ```
//!
//! The payload is built before the old remote version is deleted, so a
//! construction error leaves the remote model untouched.
//!
//! Failure reporting is split in two:
//! - corpus, fingerprint-read, app-info and payload errors are returned as
//!   [`SyncError`];
//! - import, training, publish and record failures end in
//!   [`SyncOutcome::Failed`] and are logged, not returned as errors. The next
//!   run detects the stale state and retries from the start.
//!
//! The fingerprint is written exactly once, after publish succeeded.

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::corpus_fs::FsCorpusSource;
use crate::entities::BuiltinEntityRegistry;
use crate::fingerprint::{content_hash, fingerprint_key, needs_sync};
use crate::gateway::LuisGateway;
use crate::labels::BracketLabelExtractor;
use crate::lifecycle::{RemoteLifecycle, StepOutcome, VersionLookup};
use crate::models::{Intent, ModelPayload, SyncFingerprint};
use crate::payload::{PayloadBuilder, PayloadError, PayloadTags};
use crate::progress::{ProgressMode, TrainingProgressReporter};
use crate::store::SqliteFingerprintStore;
use crate::training::{train_to_completion, TrainingError, TrainingOptions};
use crate::traits::{CorpusSource, EntityRegistry, FingerprintStore, LabelExtractor, RemoteGateway};

/// States a sync pass moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    CheckingSync,
    UpToDate,
    BuildingPayload,
    DeletingOldVersion,
    Importing,
    Training,
    Publishing,
    RecordingSuccess,
    Failed,
}

/// Errors returned to the caller of [`SyncEngine::run`].
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to load corpus: {0:#}")]
    Corpus(anyhow::Error),

    #[error("failed to read sync fingerprint: {0:#}")]
    FingerprintRead(anyhow::Error),

    #[error("{0:#}")]
    AppInfo(anyhow::Error),

    #[error("failed to build model payload: {0}")]
    Payload(#[from] PayloadError),
}

/// Terminal failures that end a pass in [`SyncOutcome::Failed`].
#[derive(Debug, Error)]
pub enum SyncFailure {
    #[error("{0}")]
    Import(String),

    #[error("{0}")]
    Training(TrainingError),

    #[error("{0}")]
    Publish(String),

    #[error("failed to record sync fingerprint: {0}")]
    Record(String),
}

impl SyncFailure {
    /// State the pass was in when it failed.
    pub fn stage(&self) -> SyncState {
        match self {
            Self::Import(_) => SyncState::Importing,
            Self::Training(_) => SyncState::Training,
            Self::Publish(_) => SyncState::Publishing,
            Self::Record(_) => SyncState::RecordingSuccess,
        }
    }
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// Local corpus and remote version match the stored fingerprint.
    UpToDate,
    /// The model was imported, trained and published.
    Synced { fingerprint: SyncFingerprint },
    Failed(SyncFailure),
}

/// A best-effort step that failed without aborting the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradedStep {
    pub state: SyncState,
    pub reason: String,
}

#[derive(Debug)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub content_hash: String,
    /// States visited, in order.
    pub trail: Vec<SyncState>,
    pub degraded: Vec<DegradedStep>,
    /// Training status polls performed.
    pub polls: u32,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, SyncOutcome::Failed(_))
    }
}

/// Result of the change-detection step.
#[derive(Debug)]
pub struct SyncCheck {
    pub intents: Vec<Intent>,
    pub content_hash: String,
    pub stored: Option<SyncFingerprint>,
    pub remote: VersionLookup,
    pub needs_sync: bool,
}

/// Identifies the remote model being synced.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub app_id: String,
    pub version_id: String,
    pub schema_version: String,
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Resync even when the fingerprint matches.
    pub force: bool,
    /// Publish to the production slot instead of staging.
    pub production: bool,
    pub training: TrainingOptions,
}

/// Collaborators used by a [`SyncEngine`].
pub struct SyncComponents {
    pub corpus: Arc<dyn CorpusSource>,
    pub store: Arc<dyn FingerprintStore>,
    pub extractor: Arc<dyn LabelExtractor>,
    pub registry: Arc<dyn EntityRegistry>,
    pub gateway: Arc<dyn RemoteGateway>,
    pub progress: Arc<dyn TrainingProgressReporter>,
}

pub struct SyncEngine {
    target: SyncTarget,
    options: SyncOptions,
    components: SyncComponents,
    /// Serializes passes on one engine.
    running: tokio::sync::Mutex<()>,
}

/// Accumulates trail and degraded steps while a pass runs.
struct RunLog {
    trail: Vec<SyncState>,
    degraded: Vec<DegradedStep>,
    content_hash: String,
    polls: u32,
}

impl RunLog {
    fn new() -> Self {
        Self {
            trail: vec![SyncState::Idle],
            degraded: Vec::new(),
            content_hash: String::new(),
            polls: 0,
        }
    }

    fn enter(&mut self, state: SyncState) {
        tracing::debug!(?state, "sync state");
        self.trail.push(state);
    }

    fn degrade(&mut self, state: SyncState, reason: String) {
        self.degraded.push(DegradedStep { state, reason });
    }

    fn finish(self, outcome: SyncOutcome) -> SyncReport {
        SyncReport {
            outcome,
            content_hash: self.content_hash,
            trail: self.trail,
            degraded: self.degraded,
            polls: self.polls,
        }
    }

    fn fail(mut self, failure: SyncFailure) -> SyncReport {
        tracing::error!(stage = ?failure.stage(), error = %failure, "sync failed");
        self.enter(SyncState::Failed);
        self.finish(SyncOutcome::Failed(failure))
    }
}

impl SyncEngine {
    pub fn new(target: SyncTarget, options: SyncOptions, components: SyncComponents) -> Self {
        Self {
            target,
            options,
            components,
            running: tokio::sync::Mutex::new(()),
        }
    }

    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    pub fn fingerprint_key(&self) -> String {
        fingerprint_key(&self.target.app_id, &self.target.version_id)
    }

    fn lifecycle(&self) -> RemoteLifecycle<'_> {
        RemoteLifecycle::new(
            self.components.gateway.as_ref(),
            &self.target.app_id,
            &self.target.version_id,
        )
    }

    /// Load the corpus and decide whether a sync is needed. No mutation.
    pub async fn check(&self) -> Result<SyncCheck, SyncError> {
        let intents = self
            .components
            .corpus
            .get_intents()
            .await
            .map_err(SyncError::Corpus)?;
        let content_hash = content_hash(&intents).map_err(SyncError::Corpus)?;

        let remote = self.lifecycle().get_remote_version().await;
        let stored = self
            .components
            .store
            .get(&self.fingerprint_key())
            .await
            .map_err(SyncError::FingerprintRead)?;

        let needs_sync = needs_sync(stored.as_ref(), &content_hash, remote.version());

        Ok(SyncCheck {
            intents,
            content_hash,
            stored,
            remote,
            needs_sync,
        })
    }

    /// Build the payload the next sync would import. No mutation.
    pub async fn build_payload(&self) -> Result<ModelPayload, SyncError> {
        let intents = self
            .components
            .corpus
            .get_intents()
            .await
            .map_err(SyncError::Corpus)?;
        self.build_for(&intents).await
    }

    async fn build_for(&self, intents: &[Intent]) -> Result<ModelPayload, SyncError> {
        let app = self
            .lifecycle()
            .get_app_info()
            .await
            .map_err(SyncError::AppInfo)?;

        let tags = PayloadTags {
            schema_version: self.target.schema_version.clone(),
            version_id: self.target.version_id.clone(),
        };
        let payload = PayloadBuilder::new(
            self.components.extractor.as_ref(),
            self.components.registry.as_ref(),
        )
        .build(intents, &app, &tags)?;
        Ok(payload)
    }

    /// Run one sync pass.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        let _running = self.running.lock().await;
        let mut log = RunLog::new();

        log.enter(SyncState::CheckingSync);
        let check = self.check().await.inspect_err(log_abort)?;
        log.content_hash = check.content_hash.clone();
        if let VersionLookup::Degraded(reason) = &check.remote {
            log.degrade(SyncState::CheckingSync, reason.clone());
        }

        if !check.needs_sync {
            if !self.options.force {
                tracing::info!(
                    app_id = %self.target.app_id,
                    version_id = %self.target.version_id,
                    "remote model is up to date"
                );
                log.enter(SyncState::UpToDate);
                return Ok(log.finish(SyncOutcome::UpToDate));
            }
            tracing::info!("remote model is up to date, resyncing (forced)");
        }

        log.enter(SyncState::BuildingPayload);
        let payload = self
            .build_for(&check.intents)
            .await
            .inspect_err(log_abort)?;
        tracing::info!(
            intents = payload.intents.len(),
            utterances = payload.utterances.len(),
            prebuilt_entities = payload.prebuilt_entities.len(),
            "model payload built"
        );

        let lifecycle = self.lifecycle();
        if check.remote.version().is_some() {
            log.enter(SyncState::DeletingOldVersion);
            if let StepOutcome::Degraded(reason) = lifecycle.delete_version().await {
                log.degrade(SyncState::DeletingOldVersion, reason);
            }
        }

        let gateway = self.components.gateway.as_ref();
        let app_id = self.target.app_id.as_str();
        let version_id = self.target.version_id.as_str();

        log.enter(SyncState::Importing);
        if let Err(e) = gateway.import_version(app_id, version_id, &payload).await {
            return Ok(log.fail(SyncFailure::Import(format!("{:#}", e))));
        }
        tracing::info!(version_id, "model imported");

        log.enter(SyncState::Training);
        match train_to_completion(
            gateway,
            app_id,
            version_id,
            &self.options.training,
            self.components.progress.as_ref(),
            cancel,
        )
        .await
        {
            Ok(polls) => log.polls = polls,
            Err(e) => return Ok(log.fail(SyncFailure::Training(e))),
        }

        log.enter(SyncState::Publishing);
        let staging = !self.options.production;
        if let Err(e) = gateway.publish(app_id, version_id, staging).await {
            return Ok(log.fail(SyncFailure::Publish(format!("{:#}", e))));
        }
        tracing::info!(
            version_id,
            slot = if staging { "staging" } else { "production" },
            "model published"
        );

        log.enter(SyncState::RecordingSuccess);
        let remote = match lifecycle.get_remote_version().await {
            VersionLookup::Found(version) => version,
            VersionLookup::Absent => {
                return Ok(log.fail(SyncFailure::Record(
                    "remote version not found after publish".to_string(),
                )))
            }
            VersionLookup::Degraded(reason) => {
                return Ok(log.fail(SyncFailure::Record(reason)));
            }
        };
        let Some(remote_timestamp) = remote.last_modified else {
            return Ok(log.fail(SyncFailure::Record(
                "remote version reports no last-modified time".to_string(),
            )));
        };
        let fingerprint = SyncFingerprint {
            content_hash: check.content_hash.clone(),
            remote_timestamp,
        };
        if let Err(e) = self
            .components
            .store
            .set(&self.fingerprint_key(), &fingerprint)
            .await
        {
            return Ok(log.fail(SyncFailure::Record(format!("{:#}", e))));
        }

        tracing::info!(
            content_hash = %fingerprint.content_hash,
            remote_timestamp = %fingerprint.remote_timestamp,
            "sync complete"
        );
        Ok(log.finish(SyncOutcome::Synced { fingerprint }))
    }
}

fn log_abort(error: &SyncError) {
    match error {
        SyncError::Payload(e) => tracing::error!(
            entity_type = e.entity_type().unwrap_or("-"),
            error = %e,
            "sync aborted while building payload"
        ),
        other => tracing::error!(error = %other, "sync aborted"),
    }
}

/// Build an engine wired to the built-in collaborators from `config`.
pub async fn engine_from_config(
    config: &Config,
    options: SyncOptions,
    progress: Arc<dyn TrainingProgressReporter>,
) -> Result<SyncEngine> {
    let store = SqliteFingerprintStore::connect(config).await?;
    let gateway = LuisGateway::new(&config.provider)?;

    let target = SyncTarget {
        app_id: config.provider.app_id.clone(),
        version_id: config.provider.version_id.clone(),
        schema_version: config.provider.schema_version.clone(),
    };
    let components = SyncComponents {
        corpus: Arc::new(FsCorpusSource::new(config.corpus.clone())),
        store: Arc::new(store),
        extractor: Arc::new(BracketLabelExtractor::new()),
        registry: Arc::new(BuiltinEntityRegistry::with_overrides(&config.entities)),
        gateway: Arc::new(gateway),
        progress,
    };
    Ok(SyncEngine::new(target, options, components))
}

/// Options derived from `[training]` config.
pub fn options_from_config(config: &Config, force: bool, production: bool) -> SyncOptions {
    SyncOptions {
        force,
        production: production || config.training.production,
        training: TrainingOptions {
            poll_interval: config.training.poll_interval(),
            max_polls: config.training.max_polls,
        },
    }
}

/// Entry point for `isync sync`.
pub async fn run_sync(
    config: &Config,
    force: bool,
    production: bool,
    progress: ProgressMode,
) -> Result<()> {
    let options = options_from_config(config, force, production);
    let reporter: Arc<dyn TrainingProgressReporter> = Arc::from(progress.reporter());
    let engine = engine_from_config(config, options, reporter).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling sync");
            on_signal.cancel();
        }
    });

    let report = engine.run(&cancel).await?;

    let target = engine.target();
    println!("sync {}:{}", target.app_id, target.version_id);
    println!("  content hash: {}", report.content_hash);
    for step in &report.degraded {
        println!("  degraded ({:?}): {}", step.state, step.reason);
    }
    match &report.outcome {
        SyncOutcome::UpToDate => {
            println!("  up to date");
            println!("ok");
            Ok(())
        }
        SyncOutcome::Synced { fingerprint } => {
            println!("  training polls: {}", report.polls);
            println!("  remote timestamp: {}", fingerprint.remote_timestamp);
            println!("ok");
            Ok(())
        }
        SyncOutcome::Failed(failure) => {
            println!("  failed during {:?}: {}", failure.stage(), failure);
            anyhow::bail!("sync failed")
        }
    }
}
