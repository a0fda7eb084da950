//! Training progress reporting.
//!
//! Reports observable progress while the provider trains a version, so an
//! operator can tell a slow job from a stuck one. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use crate::models::TrainingJobStatus;

/// A single progress event for a training run.
#[derive(Clone, Debug)]
pub enum TrainingProgressEvent {
    /// Training was acknowledged by the provider.
    Queued { version: String },
    /// One poll completed: `finished` of `total` submodels are out of training.
    Polled {
        version: String,
        status: TrainingJobStatus,
        finished: u64,
        total: u64,
    },
}

/// Reports training progress. Implementations write to stderr (human or JSON).
pub trait TrainingProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the training poll loop.
    fn report(&self, event: TrainingProgressEvent);
}

/// Human-friendly progress on stderr: "train 0.1  in progress  62% (5 / 8 models)".
pub struct StderrProgress;

impl TrainingProgressReporter for StderrProgress {
    fn report(&self, event: TrainingProgressEvent) {
        let line = match &event {
            TrainingProgressEvent::Queued { version } => format!("train {}  queued\n", version),
            TrainingProgressEvent::Polled {
                version,
                status,
                finished,
                total,
            } => format!(
                "train {}  {}  ({} / {} models)\n",
                version,
                describe(status),
                finished,
                total
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl TrainingProgressReporter for JsonProgress {
    fn report(&self, event: TrainingProgressEvent) {
        let obj = match &event {
            TrainingProgressEvent::Queued { version } => serde_json::json!({
                "event": "training",
                "version": version,
                "phase": "queued"
            }),
            TrainingProgressEvent::Polled {
                version,
                status,
                finished,
                total,
            } => serde_json::json!({
                "event": "training",
                "version": version,
                "phase": phase_name(status),
                "percent": percent_of(status),
                "finished": finished,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl TrainingProgressReporter for NoProgress {
    fn report(&self, _event: TrainingProgressEvent) {}
}

fn phase_name(status: &TrainingJobStatus) -> &'static str {
    match status {
        TrainingJobStatus::NotStarted => "not_started",
        TrainingJobStatus::Queued => "queued",
        TrainingJobStatus::InProgress { .. } => "in_progress",
        TrainingJobStatus::Succeeded => "succeeded",
        TrainingJobStatus::Failed { .. } => "failed",
    }
}

fn percent_of(status: &TrainingJobStatus) -> u32 {
    match status {
        TrainingJobStatus::InProgress { fraction_complete } => format_percent(*fraction_complete),
        TrainingJobStatus::Succeeded => 100,
        _ => 0,
    }
}

fn describe(status: &TrainingJobStatus) -> String {
    match status {
        TrainingJobStatus::InProgress { fraction_complete } => {
            format!("in progress  {}%", format_percent(*fraction_complete))
        }
        TrainingJobStatus::Failed { reason, model_id } => {
            format!("failed  {}: {}", model_id, reason)
        }
        other => phase_name(other).replace('_', " "),
    }
}

/// Clamp a `[0, 1]` fraction to a whole percentage.
fn format_percent(fraction: f64) -> u32 {
    (fraction.clamp(0.0, 1.0) * 100.0).floor() as u32
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn TrainingProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
