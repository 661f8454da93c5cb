//! Observability infrastructure for Aegis.
//!
//! Structured logging with consistent spans: one span per reconciliation
//! run, one per pipeline stage. Secret-classified values never reach a log
//! line; they are carried in [`crate::secret::Redacted`] wrappers whose
//! `Debug`/`Display` output is the redaction marker.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for CI and automation).
    Json,
    /// Pretty-printed logs (for interactive use).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at startup. Safe to call multiple times; subsequent calls are
/// no-ops. Log levels come from `RUST_LOG` (default `info`).
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates the span for one reconciliation run.
#[must_use]
pub fn run_span(run_id: &str, project: &str, location: &str) -> Span {
    tracing::info_span!(
        "reconcile",
        run_id = run_id,
        project = project,
        location = location,
    )
}

/// Creates a span for one pipeline stage.
#[must_use]
pub fn stage_span(stage: &str, project: &str) -> Span {
    tracing::info_span!("stage", op = stage, project = project)
}
