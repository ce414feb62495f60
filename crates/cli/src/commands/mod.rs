pub mod compare;
pub mod config;
pub mod doctor;
pub mod renewals;
pub mod report;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use revpulse_core::config::AppConfig;
use revpulse_core::domain::dimension::ReportSelection;
use revpulse_core::domain::period::ReportPeriod;
use revpulse_core::errors::{ApplicationError, DomainError, InterfaceError};
use revpulse_data::{JsonSnapshotSource, ReportService};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_INPUT: u8 = 3;
pub const EXIT_BAD_REQUEST: u8 = 4;
pub const EXIT_UNAVAILABLE: u8 = 5;
pub const EXIT_INTERNAL: u8 = 6;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            correlation_id: None,
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    /// A success payload carrying a serialized report under `data`.
    pub fn with_data<T: Serialize>(command: &str, message: impl Into<String>, data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => {
                let payload = CommandOutcome {
                    command: command.to_string(),
                    status: "ok".to_string(),
                    error_class: None,
                    message: message.into(),
                    correlation_id: None,
                    data: Some(data),
                };
                Self { exit_code: 0, output: serialize_payload(payload) }
            }
            Err(error) => Self::failure(command, "serialization", error.to_string(), EXIT_INTERNAL),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            correlation_id: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_application(command: &str, error: ApplicationError) -> Self {
        let interface = error.into_interface(Uuid::new_v4().to_string());
        Self::from_interface(command, &interface)
    }

    pub fn from_interface(command: &str, error: &InterfaceError) -> Self {
        let (error_class, exit_code) = match error {
            InterfaceError::BadRequest { .. } => ("bad_request", EXIT_BAD_REQUEST),
            InterfaceError::ServiceUnavailable { .. } => ("service_unavailable", EXIT_UNAVAILABLE),
            InterfaceError::Internal { .. } => ("internal", EXIT_INTERNAL),
        };
        tracing::warn!(
            event_name = "cli.command.failed",
            correlation_id = error.correlation_id(),
            command,
            error_class,
            error = %error,
            "command failed"
        );
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: format!("{} ({error})", error.user_message()),
            correlation_id: Some(error.correlation_id().to_string()),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Everything a report command needs besides the config.
#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    pub snapshot: PathBuf,
    pub selection: ReportSelection,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub as_of: Option<NaiveDate>,
}

pub(crate) struct Session {
    pub runtime: tokio::runtime::Runtime,
    pub service: ReportService<JsonSnapshotSource, JsonSnapshotSource>,
    pub source: Arc<JsonSnapshotSource>,
    pub as_of: NaiveDate,
}

impl Session {
    pub fn open(config: &AppConfig, request: &ReportRequest) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to initialize async runtime")?;
        let source = runtime
            .block_on(JsonSnapshotSource::load(&request.snapshot))
            .with_context(|| format!("failed to load snapshot `{}`", request.snapshot.display()))?;
        let source = Arc::new(source);

        let as_of = request
            .as_of
            .or(source.snapshot().as_of)
            .unwrap_or_else(|| chrono::Utc::now().date_naive());
        let service = ReportService::from_config(Arc::clone(&source), Arc::clone(&source), config);

        tracing::debug!(
            event_name = "cli.session.opened",
            snapshot = %source.path().display(),
            as_of = %as_of,
            "snapshot loaded"
        );

        Ok(Self { runtime, service, source, as_of })
    }

    /// Explicit dates win, then the latest captured period, then
    /// quarter-to-date.
    pub fn period(
        &self,
        config: &AppConfig,
        request: &ReportRequest,
    ) -> Result<ReportPeriod, ApplicationError> {
        match (request.start, request.end) {
            (Some(start), Some(end)) => Ok(ReportPeriod::new(start, end)),
            (None, None) => Ok(self.source.snapshot().latest_period().unwrap_or_else(|| {
                ReportPeriod::new(config.engine.fiscal_quarter_start, self.as_of)
            })),
            _ => Err(DomainError::InvalidInput(
                "--start and --end must be given together".to_string(),
            )
            .into()),
        }
    }
}

pub(crate) fn open_session(
    command: &str,
    config: &AppConfig,
    request: &ReportRequest,
) -> Result<Session, CommandResult> {
    Session::open(config, request).map_err(|error| {
        CommandResult::failure(command, "snapshot_load", format!("{error:#}"), EXIT_INPUT)
    })
}
