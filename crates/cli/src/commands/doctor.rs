use std::path::Path;

use chrono::Utc;
use revpulse_core::config::{AppConfig, LoadOptions};
use revpulse_data::JsonSnapshotSource;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, snapshot: Option<&Path>, json_output: bool) -> String {
    let report = build_report(options, snapshot);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(options: LoadOptions, snapshot: Option<&Path>) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_fiscal_quarter(&config));
            checks.push(check_crm_readiness(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["fiscal_quarter", "crm_readiness"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }
    checks.push(check_snapshot(snapshot));

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_fiscal_quarter(config: &AppConfig) -> DoctorCheck {
    let quarter = config.engine.fiscal_quarter();
    let today = Utc::now().date_naive();
    let details = if today < quarter.start || today > quarter.end {
        format!(
            "quarter {} to {} does not contain today ({today}); pass --as-of when replaying",
            quarter.start, quarter.end
        )
    } else {
        format!(
            "quarter {} to {}, {} days remaining",
            quarter.start,
            quarter.end,
            quarter.days_remaining(today)
        )
    };
    DoctorCheck { name: "fiscal_quarter", status: CheckStatus::Pass, details }
}

fn check_crm_readiness(config: &AppConfig) -> DoctorCheck {
    if !config.crm.enabled {
        return DoctorCheck {
            name: "crm_readiness",
            status: CheckStatus::Skipped,
            details: "crm disabled; renewal metrics will report as unavailable".to_string(),
        };
    }

    DoctorCheck {
        name: "crm_readiness",
        status: CheckStatus::Pass,
        details: format!(
            "crm instance `{}` configured with an access token",
            config.crm.instance_url.as_deref().unwrap_or("<unset>")
        ),
    }
}

fn check_snapshot(snapshot: Option<&Path>) -> DoctorCheck {
    let Some(path) = snapshot else {
        return DoctorCheck {
            name: "snapshot_readable",
            status: CheckStatus::Skipped,
            details: "no --snapshot given".to_string(),
        };
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "snapshot_readable",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    match runtime.block_on(JsonSnapshotSource::load(path)) {
        Ok(source) => {
            let snapshot = source.snapshot();
            let crm = if snapshot.contracts.is_some() { "present" } else { "missing" };
            DoctorCheck {
                name: "snapshot_readable",
                status: CheckStatus::Pass,
                details: format!(
                    "{} period(s), contract export {crm}, loaded from `{}`",
                    snapshot.periods.len(),
                    path.display()
                ),
            }
        }
        Err(error) => DoctorCheck {
            name: "snapshot_readable",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
