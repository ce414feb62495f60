use revpulse_core::config::AppConfig;

use crate::commands::{open_session, CommandResult, ReportRequest};

const COMMAND: &str = "renewals";

/// Renewal forecast as of the requested date. Period flags are ignored;
/// renewals are always scoped to the configured fiscal quarter.
pub fn run(config: &AppConfig, request: &ReportRequest) -> CommandResult {
    let session = match open_session(COMMAND, config, request) {
        Ok(session) => session,
        Err(failure) => return failure,
    };

    let outcome =
        session.runtime.block_on(session.service.build_renewals(&request.selection, session.as_of));
    match outcome {
        Ok(response) => {
            let message = if response.data.crm_available {
                format!("renewal forecast as of {}", session.as_of)
            } else {
                format!("renewal forecast as of {} (crm unavailable)", session.as_of)
            };
            CommandResult::with_data(COMMAND, message, &response)
        }
        Err(error) => CommandResult::from_application(COMMAND, error),
    }
}
