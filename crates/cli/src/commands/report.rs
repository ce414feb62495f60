use revpulse_core::config::AppConfig;

use crate::commands::{open_session, CommandResult, ReportRequest};

const COMMAND: &str = "report";

pub fn run(config: &AppConfig, request: &ReportRequest) -> CommandResult {
    let session = match open_session(COMMAND, config, request) {
        Ok(session) => session,
        Err(failure) => return failure,
    };
    let period = match session.period(config, request) {
        Ok(period) => period,
        Err(error) => return CommandResult::from_application(COMMAND, error),
    };

    let outcome = session.runtime.block_on(session.service.build_report(
        period,
        &request.selection,
        session.as_of,
    ));
    match outcome {
        Ok(response) => CommandResult::with_data(
            COMMAND,
            format!("bookings report for {} to {}", period.start, period.end),
            &response,
        ),
        Err(error) => CommandResult::from_application(COMMAND, error),
    }
}
