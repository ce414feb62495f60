use std::process::ExitCode;

fn main() -> ExitCode {
    revpulse_cli::run()
}
