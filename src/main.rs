use clap::Parser;
use qworkerd::args::Cli;
use qworkerd::{Config, IdleWorker, ProcessSupervisor};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // clap's default exit code for usage errors is 2; this tool's contract
    // is 0 for help/version and 1 for everything else.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code: u8 = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let config = match Config::resolve(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("qworkerd: {}", e);
            return ExitCode::from(1);
        }
    };

    if let Err(e) = qworkerd::logging::init(&config) {
        eprintln!("qworkerd: cannot set up logging: {}", e);
        return ExitCode::from(1);
    }

    let supervisor = ProcessSupervisor::new(config, Arc::new(IdleWorker::new()));
    match supervisor.dispatch() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("qworkerd: {}", e);
            ExitCode::from(1)
        }
    }
}
