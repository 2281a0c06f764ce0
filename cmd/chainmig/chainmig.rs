mod cli;
mod initializers;

use std::time::Instant;

use clap::Parser;

use crate::{
    cli::{CLI, ReportedFailure, emit_error_report},
    initializers::init_tracing,
};

#[tokio::main]
async fn main() {
    let started_at = Instant::now();
    let CLI { log_level, command } = CLI::parse();
    init_tracing(log_level);

    if let Err(error) = command.run(started_at).await {
        if error.downcast_ref::<ReportedFailure>().is_none() {
            emit_error_report(
                command.name(),
                command.json_output(),
                started_at,
                &error,
                command.report_file(),
            );
        }
        std::process::exit(1);
    }
}
