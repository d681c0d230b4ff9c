use crate::cli::{Args, Command, Md5Args, OutputFormat};
use crate::logging::setup_logging;
use clap::Parser;
use pg_probe::auth::md5;
use pg_probe::{probe, run_probe, Error, ProbeReport};
use std::io::Write;
use std::process::ExitCode;

mod cli;
mod logging;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    setup_logging(args.log_level);

    if let Some(Command::Md5(md5_args)) = &args.command {
        return hash_password(md5_args);
    }

    let config = match args.connection.resolve() {
        Ok(config) => config,
        Err(e) => {
            emit(&ProbeReport::config_error(e), args.format);
            return ExitCode::SUCCESS;
        }
    };
    tracing::debug!(?config, "resolved configuration");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            emit(&ProbeReport::config_error(Error::Io(e)), args.format);
            return ExitCode::SUCCESS;
        }
    };

    match args.format {
        OutputFormat::Text => {
            let _outcome = runtime.block_on(run_probe(&config));
        }
        OutputFormat::Json => emit(&runtime.block_on(probe(&config)), OutputFormat::Json),
    }

    // Reaching or not reaching the server is reported, not signalled
    ExitCode::SUCCESS
}

fn emit(report: &ProbeReport, format: OutputFormat) {
    let mut stdout = std::io::stdout().lock();
    let written = match format {
        OutputFormat::Text => report.write_text(&mut stdout),
        OutputFormat::Json => report.write_json(&mut stdout),
    };
    if let Err(e) = written.and_then(|_| stdout.flush()) {
        tracing::error!("failed to write report: {}", e);
    }
}

fn hash_password(args: &Md5Args) -> ExitCode {
    let hash = md5::role_password_hash(&args.user, &args.password);
    println!("{}", hash);

    match &args.expected {
        Some(expected) => {
            let matched = md5::matches_stored_hash(&args.user, &args.password, expected);
            println!("match: {}", matched);
            if matched {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        None => ExitCode::SUCCESS,
    }
}
