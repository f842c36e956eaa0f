use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use f007th_send::cli::Args;
use f007th_send::logging;

fn usage() {
    let mut command = Args::command();
    eprintln!("{}", command.render_help());
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    if std::env::args_os().len() <= 1 {
        usage();
        return ExitCode::FAILURE;
    }

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => {
                    usage();
                    ExitCode::FAILURE
                }
            };
        }
    };

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {e}");
            usage();
            return ExitCode::FAILURE;
        }
    };

    // Held until main returns so the log file is flushed.
    let _guard = match logging::init(config.verbosity, &config.log_file) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return ExitCode::FAILURE;
        }
    };

    f007th_send::run(&config).await;
    ExitCode::SUCCESS
}
