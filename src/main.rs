use std::process::ExitCode;

use clap::Parser;

use campus_chat::cli::{self, Cli, Commands, ConfigSubcommands};
use campus_chat::config::AppConfig;
use campus_chat::conversation::TurnOutcome;
use campus_chat::logging::{self, LogTarget};
use campus_chat::session::SessionRunner;
use campus_chat::Result;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = logging::init(&LogTarget::from_args(cli.verbose, cli.log_file.clone()));

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("✗ {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let question = match cli.command {
        Some(Commands::Config { command }) => {
            config_command(&command)?;
            return Ok(ExitCode::SUCCESS);
        }
        Some(Commands::Ask { question }) => Some(question),
        None => None,
    };

    let mut config = AppConfig::load();
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }

    let controller = cli::create_session(&config)?;
    let (runner, handle) = SessionRunner::spawn(controller);

    let result = match question {
        None => cli::repl::run(&handle).await.map(|()| ExitCode::SUCCESS),
        Some(question) => cli::ask::run(&handle, &question)
            .await
            .map(|outcome| match outcome {
                Some(TurnOutcome::Failed) => ExitCode::FAILURE,
                _ => ExitCode::SUCCESS,
            }),
    };

    // The runner also stops on its own once every handle is gone.
    let _ = handle.shutdown();
    drop(handle);
    if let Err(e) = runner.await {
        tracing::error!(error = %e, "Session runner panicked");
    }

    result
}

fn config_command(command: &ConfigSubcommands) -> Result<()> {
    match command {
        ConfigSubcommands::Init => {
            let path = AppConfig::init_default()?;
            println!("✓ Created config file at {}", path.display());
        }
        ConfigSubcommands::Where => match AppConfig::get_config_path() {
            Some(path) => println!("{}", path.display()),
            None => eprintln!("✗ Could not determine config path"),
        },
    }
    Ok(())
}
