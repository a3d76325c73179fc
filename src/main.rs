use std::io::IsTerminal;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use volume_metrics::cli::{CliArgs, CliSources, parse_cli};
use volume_metrics::prompt::{InputPrompt, TerminalPrompt};
use volume_metrics::{AppError, execute, resolve_settings};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let (cli, sources) = parse_cli();
    init_tracing(cli.verbose);

    match run(&cli, &sources).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &CliArgs, sources: &CliSources) -> Result<(), AppError> {
    let interactive = !cli.no_prompt && std::io::stdin().is_terminal();
    let config = if interactive {
        let mut prompt = TerminalPrompt::stdio();
        resolve_settings(cli, sources, Some(&mut prompt as &mut dyn InputPrompt))?
    } else {
        resolve_settings(cli, sources, None)?
    };
    let show_progress = std::io::stderr().is_terminal();
    execute(config, show_progress).await?;
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
