mod cli;
mod engine;
mod hotkey;
mod presenter;
mod provider;
mod resolver;
#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Command, RequestArgs};
use engine::EngineError;
use presenter::DesktopPresenter;
use provider::{CommandProvider, Provider};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { shortcut, request } => {
            let (provider, presenter) = backend(&request, "run", false);
            if let Err(e) = engine::run(request.engine_config(), &shortcut, provider, presenter).await {
                fail("run", &e);
            }
        }
        Command::Once { request } => {
            let (provider, presenter) = backend(&request, "once", true);
            match engine::once(request.engine_config(), provider, presenter).await {
                Ok(engine::Finished::Replaced | engine::Finished::Empty) => {}
                // Already reported to the user.
                Ok(engine::Finished::Suppressed | engine::Finished::Failed) => std::process::exit(2),
                Err(EngineError::EmptySelection) => std::process::exit(2),
                Err(e) => fail("once", &e),
            }
        }
        Command::Capture { settle_ms } => {
            match engine::capture(Duration::from_millis(settle_ms)).await {
                Ok(text) => println!("{text}"),
                Err(e) => fail("capture", &e),
            }
        }
    }
}

fn backend(
    request: &RequestArgs,
    cmd: &str,
    status_line: bool,
) -> (Arc<dyn Provider>, Arc<DesktopPresenter>) {
    let Some(provider) = CommandProvider::new(request.provider.clone()) else {
        eprintln!("rewrited {cmd}: missing backend command");
        std::process::exit(1);
    };
    (
        Arc::new(provider),
        Arc::new(DesktopPresenter::new(!request.no_notify, status_line)),
    )
}

fn fail(cmd: &str, e: &EngineError) -> ! {
    tracing::error!(error = %e, "{cmd} failed");
    eprintln!("rewrited {cmd}: {e}");
    std::process::exit(1);
}
