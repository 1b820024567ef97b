use clap::Parser;
use mcp_runner::McpRunner;
use mcp_runner::cli::{Cli, Command};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = mcp_runner::logging::init(cli.log_format, cli.verbose) {
        eprintln!("Failed to initialize logging: {e:#}");
    }

    let code = match cli.command {
        Command::Run(args) => run(args).await,
    };
    std::process::exit(code);
}

async fn run(args: mcp_runner::cli::RunArgs) -> i32 {
    let config = match args.runner_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Invalid configuration");
            return 1;
        }
    };
    info!(platform = mcp_runner::platform_name(), name = %config.name, "Starting MCP runner");

    let mut runner = match McpRunner::new(config).connect().await {
        Ok(runner) => runner,
        Err(e) => {
            error!(
                error = %e,
                permanent = e.is_permanent(),
                hint = mcp_runner::startup_failure_hint(&e),
                "Failed to start server"
            );
            return 1;
        }
    };

    let signals = runner.listen_for_signals();
    let reason = runner.run(tokio::io::stdin()).await;
    signals.abort();
    reason.code()
}
