// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::error;

use withings_mcp::config::Config;
use withings_mcp::manager::{RefreshOutcome, RefreshRequest};
use withings_mcp::state::AppState;
use withings_mcp::transport::http_token::outcome_body;

#[derive(Debug, Parser)]
#[command(name = "withings-mcp", version, about = "Withings OAuth token manager and MCP server")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Refresh the access token once and exit.
    Refresh {
        /// Use this refresh token instead of the configured one.
        #[arg(long = "use-refresh-token")]
        use_refresh_token: Option<String>,
        /// Do not publish the new tokens to Railway.
        #[arg(long)]
        no_publish: bool,
        /// Trigger a Railway redeploy after publishing.
        #[arg(long)]
        trigger_deploy: bool,
        /// Print the new token state as `KEY=value` lines (unmasked).
        #[arg(long)]
        output_env: bool,
    },
    /// Print a consent URL.
    AuthUrl {
        #[arg(long)]
        state: Option<String>,
    },
    /// Exchange an authorization code for tokens.
    Exchange {
        #[arg(long)]
        code: String,
        #[arg(long)]
        no_publish: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = cli.config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&cli.config);

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => withings_mcp::run(cli.config).await.map(|()| 0),
        command => run_once(cli.config, command).await,
    };
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).json().with_writer(std::io::stderr).init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

/// One-shot subcommands. Returns the process exit code.
async fn run_once(config: Config, command: Command) -> anyhow::Result<i32> {
    let state = AppState::new(config, CancellationToken::new())?;
    let manager = &state.manager;

    match command {
        Command::Serve => Ok(0),
        Command::AuthUrl { state: wanted } => {
            let auth = manager.begin_authorization(wanted).await?;
            println!("{}", auth.url);
            eprintln!("state: {}", auth.state);
            Ok(0)
        }
        Command::Refresh { use_refresh_token, no_publish, trigger_deploy, output_env } => {
            let outcome = manager
                .refresh(RefreshRequest {
                    refresh_token: use_refresh_token,
                    persist: !no_publish,
                    redeploy: trigger_deploy,
                })
                .await;
            outcome.log("cli");
            report(&outcome, output_env)
        }
        Command::Exchange { code, no_publish } => {
            let outcome = manager.exchange_code(&code, !no_publish).await;
            outcome.log("cli");
            report(&outcome, false)
        }
    }
}

fn report(outcome: &RefreshOutcome, output_env: bool) -> anyhow::Result<i32> {
    match (&outcome.token, output_env) {
        (Some(token), true) => {
            for (key, value) in token.to_variables() {
                println!("{key}={value}");
            }
        }
        _ => println!("{}", serde_json::to_string_pretty(&outcome_body(outcome))?),
    }
    Ok(if outcome.refresh.is_success() { 0 } else { 1 })
}
