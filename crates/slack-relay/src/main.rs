use std::sync::Arc;

use clap::Parser;
use owo_colors::OwoColorize;
use tokio::runtime::Runtime;

use slack_relay::cli::{Cli, Commands};
use slack_relay::config::Config;
use slack_relay::relay::{relay, Payload};
use slack_relay::server::{build_router, serve};
use slack_relay::sink::SlackWebhook;
use slack_relay::telemetry;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let rt = Runtime::new()?;
    rt.block_on(async {
        match cli.command {
            Commands::Serve { host, port } => {
                let mut config = Config::load(cli.config.clone())?;
                if let Some(host) = host {
                    config.server.host = host;
                }
                if let Some(port) = port {
                    config.server.port = port;
                }

                let sink = SlackWebhook::new(config.upstream.timeout())?;
                let router = build_router(Arc::new(sink), config.server.body_limit);
                serve(config.listen_addr(), router).await?;
            }
            Commands::Send { message, webhook } => {
                let config = Config::load(cli.config.clone())?;
                let sink = SlackWebhook::new(config.upstream.timeout())?;

                let payload = Payload::Structured(serde_json::json!({
                    "message": message,
                    "webhook": webhook,
                }));
                let outcome = relay(&sink, payload).await;

                println!("{}", serde_json::to_string_pretty(&outcome.body)?);
                if outcome.is_success() {
                    eprintln!("{}", outcome.status.green());
                } else {
                    eprintln!("{}", outcome.status.red());
                    std::process::exit(1);
                }
            }
            Commands::Version { json } => {
                if json {
                    let info = serde_json::json!({
                        "version": env!("CARGO_PKG_VERSION"),
                        "commit": option_env!("GIT_SHA").unwrap_or("unknown"),
                        "build_date": option_env!("BUILD_DATE").unwrap_or("unknown"),
                    });
                    println!("{}", serde_json::to_string_pretty(&info)?);
                } else {
                    println!(
                        "slack-relay {} (commit: {}, built: {})",
                        env!("CARGO_PKG_VERSION"),
                        option_env!("GIT_SHA").unwrap_or("unknown"),
                        option_env!("BUILD_DATE").unwrap_or("unknown"),
                    );
                }
            }
        }
        Ok(())
    })
}
