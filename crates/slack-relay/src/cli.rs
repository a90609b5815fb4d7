use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// slack-relay – validate messages and forward them to Slack webhooks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Activate verbose output (-v, -vv, etc.)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP relay
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to listen on (overrides config and $PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Relay a single message and print the response
    Send {
        /// Text to deliver
        #[arg(short, long)]
        message: String,

        /// Slack incoming webhook URL
        #[arg(short, long, env = "SLACK_WEBHOOK_URL")]
        webhook: Option<String>,
    },
    /// Print build information
    Version {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
