//! # peerdrop
//!
//! Command-line peer for peerdrop: send files to, or receive files from,
//! another peer (browser or CLI) through a rendezvous relay and a WebRTC
//! data channel.

mod config;
mod output;
mod receive;
mod send;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use peerdrop_session::FlowControl;
use tracing_subscriber::EnvFilter;

use crate::config::ClientConfig;

#[derive(Parser, Debug)]
#[command(name = "peerdrop", version)]
#[command(about = "Peer-to-peer file drop over WebRTC")]
struct Cli {
    /// Relay base URL (overrides PEERDROP_RELAY_URL)
    #[arg(long, global = true, value_name = "URL")]
    relay: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Offer files and print the room id to share
    Send {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
        #[arg(long, value_enum, default_value_t = FlowArg::Ack)]
        flow: FlowArg,
    },
    /// Join a room and save the files it delivers
    Receive {
        #[arg(value_name = "ROOM_OR_LINK")]
        room: String,
        #[arg(long, short, default_value = ".", value_name = "DIR")]
        output_dir: PathBuf,
        /// Stop after this many files instead of waiting for the sender to
        /// hang up
        #[arg(long, value_name = "N")]
        expect: Option<usize>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FlowArg {
    /// Wait for receiver ACKs, bounded window
    Ack,
    /// Fixed delay between chunks
    Paced,
}

impl From<FlowArg> for FlowControl {
    fn from(arg: FlowArg) -> Self {
        match arg {
            FlowArg::Ack => FlowControl::default(),
            FlowArg::Paced => FlowControl::paced(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the room id and saved paths.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,peerdrop=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(relay) = cli.relay {
        config.relay_url = relay;
    }

    match cli.command {
        Command::Send { files, flow } => send::run(&config, &files, flow.into()).await,
        Command::Receive {
            room,
            output_dir,
            expect,
        } => receive::run(&config, &room, &output_dir, expect).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from(["peerdrop", "send", "a.txt", "b.txt", "--flow", "paced"]).unwrap();
        match cli.command {
            Command::Send { files, flow } => {
                assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
                assert_eq!(flow, FlowArg::Paced);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_send_requires_a_file() {
        assert!(Cli::try_parse_from(["peerdrop", "send"]).is_err());
    }

    #[test]
    fn test_parse_receive() {
        let cli = Cli::try_parse_from([
            "peerdrop",
            "--relay",
            "http://relay.local",
            "receive",
            "https://drop.example/receive/1234567890",
            "--expect",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.relay.as_deref(), Some("http://relay.local"));
        match cli.command {
            Command::Receive {
                room,
                output_dir,
                expect,
            } => {
                assert_eq!(room, "https://drop.example/receive/1234567890");
                assert_eq!(output_dir, PathBuf::from("."));
                assert_eq!(expect, Some(2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_flow_mapping() {
        assert_eq!(FlowControl::from(FlowArg::Ack), FlowControl::default());
        assert_eq!(FlowControl::from(FlowArg::Paced), FlowControl::paced());
    }
}
