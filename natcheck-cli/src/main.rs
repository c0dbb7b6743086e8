//! Command-line front end for the probe engine: run a probe against a pair of
//! reflector servers, or run the reflector server itself.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use natcheck::{Endpoint, ServerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "natcheck", version, about = "NAT and firewall behavior characterization")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe one's own NAT and firewall behavior against a pair of reflector servers.
    Probe {
        /// Reflector server hostnames. At least one is required; two is typical, since
        /// detecting multiple public IPs needs at least two distinct server addresses.
        #[arg(long = "server", required = true)]
        servers: Vec<String>,

        /// Ports to probe against every resolved server address.
        #[arg(long = "port")]
        ports: Vec<u16>,

        /// Number of concurrent mapping-phase sockets.
        #[arg(long)]
        sockets: Option<usize>,

        /// Wall-clock duration of the mapping phase, in seconds.
        #[arg(long)]
        mapping_seconds: Option<u64>,

        /// Wall-clock duration of the firewall phase, in seconds.
        #[arg(long)]
        firewall_seconds: Option<u64>,

        /// Output format: "text" or "json". Anything else is a fatal error (§6), not
        /// a `clap` usage error, so it is parsed as a plain string and validated by
        /// the library rather than as a `ValueEnum`.
        #[arg(long, default_value = "text")]
        format: String,

        /// Replace every observed IPv4 address with a consistent, non-identifying one
        /// before printing.
        #[arg(long)]
        anonymize: bool,
    },

    /// Run the reflector server that a `probe` run talks to.
    Serve {
        /// Listener addresses, as `ip:port`. At least two distinct public IPv4
        /// addresses are required.
        #[arg(long = "listen", required = true)]
        listen: Vec<String>,
    },
}

#[derive(Clone, Copy)]
enum Format {
    Text,
    Json,
}

impl Format {
    fn parse(raw: &str) -> Result<Self, natcheck::Error> {
        match raw {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(natcheck::Error::UnknownFormat(other.to_string())),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Probe {
            servers,
            ports,
            sockets,
            mapping_seconds,
            firewall_seconds,
            format,
            anonymize,
        } => run_probe(servers, ports, sockets, mapping_seconds, firewall_seconds, format, anonymize).await,
        Command::Serve { listen } => run_serve(listen).await,
    }
}

async fn run_probe(
    servers: Vec<String>,
    ports: Vec<u16>,
    sockets: Option<usize>,
    mapping_seconds: Option<u64>,
    firewall_seconds: Option<u64>,
    format: String,
    anonymize: bool,
) -> Result<()> {
    let format = Format::parse(&format)?;

    let mut config = natcheck::Config {
        servers,
        ..natcheck::Config::default()
    };
    if !ports.is_empty() {
        config.ports = ports;
    }
    if let Some(n) = sockets {
        config.socket_count = n;
    }
    if let Some(secs) = mapping_seconds {
        config.mapping_phase_duration = Duration::from_secs(secs);
    }
    if let Some(secs) = firewall_seconds {
        config.firewall_phase_duration = Duration::from_secs(secs);
    }

    let snapshot = natcheck::run(&config).await.context("probe run failed")?;
    let snapshot = if anonymize {
        natcheck::anonymize(&snapshot)
    } else {
        snapshot
    };
    let analysis = natcheck::analyze(&snapshot);

    match format {
        Format::Text => println!("{}", natcheck::narrative(&analysis)),
        Format::Json => {
            let output = serde_json::json!({
                "snapshot": snapshot,
                "analysis": analysis,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

async fn run_serve(listen: Vec<String>) -> Result<()> {
    let listeners = listen
        .iter()
        .map(|raw| parse_endpoint(raw))
        .collect::<Result<Vec<_>>>()?;

    tokio::select! {
        result = natcheck::serve(&ServerConfig { listeners }) => result.context("reflector server failed"),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            Ok(())
        }
    }
}

fn parse_endpoint(raw: &str) -> Result<Endpoint> {
    let addr: std::net::SocketAddrV4 = raw
        .parse()
        .with_context(|| format!("{raw:?} is not a valid ip:port listener address"))?;
    Ok(Endpoint::new(*addr.ip(), addr.port()))
}
