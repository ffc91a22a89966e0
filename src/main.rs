use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bgpd::config::Config;
use bgpd::session::{ListenerRegistry, Session};

/// A BGP-4 speaker core.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "/etc/bgpd/bgpd.toml")]
    config: PathBuf,

    /// Address to bind the BGP listener to.
    #[arg(long, default_value = "0.0.0.0")]
    bind: Ipv4Addr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let registry = ListenerRegistry::new();
    let session = Session::start(&config, registry.clone());

    bgpd::acceptor::run(args.bind, session.listener_registry().clone()).await?;
    Ok(())
}
