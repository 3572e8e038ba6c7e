use clap::Parser;
use graph_relay::config::RelayConfig;
use graph_relay::services::logger::init_tracing;

/// MCP server exposing the signed-in user's Microsoft Graph profile.
#[derive(Debug, Parser)]
#[command(name = "graph-relay", version)]
struct Args {
    /// Address to bind. Defaults to all interfaces.
    #[arg(long)]
    host: Option<String>,

    /// Listen port. Overrides FUNCTIONS_CUSTOMHANDLER_PORT.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing();

    let mut config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("graph-relay: {}", err);
            std::process::exit(1);
        }
    };
    if let Some(host) = args.host {
        config.bind_host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    if let Err(err) = graph_relay::mcp::server::run_http(config).await {
        eprintln!("Error while running MCP server: {}", err);
        std::process::exit(1);
    }
}
