//! portcullis/src/main.rs
//! Proxy binary: argument parsing, logging setup, graceful shutdown.

use clap::Parser;
use portcullis::{Proxy, ProxyConfig, logging};
use tracing::{error, info};

/// Protocol-aware Minecraft proxy
#[derive(Parser, Debug)]
#[command(name = "portcullis")]
#[command(about = "Routes game connections by handshake and relays frames")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:25565")]
    listen: String,

    /// Address of the upstream game server
    #[arg(short, long, default_value = "127.0.0.1:25566")]
    upstream: String,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init_logging(&args.log);

    let config = ProxyConfig {
        listen_addr: args.listen,
        upstream_addr: args.upstream,
    };

    let proxy = match Proxy::bind(&config).await {
        Ok(proxy) => proxy,
        Err(e) => {
            error!("Failed to start proxy: {}", e);
            std::process::exit(1);
        }
    };

    let controller = proxy.controller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down proxy");
            controller.stop();
        }
    });

    if let Err(e) = proxy.run().await {
        error!("Proxy error: {}", e);
        std::process::exit(1);
    }
}
