//! Demo binary: serve a directory over HTTP(S) with the library's file
//! handler and an allow-all authenticator.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use yahat::auth::AllowAll;
use yahat::{FileHandler, HttpConfig, HttpServer};

#[derive(Parser)]
#[command(name = "yahat-serve")]
#[command(version = HttpServer::version())]
#[command(about = "Serve a directory with the yahat embedded HTTP server", long_about = None)]
struct Cli {
    /// Directory to serve
    #[arg(long, default_value = ".")]
    root: String,

    /// Endpoint to listen on, e.g. [::] for all interfaces
    #[arg(long, default_value = "127.0.0.1")]
    http_endpoint: String,

    /// Port to listen on; defaults to 80/443 by scheme
    #[arg(long, default_value = "")]
    http_port: String,

    /// TLS key for the embedded HTTP server
    #[arg(long, default_value = "")]
    http_tls_key: String,

    /// TLS cert for the embedded HTTP server
    #[arg(long, default_value = "")]
    http_tls_cert: String,

    /// Threads for the embedded HTTP server
    #[arg(long, default_value_t = 6)]
    http_num_threads: usize,

    /// Log level: one of error, warn, info, debug, trace
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level)?)
        .init();

    let config = HttpConfig {
        num_http_threads: cli.http_num_threads,
        http_endpoint: cli.http_endpoint,
        http_port: cli.http_port,
        http_tls_key: cli.http_tls_key,
        http_tls_cert: cli.http_tls_cert,
        ..HttpConfig::default()
    };

    let mut server = HttpServer::new(config, Arc::new(AllowAll))?;
    server.add_route("/", Arc::new(FileHandler::new(cli.root)))?;
    server.run()?;
    Ok(())
}
