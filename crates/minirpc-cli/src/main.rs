//! # minirpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Serve the demo Echo service
//! minirpc serve -b 127.0.0.1:8080
//!
//! # Serve with a JSON config file (see ServerConfig)
//! minirpc serve --config server.json
//!
//! # Make one call (outputs raw JSON)
//! minirpc call 127.0.0.1:8080 /Echo/Ping -d '{"n": 1}'
//!
//! # Enveloped call with metadata
//! minirpc call 127.0.0.1:8080 /Echo/Say -d '{"text": "hi"}' --envelope -H token=secret
//! ```
//!
//! Addresses are plain `host:port`; `MINIRPC_TARGET` overrides the address
//! given to `call`.

use anyhow::{Context, Result};
use argh::FromArgs;
use minirpc_cli::call::{self, CallRequest};
use minirpc_cli::echo;
use minirpc_common::Lifecycle;
use minirpc_server::{Server, ServerConfig, ServerOptions};
use std::sync::Arc;

#[derive(FromArgs)]
/// minirpc - minimal RPC framework
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

/// Arguments for serving the demo service.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// serve the demo Echo service until Ctrl-C
struct ServeArgs {
    /// address to bind to (overrides the config file)
    #[argh(option, short = 'b')]
    bind: Option<String>,

    /// path to a JSON server config
    #[argh(option)]
    config: Option<String>,
}

/// Arguments for making a single call.
///
/// The result is printed as raw JSON on stdout; errors go to stderr with a
/// non-zero exit code.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// make one call and print the JSON result
struct CallArgs {
    /// address of the server (host:port)
    #[argh(positional)]
    addr: String,

    /// path of the method, e.g. /Echo/Ping
    #[argh(positional)]
    path: String,

    /// JSON request body
    #[argh(option, short = 'd')]
    data: Option<String>,

    /// metadata as key=value, repeatable
    #[argh(option, short = 'H', long = "header")]
    headers: Vec<String>,

    /// envelope code that counts as success
    #[argh(option, long = "expected-code", default = "0")]
    expected_code: i32,

    /// decode the response through an envelope
    #[argh(switch, long = "envelope")]
    envelope: bool,

    /// call deadline in milliseconds
    #[argh(option, long = "timeout-ms", default = "30000")]
    timeout_ms: u64,
}

fn load_config(args: &ServeArgs) -> Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path))?;
            serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path))?
        }
        None => ServerConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.addr = bind.clone();
    }
    Ok(config)
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = load_config(&args)?;
    tracing::info!("Starting minirpc server on {}", config.addr);

    let mut server = Server::new(config, ServerOptions::default());
    server.register_service(echo::service())?;

    let lifecycle = Arc::new(Lifecycle::new());
    let signals = lifecycle.clone();
    tokio::spawn(async move { signals.wait_for_signal().await });

    server.run(&lifecycle).await?;
    tracing::info!("server stopped");
    Ok(())
}

fn call_request(args: CallArgs) -> Result<CallRequest> {
    let headers = args
        .headers
        .iter()
        .map(|h| call::parse_header(h))
        .collect::<Result<Vec<_>>>()?;
    Ok(CallRequest {
        addr: args.addr,
        path: args.path,
        data: call::parse_data(args.data.as_deref())?,
        headers,
        expected_code: args.expected_code,
        envelope: args.envelope,
        timeout_ms: args.timeout_ms,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call keeps stdout clean for piping
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => {
            let result = call::run(call_request(args)?).await?;
            println!("{}", serde_json::to_string(&result)?);
            Ok(())
        }
    }
}
