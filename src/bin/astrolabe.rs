//! astrolabe — command-line front end for the gateway.
//!
//! Lists registered endpoints, runs one-off fetches, and serves the
//! security boundary as JSON lines over stdin/stdout.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::info;

use astrolabe::{
    Bridge, Config, FetchOptions, Gateway, GatewayBuilder, GatewayError, ParamType, ParamValue,
    Params,
};

/// Astrolabe space-data gateway
#[derive(Parser)]
#[command(name = "astrolabe")]
#[command(version = astrolabe::PKG_VERSION)]
#[command(about = "Capability-restricted gateway for public space-data APIs")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "ASTROLABE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered endpoints
    Endpoints,

    /// Fetch one endpoint and print the JSON response
    Fetch {
        /// Endpoint id (see `astrolabe endpoints`)
        endpoint: String,
        /// Parameter as key=value (repeatable)
        #[arg(short = 'p', long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
        /// Skip the fresh-cache lookup
        #[arg(long)]
        no_cache: bool,
        /// Single attempt, no backoff and no stale fallback
        #[arg(long)]
        no_retry: bool,
    },

    /// Serve JSON-lines calls on stdin, one response line per call on stdout
    Bridge {
        /// Calls processed concurrently
        #[arg(long, default_value_t = 16)]
        concurrency: usize,

        /// Longest accepted call line, in bytes
        #[arg(long, default_value_t = astrolabe::bridge::DEFAULT_MAX_LINE_BYTES)]
        max_line_bytes: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn; override with RUST_LOG). Logs go to
    // stderr so stdout stays clean for responses.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load_or_default(args.config.as_deref())?;
    let gateway = GatewayBuilder::from_config(&config)?.build()?;

    match args.command {
        Command::Endpoints => {
            for endpoint in gateway.registry().list() {
                println!(
                    "{:<14} {:<4} {:>5}/min  ttl {:>8}s  window {:>3}  {}",
                    endpoint.id,
                    endpoint.method.as_str(),
                    endpoint.rate_limit,
                    endpoint.ttl.as_secs(),
                    gateway.limiter().in_window(&endpoint.id),
                    endpoint.url,
                );
                for (name, spec) in &endpoint.params {
                    let required = if spec.required { "required" } else { "optional" };
                    println!("    {name}: {} ({required})", spec.kind.as_str());
                }
            }
        }

        Command::Fetch {
            endpoint,
            params,
            no_cache,
            no_retry,
        } => {
            let params = typed_params(&gateway, &endpoint, params)?;
            let options = FetchOptions::new().no_cache(no_cache);
            let fetched = if no_retry {
                gateway.fetch(&endpoint, &params, options).await?
            } else {
                gateway.fetch_with_retry(&endpoint, &params, options).await?
            };
            if fetched.is_stale() {
                eprintln!("warning: provider unavailable, showing cached response");
            }
            println!("{}", serde_json::to_string_pretty(&*fetched.data)?);
        }

        Command::Bridge {
            concurrency,
            max_line_bytes,
        } => {
            info!(endpoints = gateway.registry().len(), "bridge serving on stdio");
            let bridge = Bridge::new(gateway).max_line_bytes(max_line_bytes);
            let stdin = BufReader::new(tokio::io::stdin());
            bridge.serve(stdin, tokio::io::stdout(), concurrency).await?;
        }
    }

    Ok(())
}

/// Parse a `key=value` argument.
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

/// Type command-line values by the endpoint's declared parameter kinds.
///
/// Undeclared parameters are passed as strings.
fn typed_params(
    gateway: &Gateway,
    endpoint_id: &str,
    raw: Vec<(String, String)>,
) -> Result<Params, GatewayError> {
    let descriptor = gateway.registry().describe(endpoint_id);
    let mut params = Params::new();
    for (name, value) in raw {
        let kind = descriptor
            .and_then(|d| d.params.get(&name))
            .map(|spec| spec.kind);
        let typed = match kind {
            Some(ParamType::Number) => value
                .parse::<i64>()
                .map(ParamValue::from)
                .ok()
                .or_else(|| value.parse::<f64>().ok().and_then(ParamValue::float))
                .ok_or_else(|| {
                    GatewayError::Validation(format!("{name}: {value:?} is not a number"))
                })?,
            Some(ParamType::Boolean) => value.parse::<bool>().map(ParamValue::from).map_err(|_| {
                GatewayError::Validation(format!("{name}: {value:?} is not true or false"))
            })?,
            _ => ParamValue::from(value),
        };
        params.insert(name, typed);
    }
    Ok(params)
}
