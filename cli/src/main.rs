use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wirefetch_core::constants::mime;
use wirefetch_core::{ClientConfig, Client, HttpMessage, Request};

mod config;

use config::{load_config, resolve_options, ConfigError};

#[derive(Parser, Debug)]
#[command(name = "wirefetch", version)]
#[command(about = "Send one HTTP/1.1 request and print the response", long_about = None)]
struct Cli {
    /// TOML file with client settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Request method; defaults to GET, or POST when a body is given
    #[arg(short = 'X', long = "request", value_name = "METHOD")]
    method: Option<String>,

    /// Extra request header, repeatable
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    headers: Vec<String>,

    /// Request body; `@path` reads it from a file
    #[arg(short = 'd', long = "data", value_name = "BODY")]
    data: Option<String>,

    /// Deadline for the whole exchange
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Print the status line and headers before the body
    #[arg(short = 'i', long = "include")]
    include: bool,

    url: String,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] wirefetch_core::Error),

    #[error("header {0:?} is not in `Name: value` form")]
    HeaderArg(String),

    #[error("failed to read request body from {}", path.display())]
    Data {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write output")]
    Output(#[from] io::Error),
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("wirefetch: {err}");
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    let options = resolve_options(config, cli.timeout_ms)?;

    let request = build_request(&cli)?;
    tracing::debug!(method = %request.method(), uri = %request.uri(), "sending");
    let mut response = Client::new().with_options(options).send(request)?;

    let mut out = io::stdout().lock();
    if cli.include {
        write!(out, "{response}")?;
    }
    let body = response.bytes()?;
    out.write_all(&body)?;
    out.flush()?;
    Ok(())
}

fn build_request(cli: &Cli) -> Result<Request, CliError> {
    let method = match (&cli.method, &cli.data) {
        (Some(method), _) => method.as_str(),
        (None, Some(_)) => "POST",
        (None, None) => "GET",
    };
    let mut request = Request::parse(method, &cli.url)?;
    for raw in &cli.headers {
        let (name, value) = split_header(raw)?;
        request.headers_mut().add(name, value)?;
    }
    if let Some(data) = &cli.data {
        let body = match data.strip_prefix('@') {
            Some(path) => std::fs::read(path).map_err(|source| CliError::Data {
                path: PathBuf::from(path),
                source,
            })?,
            None => data.clone().into_bytes(),
        };
        request.set_body_bytes(body, mime::APPLICATION_OCTET_STREAM)?;
    }
    Ok(request)
}

/// Split `Name: value`, trimming blanks around the value.
fn split_header(raw: &str) -> Result<(&str, &str), CliError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| CliError::HeaderArg(raw.to_string()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::HeaderArg(raw.to_string()));
    }
    Ok((name, value.trim()))
}
