// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The `mockingbird` binary: flag parsing, logging, signal handling.

use std::path::PathBuf;
use std::sync::Arc;

use structopt::StructOpt;

use mockingbird::config::{load_overrides, parse_override_flag, ErrorSimulation, SimulatedError};
use mockingbird::{Config, Server};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "mockingbird",
    about = "A stateful local fake of the X (Twitter) v2 API"
)]
struct Opt {
    /// Port to listen on.
    #[structopt(short, long, default_value = "8080")]
    port: u16,

    /// Seed-state JSON imported at startup.
    #[structopt(long, parse(from_os_str))]
    seed: Option<PathBuf>,

    /// Directory of canned example responses layered over the embedded set.
    #[structopt(long, parse(from_os_str))]
    examples: Option<PathBuf>,

    /// OpenAPI document to serve from instead of the embedded one.
    #[structopt(long, parse(from_os_str))]
    spec: Option<PathBuf>,

    /// Accept any credentials without matching operation security.
    #[structopt(long)]
    no_auth: bool,

    /// Probability (0..1) of substituting a simulated error per request.
    #[structopt(long)]
    error_rate: Option<f64>,

    /// Comma-separated simulated error kinds
    /// (rate-limited, unauthorized, forbidden, not-found, timeout, internal).
    #[structopt(long, default_value = "internal")]
    error_kinds: String,

    /// Inline rate-limit overrides, `[METHOD:]ENDPOINT=LIMIT/WINDOW_SECS`.
    #[structopt(long = "rate-limit")]
    rate_limits: Vec<String>,

    /// Rate-limit overrides file, re-read on SIGHUP.
    #[structopt(long, parse(from_os_str))]
    rate_limits_file: Option<PathBuf>,

    /// Milliseconds between streamed items.
    #[structopt(long)]
    stream_delay_ms: Option<u64>,

    /// Wall-clock cap in seconds for a single streaming connection.
    #[structopt(long)]
    stream_time_limit: Option<u64>,
}

fn config_from(opt: &Opt) -> mockingbird::error::Result<Config> {
    let mut config = Config {
        port: opt.port,
        seed_path: opt.seed.clone(),
        examples_dir: opt.examples.clone(),
        spec_path: opt.spec.clone(),
        validate_auth: !opt.no_auth,
        rate_overrides_path: opt.rate_limits_file.clone(),
        ..Config::default()
    };
    if let Some(delay) = opt.stream_delay_ms {
        config.stream_delay_ms = delay;
    }
    config.stream_time_limit_secs = opt.stream_time_limit;

    if let Some(rate) = opt.error_rate {
        let kinds: Vec<SimulatedError> = opt
            .error_kinds
            .split(',')
            .filter_map(|k| SimulatedError::parse(k.trim()))
            .collect();
        config.error_simulation = Some(ErrorSimulation { rate, kinds });
    }

    for flag in &opt.rate_limits {
        config.rate_overrides.push(parse_override_flag(flag)?);
    }
    if let Some(path) = &opt.rate_limits_file {
        config
            .rate_overrides
            .extend(load_overrides(&std::fs::read_to_string(path)?)?);
    }
    Ok(config)
}

/// Re-reads the overrides file on SIGHUP and swaps the limiter's policy
/// source in place.
async fn watch_reload(server: Arc<Server>) {
    let path = match &server.config.rate_overrides_path {
        Some(path) => path.clone(),
        None => return,
    };
    let mut hangup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(err) => {
            tracing::warn!(%err, "cannot install SIGHUP handler; live reload disabled");
            return;
        }
    };
    while hangup.recv().await.is_some() {
        match std::fs::read_to_string(&path).map_err(mockingbird::Error::from).and_then(|s| load_overrides(&s)) {
            Ok(overrides) => {
                tracing::info!(count = overrides.len(), "reloaded rate-limit overrides");
                let overrides = Arc::new(overrides);
                server
                    .limiter
                    .set_source(Arc::new(move || Arc::clone(&overrides)));
            }
            Err(err) => tracing::warn!(%err, "keeping the previous overrides"),
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mockingbird=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> mockingbird::error::Result<()> {
    init_tracing();
    let opt = Opt::from_args();
    let config = config_from(&opt)?;
    let server = Arc::new(Server::new(config)?);

    tokio::spawn(watch_reload(Arc::clone(&server)));

    mockingbird::run(server).await
}
