//! s3verify -- test an S3-compatible endpoint for Amazon S3 API conformance.
//!
//! Runs every case by default, or only those named on the command line:
//!
//! ```text
//! S3_URL=http://127.0.0.1:9000 S3_ACCESS=... S3_SECRET=... s3verify --prepare
//! s3verify --url https://s3.amazonaws.com --access ... --secret ... makebucket listbuckets
//! ```

use std::process::ExitCode;

use anyhow::Context;
use clap::builder::PossibleValuesParser;
use clap::Parser;
use tracing::info;

use s3verify::config::{load_config, Config, LoggingConfig};
use s3verify::runner::{resolve_seed, TestCase, TestContext, TestRunner};
use s3verify::server::ServerConfig;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "s3verify",
    version,
    about = "Test for Amazon S3 v4 API compatibility"
)]
struct Cli {
    /// Path to an optional YAML configuration file.
    #[arg(short, long)]
    config: Option<String>,

    /// Access key.
    #[arg(long, env = "S3_ACCESS", hide_env_values = true)]
    access: Option<String>,

    /// Secret key.
    #[arg(long, env = "S3_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Endpoint URL, e.g. https://s3.amazonaws.com.
    #[arg(long, env = "S3_URL")]
    url: Option<String>,

    /// Region used for signing and bucket creation.
    #[arg(long)]
    region: Option<String>,

    /// Create and exercise harness-owned buckets and objects.
    #[arg(long)]
    prepare: bool,

    /// JSON manifest describing pre-existing buckets and objects.
    #[arg(long)]
    manifest: Option<String>,

    /// Seed for random ranges and bucket names.
    #[arg(long)]
    seed: Option<u64>,

    /// Cases to run; all of them when omitted.
    #[arg(value_parser = PossibleValuesParser::new(TestCase::COMMANDS))]
    commands: Vec<String>,
}

impl Cli {
    /// Apply command-line values on top of `config`.
    fn apply(self, mut config: Config) -> (Config, Vec<String>) {
        if let Some(access) = self.access {
            config.target.access_key = access;
        }
        if let Some(secret) = self.secret {
            config.target.secret_key = secret;
        }
        if let Some(url) = self.url {
            config.target.url = url;
        }
        if let Some(region) = self.region {
            config.target.region = region;
        }
        if self.prepare {
            config.run.prepare = true;
        }
        if let Some(manifest) = self.manifest {
            config.fixtures.manifest = manifest;
        }
        if self.seed.is_some() {
            config.run.seed = self.seed;
        }
        (config, self.commands)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load configuration from {path}"))?,
        None => Config::default(),
    };
    let (config, commands) = cli.apply(config);

    init_tracing(&config.logging);
    config.validate()?;

    let cases = TestCase::select(&commands)?;
    let server = ServerConfig::from_config(&config)?;
    let seed = resolve_seed(config.run.seed);
    info!(
        "Testing {} ({} cases, prepare={}, seed={seed})",
        server.endpoint,
        cases.len(),
        config.run.prepare
    );

    let mut ctx = TestContext::from_config(server, &config, seed)
        .context("failed to set up fixtures; pass --prepare or --manifest")?;
    let runner = TestRunner::new(cases);
    let summary = runner.run(&mut ctx, &mut std::io::stdout().lock()).await?;

    Ok(ExitCode::from(summary.exit_code()))
}

/// Install the global subscriber.  `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
