use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub region: String,
    pub s3_endpoint: Option<String>,
    pub fetch_timeout: Duration,
    pub transform_timeout: Duration,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "On-demand image resizing proxy")]
pub struct Args {
    /// Host to bind to (overrides IMAGX_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGX_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage region (overrides IMAGX_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// S3-compatible endpoint URL (overrides IMAGX_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Seconds allowed for fetching an object (overrides IMAGX_FETCH_TIMEOUT_SECS)
    #[arg(long)]
    pub fetch_timeout_secs: Option<u64>,

    /// Seconds allowed for decode + resize + encode (overrides IMAGX_TRANSFORM_TIMEOUT_SECS)
    #[arg(long)]
    pub transform_timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |name| env::var(name))
    }

    /// Layer `args` over values read through `lookup`, then defaults.
    fn merge<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let env_host = lookup("IMAGX_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "IMAGX_PORT", 8080)?;
        let env_region = lookup("IMAGX_REGION").unwrap_or_else(|_| "ap-southeast-1".into());
        let env_endpoint = lookup("IMAGX_S3_ENDPOINT").ok().filter(|v| !v.is_empty());
        let env_fetch = parse_var(&lookup, "IMAGX_FETCH_TIMEOUT_SECS", 10)?;
        let env_transform = parse_var(&lookup, "IMAGX_TRANSFORM_TIMEOUT_SECS", 30)?;

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            region: args.region.unwrap_or(env_region),
            s3_endpoint: args.s3_endpoint.or(env_endpoint),
            fetch_timeout: Duration::from_secs(args.fetch_timeout_secs.unwrap_or(env_fetch)),
            transform_timeout: Duration::from_secs(
                args.transform_timeout_secs.unwrap_or(env_transform),
            ),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
