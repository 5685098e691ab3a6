use crate::services::file_service::RoutingPolicy;
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt, str::FromStr};

/// Where objects are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// SQLite metadata + local disk payloads.
    Local,
    /// Remote S3-compatible bucket (Tencent COS by default).
    Cos,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; loaded once at startup.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub storage_dir: String,
    pub database_url: String,
    pub bucket: String,
    pub region: String,
    pub secret_id: String,
    pub secret_key: String,
    /// S3 API endpoint override for the remote backend.
    pub endpoint: Option<String>,
    /// Host objects are publicly served from; defaults to `cos.{region}.myqcloud.com`.
    pub public_host: String,
    pub auth_token: String,
    pub routing: RoutingPolicy,
    pub max_upload_bytes: usize,
}

/// Secrets are never printed.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("backend", &self.backend)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("secret_id", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("public_host", &self.public_host)
            .field("auth_token", &"<redacted>")
            .field("routing", &self.routing)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "File manager API over an object-storage bucket")]
pub struct Args {
    /// Host to bind to (overrides BUCKET_DRIVE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BUCKET_DRIVE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage backend (overrides BUCKET_DRIVE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Directory for local payloads (overrides BUCKET_DRIVE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL for local metadata (overrides BUCKET_DRIVE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Bucket name (overrides BUCKET_DRIVE_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Bucket region (overrides BUCKET_DRIVE_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// S3 API endpoint (overrides BUCKET_DRIVE_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Public host for share URLs (overrides BUCKET_DRIVE_PUBLIC_HOST)
    #[arg(long)]
    pub public_host: Option<String>,

    /// Folder-vs-file routing when a request omits `mode` (overrides BUCKET_DRIVE_ROUTING)
    #[arg(long, value_enum)]
    pub routing: Option<RoutingPolicy>,

    /// Largest accepted upload body in MiB (overrides BUCKET_DRIVE_MAX_UPLOAD_MB)
    #[arg(long)]
    pub max_upload_mb: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read `name`, falling back to `default` when unset.
fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Read and parse `name`; `None` when unset.
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("parsing {} value `{}`: {}", name, value, err)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_value_enum<T: ValueEnum>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => T::from_str(&value, true)
            .map(Some)
            .map_err(|err| anyhow::anyhow!("parsing {} value `{}`: {}", name, value, err)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// Merge CLI args over environment variables over defaults, then validate.
    pub fn merge(args: Args) -> Result<Self> {
        let env_port = env_parse::<u16>("BUCKET_DRIVE_PORT")?.unwrap_or(3000);
        let env_backend =
            env_value_enum::<Backend>("BUCKET_DRIVE_BACKEND")?.unwrap_or(Backend::Local);
        let env_routing =
            env_value_enum::<RoutingPolicy>("BUCKET_DRIVE_ROUTING")?.unwrap_or_default();
        let env_max_upload = env_parse::<usize>("BUCKET_DRIVE_MAX_UPLOAD_MB")?.unwrap_or(100);

        let region = args
            .region
            .unwrap_or_else(|| env_or("BUCKET_DRIVE_REGION", "local"));
        let public_host = args
            .public_host
            .or_else(|| env::var("BUCKET_DRIVE_PUBLIC_HOST").ok())
            .unwrap_or_else(|| format!("cos.{}.myqcloud.com", region));

        let max_upload_mb = args.max_upload_mb.unwrap_or(env_max_upload);
        let Some(max_upload_bytes) = max_upload_mb.checked_mul(1024 * 1024) else {
            bail!("upload limit of {} MiB is too large", max_upload_mb);
        };

        let cfg = Self {
            host: args
                .host
                .unwrap_or_else(|| env_or("BUCKET_DRIVE_HOST", "0.0.0.0")),
            port: args.port.unwrap_or(env_port),
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("BUCKET_DRIVE_STORAGE_DIR", "./data/objects")),
            database_url: args.database_url.unwrap_or_else(|| {
                env_or(
                    "BUCKET_DRIVE_DATABASE_URL",
                    "sqlite://./data/meta/bucket_drive.db",
                )
            }),
            bucket: args
                .bucket
                .unwrap_or_else(|| env_or("BUCKET_DRIVE_BUCKET", "local")),
            region,
            secret_id: env_or("BUCKET_DRIVE_SECRET_ID", ""),
            secret_key: env_or("BUCKET_DRIVE_SECRET_KEY", ""),
            endpoint: args
                .endpoint
                .or_else(|| env::var("BUCKET_DRIVE_ENDPOINT").ok()),
            public_host,
            auth_token: env_or("BUCKET_DRIVE_TOKEN", ""),
            routing: args.routing.unwrap_or(env_routing),
            max_upload_bytes,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the service cannot run safely with.
    pub fn validate(&self) -> Result<()> {
        if self.auth_token.is_empty() {
            bail!("BUCKET_DRIVE_TOKEN must be set");
        }
        if self.bucket.is_empty() || self.region.is_empty() {
            bail!("bucket and region must both be configured");
        }
        if self.backend == Backend::Cos
            && (self.secret_id.is_empty() || self.secret_key.is_empty())
        {
            bail!("the cos backend needs BUCKET_DRIVE_SECRET_ID and BUCKET_DRIVE_SECRET_KEY");
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            host: "127.0.0.1".into(),
            port: 3000,
            backend: Backend::Cos,
            storage_dir: "./data".into(),
            database_url: "sqlite::memory:".into(),
            bucket: "demo-125000".into(),
            region: "ap-guangzhou".into(),
            secret_id: "AKID".into(),
            secret_key: "very-secret".into(),
            endpoint: None,
            public_host: "cos.ap-guangzhou.myqcloud.com".into(),
            auth_token: "token".into(),
            routing: RoutingPolicy::Explicit,
            max_upload_bytes: 1024,
        }
    }

    #[test]
    fn debug_output_hides_secrets() {
        let printed = format!("{:?}", sample());
        assert!(!printed.contains("very-secret"));
        assert!(!printed.contains("AKID"));
        assert!(printed.contains("demo-125000"));
    }

    #[test]
    fn validation_requires_token_and_credentials() {
        assert!(sample().validate().is_ok());

        let mut no_token = sample();
        no_token.auth_token.clear();
        assert!(no_token.validate().is_err());

        let mut no_secret = sample();
        no_secret.secret_key.clear();
        assert!(no_secret.validate().is_err());

        no_secret.backend = Backend::Local;
        assert!(no_secret.validate().is_ok());
    }

    #[test]
    fn oversized_upload_limit_is_rejected() {
        let too_big = (usize::MAX / 1024).to_string();
        let args = Args::try_parse_from(["bucket-drive", "--max-upload-mb", too_big.as_str()])
            .unwrap();
        let err = AppConfig::merge(args).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn args_parse_routing_and_backend() {
        let args = Args::try_parse_from([
            "bucket-drive",
            "--backend",
            "cos",
            "--routing",
            "separator",
            "--port",
            "8080",
        ])
        .unwrap();
        assert_eq!(args.backend, Some(Backend::Cos));
        assert_eq!(args.routing, Some(RoutingPolicy::Separator));
        assert_eq!(args.port, Some(8080));
    }
}
