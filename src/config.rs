use anyhow::{Context, Result, bail};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; credentials are
/// validated here so misconfiguration fails at startup, not mid-request.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub github_token: String,
    pub github_api_root: String,
    pub upstream_owner: String,
    pub upstream_repo: String,
    pub base_branch: String,
    pub parts_dir: String,
    pub verify_turnstile: bool,
    pub turnstile_secret: Option<String>,
    pub admin_password: Option<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Parts catalog submission gateway")]
pub struct Args {
    /// Host to bind to (overrides PARTS_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PARTS_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Rate-limit database URL (overrides PARTS_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// GitHub API token (overrides PARTS_GATEWAY_GITHUB_TOKEN / GITHUB_TOKEN)
    #[arg(long)]
    pub github_token: Option<String>,

    /// GitHub API root, for GitHub Enterprise (overrides PARTS_GATEWAY_GITHUB_API_ROOT)
    #[arg(long)]
    pub github_api_root: Option<String>,

    /// Owner of the upstream catalog repository (overrides PARTS_GATEWAY_UPSTREAM_OWNER)
    #[arg(long)]
    pub upstream_owner: Option<String>,

    /// Name of the upstream catalog repository (overrides PARTS_GATEWAY_UPSTREAM_REPO)
    #[arg(long)]
    pub upstream_repo: Option<String>,

    /// Base branch submissions target (overrides PARTS_GATEWAY_BASE_BRANCH)
    #[arg(long)]
    pub base_branch: Option<String>,

    /// Directory of part records in the upstream repo (overrides PARTS_GATEWAY_PARTS_DIR)
    #[arg(long)]
    pub parts_dir: Option<String>,

    /// Enforce Turnstile bot verification (overrides PARTS_GATEWAY_VERIFY_TURNSTILE)
    #[arg(long)]
    pub verify_turnstile: Option<bool>,

    /// Turnstile secret key (overrides PARTS_GATEWAY_TURNSTILE_SECRET)
    #[arg(long)]
    pub turnstile_secret: Option<String>,

    /// Admin dashboard password; admin routes are disabled when absent
    /// (overrides PARTS_GATEWAY_ADMIN_PASSWORD)
    #[arg(long)]
    pub admin_password: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read an env var, treating "not present" as None and anything else
/// unreadable as a hard error.
fn optional_env(name: &str) -> Result<Option<String>> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = optional_env("PARTS_GATEWAY_HOST")?.unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match optional_env("PARTS_GATEWAY_PORT")? {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PARTS_GATEWAY_PORT value `{}`", value))?,
            None => 3000,
        };
        let env_db = optional_env("PARTS_GATEWAY_DATABASE_URL")?
            .unwrap_or_else(|| "sqlite://./data/meta/parts_gateway.db".into());
        let env_token = match optional_env("PARTS_GATEWAY_GITHUB_TOKEN")? {
            Some(token) => Some(token),
            None => optional_env("GITHUB_TOKEN")?,
        };
        let env_api_root = optional_env("PARTS_GATEWAY_GITHUB_API_ROOT")?
            .unwrap_or_else(|| "https://api.github.com".into());
        let env_owner = optional_env("PARTS_GATEWAY_UPSTREAM_OWNER")?;
        let env_repo = optional_env("PARTS_GATEWAY_UPSTREAM_REPO")?;
        let env_base =
            optional_env("PARTS_GATEWAY_BASE_BRANCH")?.unwrap_or_else(|| "master".into());
        let env_parts_dir =
            optional_env("PARTS_GATEWAY_PARTS_DIR")?.unwrap_or_else(|| "src/data/parts".into());
        let env_verify = match optional_env("PARTS_GATEWAY_VERIFY_TURNSTILE")? {
            Some(value) => value.parse::<bool>().with_context(|| {
                format!("parsing PARTS_GATEWAY_VERIFY_TURNSTILE value `{}`", value)
            })?,
            None => true,
        };
        let env_secret = optional_env("PARTS_GATEWAY_TURNSTILE_SECRET")?;
        let env_admin = optional_env("PARTS_GATEWAY_ADMIN_PASSWORD")?;

        // --- Merge ---
        let github_token = match args.github_token.or(env_token) {
            Some(token) if !token.is_empty() => token,
            _ => bail!("missing GitHub token (set PARTS_GATEWAY_GITHUB_TOKEN or GITHUB_TOKEN)"),
        };
        let upstream_owner = match args.upstream_owner.or(env_owner) {
            Some(owner) if !owner.is_empty() => owner,
            _ => bail!("missing upstream owner (set PARTS_GATEWAY_UPSTREAM_OWNER)"),
        };
        let upstream_repo = match args.upstream_repo.or(env_repo) {
            Some(repo) if !repo.is_empty() => repo,
            _ => bail!("missing upstream repo (set PARTS_GATEWAY_UPSTREAM_REPO)"),
        };

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            github_token,
            github_api_root: args.github_api_root.unwrap_or(env_api_root),
            upstream_owner,
            upstream_repo,
            base_branch: args.base_branch.unwrap_or(env_base),
            parts_dir: args.parts_dir.unwrap_or(env_parts_dir),
            verify_turnstile: args.verify_turnstile.unwrap_or(env_verify),
            turnstile_secret: args.turnstile_secret.or(env_secret),
            admin_password: args.admin_password.or(env_admin),
        };

        // Enforcement without a secret would silently pass every bot
        // through; refuse to start instead.
        if cfg.verify_turnstile && cfg.turnstile_secret.as_deref().unwrap_or("").is_empty() {
            bail!(
                "turnstile verification is enabled but no secret is configured \
                 (set PARTS_GATEWAY_TURNSTILE_SECRET or pass --verify-turnstile false)"
            );
        }

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
