use anyhow::Result;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use parts_gateway::services::rate_limit::{RateLimiter, SqliteRateLimitStore};
use parts_gateway::services::repo_host::GithubClient;
use parts_gateway::services::submission_service::SubmissionService;
use parts_gateway::services::turnstile::{SITEVERIFY_URL, TurnstileVerifier};
use parts_gateway::{config, routes};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!(
        "Starting parts-gateway against {}/{} (base branch {}, parts dir {})",
        cfg.upstream_owner,
        cfg.upstream_repo,
        cfg.base_branch,
        cfg.parts_dir
    );

    // --- Initialize SQLite connection (rate-limit store) ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");

    // Create parent directory if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    // --- Handle migration mode ---
    if migrate {
        run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Wire collaborators + core service ---
    let repo = Arc::new(GithubClient::new(
        cfg.github_api_root.clone(),
        cfg.upstream_owner.clone(),
        cfg.upstream_repo.clone(),
        cfg.github_token.clone(),
    )?);
    let limiter = RateLimiter::new(Arc::new(SqliteRateLimitStore::new(db.clone())));
    let turnstile = if cfg.verify_turnstile {
        // Presence of the secret is enforced at config parse time.
        let secret = cfg.turnstile_secret.clone().unwrap_or_default();
        Some(Arc::new(TurnstileVerifier::new(SITEVERIFY_URL, secret)?))
    } else {
        tracing::warn!("Turnstile verification is disabled; bot challenges will not be checked");
        None
    };

    let service = SubmissionService::new(
        repo,
        limiter,
        turnstile,
        cfg.base_branch.clone(),
        cfg.parts_dir.clone(),
        cfg.admin_password.clone(),
    );

    // --- Build router ---
    let admin_enabled = service.admin_enabled();
    if !admin_enabled {
        tracing::info!("No admin password configured; admin routes are disabled");
    }
    let app: Router = routes::routes::routes(admin_enabled).with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run SQLite migrations manually from the embedded SQL file.
async fn run_migrations(db: &Arc<sqlx::Pool<sqlx::Sqlite>>) -> Result<()> {
    let path = "migrations/0001_init.sql";

    if !Path::new(path).exists() {
        anyhow::bail!("Migration file not found: {}", path);
    }

    let sql = fs::read_to_string(path)?;
    let statements = sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(&**db).await?;
    }

    Ok(())
}
