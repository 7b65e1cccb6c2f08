use anyhow::{anyhow, Context, Result};
use modkit::{EnvProvider, FeatureFlags, ModuleKey, ModuleRegistry, ProjectId, StaticProject};
use modkit_db::{ConnectOpts, DbHandle, SqlModuleStore};
use runtime::{AppConfig, DatabaseConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Everything a command needs: config, the validated registry, the flags
/// facade and, when configured, the database it persists to.
pub struct AdminContext {
    pub config: AppConfig,
    pub registry: Arc<ModuleRegistry>,
    pub flags: FeatureFlags,
    pub db: Option<DbHandle>,
}

impl AdminContext {
    pub async fn open(config: AppConfig) -> Result<Self> {
        let registry = Arc::new(ModuleRegistry::builtin().context("module registry is invalid")?);
        let default_modules = parse_modules(&config.features.default_modules)
            .context("invalid features.default_modules")?;

        let db = match &config.database {
            Some(db_config) => Some(connect(db_config, Path::new(&config.home_dir)).await?),
            None => {
                tracing::warn!("No database configuration found, module state will not persist");
                None
            }
        };

        let project = config
            .features
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ProjectId::from);

        let mut builder = FeatureFlags::builder(registry.clone())
            .with_env(EnvProvider::from_process(config.features.env_prefix.clone()))
            .with_default_modules(default_modules)
            .with_project_resolver(Arc::new(StaticProject(project)));
        if let Some(db) = &db {
            builder = builder.with_store(Arc::new(SqlModuleStore::new(db)));
        }

        Ok(Self {
            flags: builder.build(),
            config,
            registry,
            db,
        })
    }

    pub fn require_db(&self) -> Result<&DbHandle> {
        self.db
            .as_ref()
            .ok_or_else(|| anyhow!("database is not configured; set `database.url`"))
    }
}

pub fn parse_modules(raw: &[String]) -> Result<Vec<ModuleKey>> {
    raw.iter()
        .map(|s| s.trim().parse::<ModuleKey>().map_err(Into::into))
        .collect()
}

async fn connect(cfg: &DatabaseConfig, home_dir: &Path) -> Result<DbHandle> {
    let raw = cfg.url.trim();
    if raw.is_empty() {
        return Err(anyhow!("Database URL not configured"));
    }

    // Relative sqlite paths live under home_dir, not the cwd.
    let dsn = modkit_db::sqlite::resolve_dsn(raw, home_dir);
    let opts = ConnectOpts {
        max_conns: cfg.max_conns,
        acquire_timeout: Some(Duration::from_secs(5)),
        busy_timeout: cfg
            .busy_timeout_ms
            .map(|ms| Duration::from_millis(u64::from(ms))),
        create_sqlite_dirs: true,
    };

    tracing::info!(dsn = %dsn, "Connecting to database");
    let db = DbHandle::connect(&dsn, opts)
        .await
        .with_context(|| format!("cannot open database '{dsn}'"))?;
    modkit_db::ensure_schema(&db)
        .await
        .context("cannot create module tables")?;
    Ok(db)
}
