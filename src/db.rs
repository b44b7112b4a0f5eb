use deadpool_postgres::{
    Config as PoolConfig, ManagerConfig, Pool, PoolConfig as SizeConfig, RecyclingMethod, Runtime,
};
use tokio_postgres::NoTls;

use crate::error::{AppError, AppResult};

// Embedded so startup does not depend on the working directory
const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_create_users", include_str!("../migrations/0001_create_users.sql")),
    (
        "0002_create_conversations",
        include_str!("../migrations/0002_create_conversations.sql"),
    ),
    ("0003_create_messages", include_str!("../migrations/0003_create_messages.sql")),
    ("0004_add_user_profile", include_str!("../migrations/0004_add_user_profile.sql")),
];

pub fn init_pool(database_url: &str, max_size: usize) -> AppResult<Pool> {
    let mut cfg = PoolConfig::new();
    cfg.url = Some(database_url.to_string());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(SizeConfig::new(max_size));

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| AppError::StartServer(format!("create db pool: {e}")))
}

/// Applies every migration in order. Each file is idempotent.
pub async fn run_migrations(pool: &Pool) -> AppResult<()> {
    let client = pool.get().await?;
    for (label, sql) in MIGRATIONS {
        client
            .batch_execute(sql)
            .await
            .map_err(|e| AppError::StartServer(format!("migration {label}: {e}")))?;
        tracing::info!(migration = %label, "migration applied");
    }
    Ok(())
}
