use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;

pub mod cache;

pub mod api_key;
pub mod usage_record;

/// 内置建表脚本，启动时总是执行
const SCHEMA_SQL: &str = include_str!("../../data/init.sql");

/// 文件数据库的最大连接数
const MAX_FILE_CONNECTIONS: u32 = 8;

/// 创建 SqlitePool，数据库文件不存在时自动创建
///
/// 内存数据库只存在于单个连接中，因此固定为一个永不过期的连接。
pub async fn connect_sqlite_pool(db_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
    let in_memory = db_url.contains(":memory:") || db_url.contains("mode=memory");

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        if let Some(parent) = sqlite_file_path(db_url).as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        SqlitePoolOptions::new().max_connections(MAX_FILE_CONNECTIONS)
    };

    let pool = pool_options.connect_with(options).await?;
    Ok(pool)
}

// sqlite://data/app.db?mode=rwc -> data/app.db
fn sqlite_file_path(db_url: &str) -> Option<PathBuf> {
    let rest = db_url
        .strip_prefix("sqlite://")
        .or_else(|| db_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// 执行内置建表脚本
pub async fn init_schema(pool: &SqlitePool) -> anyhow::Result<()> {
    apply_sql(pool, SCHEMA_SQL).await
}

/// 异步执行运维提供的 SQL 脚本
pub async fn init_db(pool: &SqlitePool, sql_path: &str) -> anyhow::Result<()> {
    let sql = fs::read_to_string(sql_path).await?;
    apply_sql(pool, &sql).await
}

// 支持多条 SQL 语句分号分割执行
async fn apply_sql(pool: &SqlitePool, sql: &str) -> anyhow::Result<()> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt).execute(pool).await?;
        }
    }
    Ok(())
}
