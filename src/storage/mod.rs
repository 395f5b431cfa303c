//! Database plumbing shared by every SQL-backed store in the crate
//! (directory, shards, analytics): URL-based backend selection, tuned
//! connections, schema migration and retry.

pub mod retry;

mod connection;

pub use connection::{connect, connect_generic, connect_sqlite, run_migrations};

use crate::errors::{LinkshardError, Result};

/// 数据库后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    Mysql,
    Postgres,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Mysql => "mysql",
            BackendKind::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<BackendKind> {
    if database_url.starts_with("sqlite://")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok(BackendKind::Sqlite)
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok(BackendKind::Mysql)
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok(BackendKind::Postgres)
    } else {
        Err(LinkshardError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_backend() {
        assert_eq!(
            infer_backend_from_url("sqlite://links.db").unwrap(),
            BackendKind::Sqlite
        );
        assert_eq!(
            infer_backend_from_url("directory.db").unwrap(),
            BackendKind::Sqlite
        );
        assert_eq!(
            infer_backend_from_url("mariadb://host/db").unwrap(),
            BackendKind::Mysql
        );
        assert_eq!(
            infer_backend_from_url("postgresql://host/db").unwrap(),
            BackendKind::Postgres
        );
        assert!(infer_backend_from_url("redis://host").is_err());
    }
}
