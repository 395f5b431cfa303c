use std::fmt;

#[derive(Debug, Clone)]
pub enum LinkshardError {
    AlreadyExists(String),
    NotFound(String),
    RateLimited { retry_after_secs: u64, msg: String },
    StoreUnavailable(String),
    PartialWriteTimeout(String),
    MalformedEvent(String),
    Validation(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    CacheConnection(String),
    Serialization(String),
    BackendNotFound(String),
}

impl LinkshardError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            LinkshardError::AlreadyExists(_) => "E001",
            LinkshardError::NotFound(_) => "E002",
            LinkshardError::RateLimited { .. } => "E003",
            LinkshardError::StoreUnavailable(_) => "E004",
            LinkshardError::PartialWriteTimeout(_) => "E005",
            LinkshardError::MalformedEvent(_) => "E006",
            LinkshardError::Validation(_) => "E007",
            LinkshardError::DatabaseConfig(_) => "E008",
            LinkshardError::DatabaseConnection(_) => "E009",
            LinkshardError::DatabaseOperation(_) => "E010",
            LinkshardError::CacheConnection(_) => "E011",
            LinkshardError::Serialization(_) => "E012",
            LinkshardError::BackendNotFound(_) => "E013",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            LinkshardError::AlreadyExists(_) => "Short Key Already Exists",
            LinkshardError::NotFound(_) => "Resource Not Found",
            LinkshardError::RateLimited { .. } => "Rate Limited",
            LinkshardError::StoreUnavailable(_) => "Store Unavailable",
            LinkshardError::PartialWriteTimeout(_) => "Partial Write Timeout",
            LinkshardError::MalformedEvent(_) => "Malformed Event",
            LinkshardError::Validation(_) => "Validation Error",
            LinkshardError::DatabaseConfig(_) => "Database Configuration Error",
            LinkshardError::DatabaseConnection(_) => "Database Connection Error",
            LinkshardError::DatabaseOperation(_) => "Database Operation Error",
            LinkshardError::CacheConnection(_) => "Cache Connection Error",
            LinkshardError::Serialization(_) => "Serialization Error",
            LinkshardError::BackendNotFound(_) => "Backend Not Found",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            LinkshardError::AlreadyExists(msg) => msg,
            LinkshardError::NotFound(msg) => msg,
            LinkshardError::RateLimited { msg, .. } => msg,
            LinkshardError::StoreUnavailable(msg) => msg,
            LinkshardError::PartialWriteTimeout(msg) => msg,
            LinkshardError::MalformedEvent(msg) => msg,
            LinkshardError::Validation(msg) => msg,
            LinkshardError::DatabaseConfig(msg) => msg,
            LinkshardError::DatabaseConnection(msg) => msg,
            LinkshardError::DatabaseOperation(msg) => msg,
            LinkshardError::CacheConnection(msg) => msg,
            LinkshardError::Serialization(msg) => msg,
            LinkshardError::BackendNotFound(msg) => msg,
        }
    }

    /// 限流错误携带的重试等待秒数
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            LinkshardError::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for LinkshardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 默认使用简洁格式
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for LinkshardError {}

// 便捷的构造函数
impl LinkshardError {
    pub fn already_exists<T: Into<String>>(msg: T) -> Self {
        LinkshardError::AlreadyExists(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        LinkshardError::NotFound(msg.into())
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        LinkshardError::RateLimited {
            retry_after_secs,
            msg: format!("retry after {retry_after_secs}s"),
        }
    }

    pub fn store_unavailable<T: Into<String>>(msg: T) -> Self {
        LinkshardError::StoreUnavailable(msg.into())
    }

    pub fn partial_write_timeout<T: Into<String>>(msg: T) -> Self {
        LinkshardError::PartialWriteTimeout(msg.into())
    }

    pub fn malformed_event<T: Into<String>>(msg: T) -> Self {
        LinkshardError::MalformedEvent(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        LinkshardError::Validation(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        LinkshardError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        LinkshardError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        LinkshardError::DatabaseOperation(msg.into())
    }

    pub fn cache_connection<T: Into<String>>(msg: T) -> Self {
        LinkshardError::CacheConnection(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        LinkshardError::Serialization(msg.into())
    }

    pub fn backend_not_found<T: Into<String>>(msg: T) -> Self {
        LinkshardError::BackendNotFound(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for LinkshardError {
    fn from(err: sea_orm::DbErr) -> Self {
        LinkshardError::DatabaseOperation(err.to_string())
    }
}

impl From<serde_json::Error> for LinkshardError {
    fn from(err: serde_json::Error) -> Self {
        LinkshardError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for LinkshardError {
    fn from(err: redis::RedisError) -> Self {
        LinkshardError::CacheConnection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LinkshardError>;
