use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含基础设施配置：
/// - generator: 标识符生成器身份（区域、主机/进程标签覆盖）
/// - regions: 区域名 → 2-bit 区域码映射表
/// - directory: 全局目录库连接与回收器参数
/// - shards: 分片库连接列表（顺序即分片下标）
/// - cache: 缓存系统配置
/// - limiter: 限流配置（按身份层级）
/// - analytics: 点击分析管道配置
/// - logging: 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticConfig {
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default = "default_regions")]
    pub regions: HashMap<String, u8>,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub shards: ShardsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub limiter: LimiterConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > config.toml > 默认值
    /// ENV 前缀：LS，分隔符：__
    /// 示例：LS__CACHE__DEFAULT_TTL=3600
    pub fn load() -> Self {
        use config::{Config, Environment, File};

        // .env 先于环境变量源加载，缺失时静默跳过
        dotenvy::dotenv().ok();

        let path = "config.toml";

        let builder = Config::builder()
            // 1. 从 TOML 文件加载（可选）
            .add_source(File::with_name(path).required(false))
            // 2. 从环境变量覆盖，前缀 LS，分隔符 __
            .add_source(
                Environment::with_prefix("LS")
                    .separator("__")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

/// 生成器身份配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// 本部署所在区域名，必须出现在 [regions] 表中
    #[serde(default = "default_generator_region")]
    pub region: String,
    /// 主机标签覆盖（0..1024）。缺省时从主机名哈希派生
    #[serde(default)]
    pub host_tag: Option<u16>,
    /// 进程标签覆盖（0..32）。缺省时从 PID 派生
    #[serde(default)]
    pub process_tag: Option<u8>,
}

/// 全局目录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_directory_url")]
    pub database_url: String,
    /// 预留超过该秒数仍未提交的条目视为垃圾
    #[serde(default = "default_reservation_timeout")]
    pub reservation_timeout_secs: u64,
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_reconcile_batch")]
    pub reconcile_batch_size: u64,
}

/// 分片库配置。列表顺序即分片下标，部署后不可变更
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardsConfig {
    #[serde(default = "default_shard_urls")]
    pub urls: Vec<String>,
}

/// 数据库连接公共参数（目录、分片、分析库共用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_database_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 缓存系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(rename = "type")]
    #[serde(default = "default_cache_type")]
    pub cache_type: String,
    /// 缓存条目存活秒数，到期自然淘汰（无主动失效）
    #[serde(default = "default_cache_ttl")]
    pub default_ttl: u64,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,
}

/// 内存缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_capacity")]
    pub max_capacity: u64,
}

/// 限流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(rename = "type")]
    #[serde(default = "default_limiter_type")]
    pub limiter_type: String,
    #[serde(default = "default_limiter_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_limiter_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_authenticated_tier")]
    pub authenticated: TierPolicyConfig,
    #[serde(default = "default_anonymous_tier")]
    pub anonymous: TierPolicyConfig,
}

/// 单个层级的限流参数
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierPolicyConfig {
    pub limit: u64,
    pub window_secs: u64,
}

/// 点击分析管道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_analytics_url")]
    pub database_url: String,
    /// 事件主题容量，满载时丢弃并记日志，绝不阻塞请求路径
    #[serde(default = "default_topic_capacity")]
    pub topic_capacity: usize,
    #[serde(default = "default_aggregate_interval")]
    pub aggregate_interval_secs: u64,
    #[serde(default = "default_aggregate_batch")]
    pub aggregate_batch_size: u64,
    /// 分片 clicks 列的批量刷写阈值与周期
    #[serde(default = "default_click_flush_threshold")]
    pub click_flush_threshold: usize,
    #[serde(default = "default_click_flush_interval")]
    pub click_flush_interval_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

// ============================================================
// Default value functions for static config
// ============================================================

fn default_generator_region() -> String {
    "asia".to_string()
}

fn default_regions() -> HashMap<String, u8> {
    let mut regions = HashMap::new();
    regions.insert("asia".to_string(), 0);
    regions.insert("us-east".to_string(), 1);
    regions.insert("eu-central".to_string(), 2);
    regions
}

fn default_directory_url() -> String {
    "directory.db".to_string()
}

fn default_reservation_timeout() -> u64 {
    300
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_reconcile_batch() -> u64 {
    500
}

fn default_shard_urls() -> Vec<String> {
    vec!["shard0.db".to_string()]
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_database_timeout() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_cache_type() -> String {
    "memory".to_string()
}

fn default_cache_ttl() -> u64 {
    86400
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_redis_key_prefix() -> String {
    "linkshard:".to_string()
}

fn default_memory_capacity() -> u64 {
    10000
}

fn default_limiter_type() -> String {
    "memory".to_string()
}

fn default_limiter_key_prefix() -> String {
    "rl:".to_string()
}

fn default_limiter_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_authenticated_tier() -> TierPolicyConfig {
    TierPolicyConfig {
        limit: 1000,
        window_secs: 3600,
    }
}

fn default_anonymous_tier() -> TierPolicyConfig {
    TierPolicyConfig {
        limit: 50,
        window_secs: 86400,
    }
}

fn default_analytics_url() -> String {
    "analytics.db".to_string()
}

fn default_topic_capacity() -> usize {
    1024
}

fn default_aggregate_interval() -> u64 {
    120
}

fn default_aggregate_batch() -> u64 {
    500
}

fn default_click_flush_threshold() -> usize {
    100
}

fn default_click_flush_interval() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_file() -> Option<String> {
    None
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

// ============================================================
// Default implementations
// ============================================================

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            regions: default_regions(),
            directory: DirectoryConfig::default(),
            shards: ShardsConfig::default(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            limiter: LimiterConfig::default(),
            analytics: AnalyticsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            region: default_generator_region(),
            host_tag: None,
            process_tag: None,
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            database_url: default_directory_url(),
            reservation_timeout_secs: default_reservation_timeout(),
            reconcile_interval_secs: default_reconcile_interval(),
            reconcile_batch_size: default_reconcile_batch(),
        }
    }
}

impl Default for ShardsConfig {
    fn default() -> Self {
        Self {
            urls: default_shard_urls(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            pool_size: default_database_pool_size(),
            timeout: default_database_timeout(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: default_cache_type(),
            default_ttl: default_cache_ttl(),
            redis: RedisConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_redis_key_prefix(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_memory_capacity(),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            limiter_type: default_limiter_type(),
            key_prefix: default_limiter_key_prefix(),
            redis_url: default_limiter_redis_url(),
            authenticated: default_authenticated_tier(),
            anonymous: default_anonymous_tier(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            database_url: default_analytics_url(),
            topic_capacity: default_topic_capacity(),
            aggregate_interval_secs: default_aggregate_interval(),
            aggregate_batch_size: default_aggregate_batch(),
            click_flush_threshold: default_click_flush_threshold(),
            click_flush_interval_secs: default_click_flush_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: default_log_file(),
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_launch_topology() {
        let config = StaticConfig::default();
        assert_eq!(config.regions.len(), 3);
        assert_eq!(config.regions.get("asia"), Some(&0));
        assert_eq!(config.shards.urls.len(), 1);
        assert_eq!(config.cache.default_ttl, 86400);
        assert_eq!(config.limiter.authenticated.limit, 1000);
        assert_eq!(config.limiter.anonymous.window_secs, 86400);
        assert_eq!(config.analytics.aggregate_interval_secs, 120);
    }

    #[test]
    fn test_sample_config_round_trips() {
        let sample = StaticConfig::generate_sample_config();
        let parsed: StaticConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.cache.cache_type, "memory");
        assert_eq!(parsed.directory.reservation_timeout_secs, 300);
    }
}
