use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub argon2: Argon2Config,
    pub timeouts: CollaboratorTimeoutConfig,
}

/// 应用设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub environment: String,
    pub log_level: String,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub max_workers: usize,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub base_dir: String, // 数据根目录，courses/ users.json 等均位于其下
}

/// 任务调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub max_wait_ms: u64, // 两次轮询之间的最长等待
    pub min_wait_ms: u64, // 两次轮询之间的最短等待
}

/// Argon2 参数（令牌摘要）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argon2Config {
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

/// 外部协作方调用的超时配置 (毫秒)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorTimeoutConfig {
    pub email_soft_ms: u64,
    pub email_hard_ms: u64,
}
