//! 引擎配置（EngineConfig）
//!
//! 纯 serde 结构体，宿主可从任意配置源（文件、环境变量等）反序列化；
//! 缺省字段回落到 `Default`。
//!
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 默认快照间隔（按事件序号计）
pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 本服务的来源标识，内部聚合的 origin 会解析为该值
    pub origin: String,
    /// 多租户场景下写入事件/快照的租户
    pub tenant_id: Option<String>,
    /// 声明为可快照但未指定间隔时使用的间隔
    pub default_snapshot_interval: u64,
    pub consumer: ConsumerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            origin: "default".to_string(),
            tenant_id: None,
            default_snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            consumer: ConsumerConfig::default(),
        }
    }
}

/// 消费端重试配置：固定间隔，有限次数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl ConsumerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"origin":"billing","consumer":{"retry_attempts":5}}"#)
                .unwrap();
        assert_eq!(cfg.origin, "billing");
        assert_eq!(cfg.default_snapshot_interval, DEFAULT_SNAPSHOT_INTERVAL);
        assert_eq!(cfg.consumer.retry_attempts, 5);
        assert_eq!(cfg.consumer.retry_delay(), Duration::from_millis(1000));
    }
}
