use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 脚本运行时配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// 引擎堆内存上限（字节），`None` 表示不限制
    #[serde(default)]
    pub memory_limit: Option<usize>,

    /// 引擎栈大小上限（字节）
    #[serde(default)]
    pub max_stack_size: Option<usize>,

    /// GC触发阈值（字节）
    #[serde(default)]
    pub gc_threshold: Option<usize>,

    /// 单次求值的超时时间（毫秒）
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl_default!(RuntimeConfig {
    memory_limit: None,
    max_stack_size: None,
    gc_threshold: None,
    timeout_ms: None,
});

impl RuntimeConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "Timeout must be greater than zero".to_string(),
            ));
        }
        if let Some(limit) = self.memory_limit {
            if limit < 1024 * 1024 {
                return Err(ConfigError::ValidationError(
                    "Memory limit must be at least 1 MiB".to_string(),
                ));
            }
        }
        if self.max_stack_size == Some(0) {
            return Err(ConfigError::ValidationError(
                "Stack size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// 值转换配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarshalConfig {
    /// 列表/字典的最大嵌套深度
    pub max_depth: usize,
}

impl_default!(MarshalConfig { max_depth: 64 });

impl MarshalConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_depth == 0 || self.max_depth > 4096 {
            return Err(ConfigError::ValidationError(
                "Invalid marshal depth".to_string(),
            ));
        }
        Ok(())
    }
}
