use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Cleanup failed: {0}")]
    CleanupFailed(String),

    #[error("Cleanup timed out after {0:?}")]
    Timeout(Duration),
}

/// 需要在关闭时清理的资源
#[async_trait]
pub trait Resource: Send + Sync {
    /// 清理资源
    async fn cleanup(&self) -> Result<(), ResourceError>;

    /// 资源名称
    fn name(&self) -> &str;

    /// 清理优先级（数字越小越先清理）
    fn priority(&self) -> u32 {
        100
    }
}

/// 清理结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub cleaned: Vec<String>,
    pub failed: Vec<String>,
}

/// 资源管理器
pub struct ResourceManager {
    resources: Vec<Arc<dyn Resource>>,
    per_resource_timeout: Duration,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self {
            resources: Vec::new(),
            per_resource_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, per_resource: Duration) -> Self {
        self.per_resource_timeout = per_resource;
        self
    }

    /// 注册资源
    pub fn register(&mut self, resource: Arc<dyn Resource>) {
        info!("Registering resource: {}", resource.name());
        self.resources.push(resource);
    }

    /// 按优先级依次清理，单个资源失败不影响后续资源
    pub async fn cleanup_all(&mut self) -> CleanupReport {
        self.resources.sort_by_key(|r| r.priority());
        info!("Cleaning up {} resources", self.resources.len());

        let mut report = CleanupReport::default();
        for resource in &self.resources {
            let result = match timeout(self.per_resource_timeout, resource.cleanup()).await {
                Ok(result) => result,
                Err(_) => Err(ResourceError::Timeout(self.per_resource_timeout)),
            };

            match result {
                Ok(()) => {
                    info!("Cleaned up: {}", resource.name());
                    report.cleaned.push(resource.name().to_string());
                }
                Err(ResourceError::Timeout(d)) => {
                    warn!("Cleanup of {} timed out after {:?}", resource.name(), d);
                    report.failed.push(resource.name().to_string());
                }
                Err(e) => {
                    error!("Failed to cleanup {}: {}", resource.name(), e);
                    report.failed.push(resource.name().to_string());
                }
            }
        }

        info!("Resource cleanup complete");
        report
    }

    /// 获取资源数量
    pub fn count(&self) -> usize {
        self.resources.len()
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}
