use crate::resource::{CleanupReport, ResourceManager};
use crate::signal::SignalHandler;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// 关闭阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Complete,
    /// 清理超过总时限
    TimedOut,
}

/// 关闭协调器
pub struct ShutdownCoordinator {
    signal_handler: SignalHandler,
    resource_manager: ResourceManager,
    shutdown_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn builder() -> ShutdownCoordinatorBuilder {
        ShutdownCoordinatorBuilder::new()
    }

    /// 等待关闭信号，然后按优先级清理资源
    pub async fn run(self) -> ShutdownPhase {
        info!("Shutdown coordinator started, waiting for signal...");

        let signal = self.signal_handler.wait_for_signal().await;
        info!("Received shutdown signal: {:?}", signal);

        self.cleanup().await.0
    }

    /// 立即执行清理（总时长受 `shutdown_timeout` 约束）
    pub async fn cleanup(mut self) -> (ShutdownPhase, CleanupReport) {
        let start = std::time::Instant::now();

        match timeout(self.shutdown_timeout, self.resource_manager.cleanup_all()).await {
            Ok(report) => {
                info!("Graceful shutdown complete in {:?}", start.elapsed());
                (ShutdownPhase::Complete, report)
            }
            Err(_) => {
                warn!("Shutdown timed out after {:?}", self.shutdown_timeout);
                (ShutdownPhase::TimedOut, CleanupReport::default())
            }
        }
    }

    /// 获取信号处理器的引用
    pub fn signal_handler(&self) -> &SignalHandler {
        &self.signal_handler
    }
}

/// 关闭协调器构建器
pub struct ShutdownCoordinatorBuilder {
    signal_handler: Option<SignalHandler>,
    resource_manager: Option<ResourceManager>,
    shutdown_timeout: Duration,
}

impl ShutdownCoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            signal_handler: None,
            resource_manager: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_signal_handler(mut self, handler: SignalHandler) -> Self {
        self.signal_handler = Some(handler);
        self
    }

    pub fn with_resource_manager(mut self, manager: ResourceManager) -> Self {
        self.resource_manager = Some(manager);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn build(self) -> ShutdownCoordinator {
        ShutdownCoordinator {
            signal_handler: self.signal_handler.unwrap_or_default(),
            resource_manager: self.resource_manager.unwrap_or_default(),
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

impl Default for ShutdownCoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
