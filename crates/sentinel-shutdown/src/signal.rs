use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// 关闭信号类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM - 优雅关闭
    Term,

    /// SIGINT - Ctrl+C
    Interrupt,

    /// 手动触发（API 或测试）
    Manual,
}

/// 信号处理器：把系统信号转成广播
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
}

impl SignalHandler {
    pub fn new() -> (Self, broadcast::Receiver<ShutdownSignal>) {
        let (tx, rx) = broadcast::channel(16);
        (Self { shutdown_tx: tx }, rx)
    }

    /// 等待广播的关闭信号
    pub async fn wait_for_signal(&self) -> ShutdownSignal {
        let mut rx = self.shutdown_tx.subscribe();
        rx.recv().await.unwrap_or(ShutdownSignal::Manual)
    }

    /// 等待系统信号并广播
    #[cfg(unix)]
    pub async fn wait_for_system_signal(&self) -> ShutdownSignal {
        use signal::unix::{signal, SignalKind};

        let received = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => ShutdownSignal::Term,
                    _ = sigint.recv() => ShutdownSignal::Interrupt,
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install unix signal handlers, falling back to Ctrl+C: {}", e);
                self.wait_for_ctrl_c().await
            }
        };

        info!("Received {:?}", received);
        let _ = self.shutdown_tx.send(received);
        received
    }

    /// 等待系统信号（非 unix 平台）
    #[cfg(not(unix))]
    pub async fn wait_for_system_signal(&self) -> ShutdownSignal {
        let received = self.wait_for_ctrl_c().await;
        info!("Received {:?}", received);
        let _ = self.shutdown_tx.send(received);
        received
    }

    async fn wait_for_ctrl_c(&self) -> ShutdownSignal {
        match signal::ctrl_c().await {
            Ok(()) => ShutdownSignal::Interrupt,
            Err(e) => {
                warn!("Failed to listen for Ctrl+C: {}", e);
                // 无法监听系统信号时只能等待手动触发
                self.wait_for_signal().await
            }
        }
    }

    /// 手动触发关闭
    pub fn trigger_shutdown(&self) {
        info!("Manual shutdown triggered");
        let _ = self.shutdown_tx.send(ShutdownSignal::Manual);
    }

    /// 订阅关闭信号
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_tx.subscribe()
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new().0
    }
}
