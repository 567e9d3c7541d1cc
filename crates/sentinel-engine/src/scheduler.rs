use futures::FutureExt;
use sentinel_core::Result;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 周期任务句柄
struct TaskHandle {
    name: String,
    join_handle: JoinHandle<()>,
}

/// 停止结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub stopped: Vec<String>,
    /// 超时后被强制中止的任务
    pub aborted: Vec<String>,
}

/// 周期任务调度器
///
/// 所有任务共享一个 watch 关闭信号；每个任务在自己的 ticker 上运行，
/// 单次执行的错误和 panic 都在循环边界记录，不会终止任务。
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<TaskHandle>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// 启动一个周期任务，首次执行立即发生
    pub fn spawn_periodic<F, Fut>(&mut self, name: impl Into<String>, period: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let task_name = name.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = period.max(Duration::from_millis(1));

        let join_handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match AssertUnwindSafe(job()).catch_unwind().await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => error!(task = %task_name, "Scheduled task failed: {}", e),
                            Err(_) => error!(task = %task_name, "Scheduled task panicked"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!(task = %task_name, "Scheduled task stopped");
        });

        debug!(task = %name, period_ms = period.as_millis() as u64, "Scheduled task started");
        self.tasks.push(TaskHandle { name, join_handle });
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name.clone()).collect()
    }

    /// 通知全部任务退出，在 `grace` 内等待，超时的任务被中止
    pub async fn shutdown(self, grace: Duration) -> StopReport {
        let _ = self.shutdown_tx.send(true);
        let deadline = Instant::now() + grace;
        let mut report = StopReport::default();

        for mut task in self.tasks {
            match timeout_at(deadline, &mut task.join_handle).await {
                Ok(_) => report.stopped.push(task.name),
                Err(_) => {
                    warn!(task = %task.name, "Scheduled task did not stop in time, aborting");
                    task.join_handle.abort();
                    report.aborted.push(task.name);
                }
            }
        }

        info!(
            stopped = report.stopped.len(),
            aborted = report.aborted.len(),
            "Scheduler stopped"
        );
        report
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
