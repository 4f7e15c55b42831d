// scheduler.rs — 后台定时任务
// 一个定时器负责定期抓取，另一个更短的定时器负责失败后的重试检查

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::rotator::RotationEngine;

pub struct Scheduler {
    engine: Arc<RotationEngine>,
    fetch_every: Duration,
    retry_every: Duration,
    /// 0 表示不限次数
    max_retries: u32,
}

/// 连续失败次数未达上限时才允许自动重试
pub fn retry_allowed(retry_count: u32, max_retries: u32) -> bool {
    max_retries == 0 || retry_count < max_retries
}

impl Scheduler {
    pub fn new(engine: Arc<RotationEngine>, fetch_every: Duration, retry_every: Duration, max_retries: u32) -> Self {
        Self {
            engine,
            fetch_every,
            retry_every,
            max_retries,
        }
    }

    /// 运行直到 `shutdown` 完成
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        info!(
            fetch_every = ?self.fetch_every,
            retry_every = ?self.retry_every,
            max_retries = self.max_retries,
            "scheduler started"
        );

        if self.engine.should_retry_fetch().await {
            self.fetch(false).await;
        } else if let Err(e) = self.engine.set_current().await {
            // 登录后恢复上次的壁纸
            warn!("could not restore current wallpaper: {e}");
        }

        let start = Instant::now();
        let mut fetch_tick = interval_at(start + self.fetch_every, self.fetch_every);
        fetch_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retry_tick = interval_at(start + self.retry_every, self.retry_every);
        retry_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("scheduler shutting down");
                    break;
                }
                _ = fetch_tick.tick() => {
                    self.fetch(false).await;
                }
                _ = retry_tick.tick() => {
                    self.retry_check().await;
                }
            }
        }
    }

    async fn retry_check(&self) {
        if !self.engine.should_retry_fetch().await {
            debug!("retry check: nothing to do");
            return;
        }
        let retry_count = self.engine.status().await.fetch_retry_count;
        if !retry_allowed(retry_count, self.max_retries) {
            warn!(retry_count, "retry limit reached, waiting for the next scheduled fetch");
            return;
        }
        self.fetch(true).await;
    }

    async fn fetch(&self, is_retry: bool) {
        // 错误只记录，不终止 daemon
        if let Err(e) = self.engine.fetch_and_rotate(is_retry).await {
            error!("scheduled fetch failed: {e}");
        }
    }
}

/// Ctrl-C 或 SIGTERM
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
