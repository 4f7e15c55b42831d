// rotator.rs — 轮换引擎
// 串联抓取器与壁纸设置器，维护持久化的轮换状态。
// 每个操作都先从磁盘重新读取状态，再整体写回，
// 这样 CLI 调用与后台 daemon 能看到彼此的修改。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::{self, ConfigProvider};
use crate::fetcher::ImageFetcher;
use crate::setter::{SetterError, WallpaperSetter};
use crate::source::ImageMeta;
use crate::state::{RotationState, StateError, StateStore};

/// 失败后至少间隔这么久（小时）才再次自动重试
pub const RETRY_INTERVAL_HOURS: i64 = 1;

const DEFAULT_IMAGES_PER_DAY: usize = 5;
const DEFAULT_KEEP_DAYS: u32 = 7;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no images could be fetched from any source (failed attempts: {retry_count})")]
    EmptyBatch { retry_count: u32 },

    #[error("no images available; run `wallspin fetch` first")]
    NoImages,

    #[error("image {0} has no local file")]
    NoPath(String),

    #[error("image file is missing: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("failed to set wallpaper: {0}")]
    Set(#[from] SetterError),

    #[error(transparent)]
    State(#[from] StateError),
}

/// `status` 命令展示的快照
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub image_count: usize,
    pub current_index: usize,
    pub current: Option<ImageMeta>,
    pub fetch_retry_count: u32,
    pub last_fetch_attempt: Option<DateTime<Local>>,
}

pub struct RotationEngine {
    config: Arc<dyn ConfigProvider>,
    fetcher: ImageFetcher,
    setter: Arc<dyn WallpaperSetter>,
    store: StateStore,
    state: Mutex<RotationState>,
    /// 同一进程内最多只有一个 fetch_and_rotate 在执行
    fetch_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl RotationEngine {
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        fetcher: ImageFetcher,
        setter: Arc<dyn WallpaperSetter>,
        store: StateStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = store.load();
        Self {
            config,
            fetcher,
            setter,
            store,
            state: Mutex::new(state),
            fetch_lock: Mutex::new(()),
            clock,
        }
    }

    pub fn fetcher(&self) -> &ImageFetcher {
        &self.fetcher
    }

    /// 抓取新的一批图片并设置第一张
    pub async fn fetch_and_rotate(&self, is_retry: bool) -> Result<(), EngineError> {
        let _guard = self.fetch_lock.lock().await;
        let attempted_at = self.clock.now();
        let target = self
            .config
            .as_ref()
            .preference_or(config::keys::IMAGES_PER_DAY, DEFAULT_IMAGES_PER_DAY);

        if is_retry {
            info!("retrying fetch of {target} images");
        } else {
            info!("fetching {target} images");
        }

        // 下载期间不持有状态锁，next/previous 仍可用
        let batch = self.fetcher.fetch_batch(target).await;

        let mut state = self.state.lock().await;
        *state = self.store.load();
        state.last_fetch_attempt = Some(attempted_at);

        if batch.is_empty() {
            state.fetch_retry_count += 1;
            let retry_count = state.fetch_retry_count;
            self.store.save(&state)?;
            warn!(retry_count, "fetch produced no images");
            return Err(EngineError::EmptyBatch { retry_count });
        }

        state.fetch_retry_count = 0;
        let count = batch.len();
        state.replace_images(batch);
        let result = self.set_current_locked(&state).await;
        self.store.save(&state)?;
        drop(state);

        if result.is_ok() {
            if is_retry {
                info!("retry succeeded, {count} new wallpapers");
            } else {
                info!("fetched and set {count} new wallpapers");
            }
        }
        self.cleanup_if_enabled();
        result
    }

    fn cleanup_if_enabled(&self) {
        let prefs = self.config.as_ref();
        if prefs.preference_or(config::keys::AUTO_DELETE_OLD, true) {
            let keep_days = prefs.preference_or(config::keys::KEEP_DAYS, DEFAULT_KEEP_DAYS);
            self.fetcher.cleanup_old_images(keep_days);
        }
    }

    pub async fn next(&self) -> Result<(), EngineError> {
        self.step(Direction::Forward).await
    }

    pub async fn previous(&self) -> Result<(), EngineError> {
        self.step(Direction::Backward).await
    }

    /// 索引前进/后退（循环），然后设置壁纸
    ///
    /// 设置失败时新索引仍会保存，下一次 next/previous 能越过缺失的图片
    async fn step(&self, direction: Direction) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        *state = self.store.load();

        if state.images.is_empty() {
            let today = self.fetcher.today_images();
            if today.is_empty() {
                return Err(EngineError::NoImages);
            }
            info!("reloaded {} images from today's batch", today.len());
            state.replace_images(today);
        }

        let len = state.images.len();
        state.current_index = match direction {
            Direction::Forward => (state.current_index + 1) % len,
            Direction::Backward => (state.current_index + len - 1) % len,
        };

        let result = self.set_current_locked(&state).await;
        self.store.save(&state)?;
        result
    }

    /// 把当前索引指向的图片设为壁纸，不修改状态
    pub async fn set_current(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        *state = self.store.load();
        self.set_current_locked(&state).await
    }

    async fn set_current_locked(&self, state: &RotationState) -> Result<(), EngineError> {
        let meta = state.current().ok_or(EngineError::NoImages)?;
        let path = meta
            .resolved_path()
            .ok_or_else(|| EngineError::NoPath(meta.id.clone()))?;
        if !path.exists() {
            warn!("current image vanished: {}", path.display());
            return Err(EngineError::MissingFile(path.to_path_buf()));
        }
        self.setter.set(path).await?;
        Ok(())
    }

    /// 直接设置任意本地图片，不修改轮换状态
    pub async fn set_specific(&self, path: &Path) -> Result<(), EngineError> {
        if !path.is_file() {
            return Err(EngineError::MissingFile(path.to_path_buf()));
        }
        self.setter.set(path).await?;
        Ok(())
    }

    /// 是否应该自动重试抓取
    ///
    /// 从未尝试过 ⇒ 是；已有图片且没有失败记录 ⇒ 否；
    /// 否则距离上次尝试满一小时才重试
    pub async fn should_retry_fetch(&self) -> bool {
        let mut state = self.state.lock().await;
        *state = self.store.load();

        let Some(last) = state.last_fetch_attempt else {
            return true;
        };
        if !state.images.is_empty() && state.fetch_retry_count == 0 {
            return false;
        }
        self.clock.now() - last >= chrono::Duration::hours(RETRY_INTERVAL_HOURS)
    }

    pub async fn current(&self) -> Option<ImageMeta> {
        let mut state = self.state.lock().await;
        *state = self.store.load();
        state.current().cloned()
    }

    pub async fn status(&self) -> EngineStatus {
        let mut state = self.state.lock().await;
        *state = self.store.load();
        EngineStatus {
            image_count: state.images.len(),
            current_index: state.current_index,
            current: state.current().cloned(),
            fetch_retry_count: state.fetch_retry_count,
            last_fetch_attempt: state.last_fetch_attempt,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}
