// state.rs — 轮换状态的持久化
// 状态文件整体读写；写入时先写临时文件再 rename，读者永远看不到半截文件

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::source::ImageMeta;

/// 持久化的轮换状态
///
/// 缺失的字段取默认值，未知字段被忽略
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RotationState {
    #[serde(alias = "current_index")]
    pub current_index: usize,
    pub images: Vec<ImageMeta>,
    #[serde(alias = "fetch_retry_count")]
    pub fetch_retry_count: u32,
    #[serde(
        alias = "last_fetch_attempt",
        with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_fetch_attempt: Option<DateTime<Local>>,
}

impl RotationState {
    /// 当前指向的图片
    pub fn current(&self) -> Option<&ImageMeta> {
        self.images.get(self.current_index)
    }

    /// 替换整批图片，索引归零
    pub fn replace_images(&mut self, images: Vec<ImageMeta>) {
        self.images = images;
        self.current_index = 0;
    }

    /// 保证 `current_index < images.len()`（列表非空时）
    fn normalize(&mut self) {
        if self.current_index >= self.images.len().max(1) {
            debug!(index = self.current_index, len = self.images.len(), "resetting stale index");
            self.current_index = 0;
        }
    }
}

/// ISO-8601 时间戳；兼容不带时区偏移的旧格式
mod timestamp {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Local>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => s.serialize_some(&t.to_rfc3339()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Local>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        Ok(raw.as_deref().and_then(parse))
    }

    pub fn parse(s: &str) -> Option<DateTime<Local>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Local));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to encode rotation state: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 状态文件的读写
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 读取状态；文件缺失或损坏时返回空状态
    pub fn load(&self) -> RotationState {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return RotationState::default(),
            Err(e) => {
                warn!("failed to read {}: {e}", self.path.display());
                return RotationState::default();
            }
        };

        match serde_json::from_str::<RotationState>(&content) {
            Ok(mut state) => {
                state.normalize();
                state
            }
            Err(e) => {
                warn!("rotation state {} is corrupt, starting fresh: {e}", self.path.display());
                RotationState::default()
            }
        }
    }

    pub fn save(&self, state: &RotationState) -> Result<(), StateError> {
        let json = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &json).map_err(|source| StateError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// 原子写入：在同一目录下写临时文件，再 rename 覆盖目标
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
