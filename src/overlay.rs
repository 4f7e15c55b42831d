// overlay.rs — 署名叠加
// 图片合成不在本程序内完成：把原图、输出路径和署名文字交给外部命令处理

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::OverlayConfig;
use crate::setter::{CommandRunner, SetterError, SystemRunner};
use crate::source::ImageMeta;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("overlay command is not configured")]
    NotConfigured,

    #[error(transparent)]
    Command(#[from] SetterError),

    #[error("overlay command produced no output at {}", .0.display())]
    NoOutput(PathBuf),
}

/// 在图片上添加署名，返回新图片路径
#[async_trait]
pub trait AttributionOverlay: Send + Sync {
    async fn apply(&self, image: &Path, meta: &ImageMeta) -> Result<PathBuf, OverlayError>;
}

/// 署名文字
pub fn attribution_text(meta: &ImageMeta) -> String {
    if meta.source.is_local() {
        return String::from("Your personal wallpaper");
    }
    let photographer = if meta.photographer.trim().is_empty() {
        "Unknown"
    } else {
        meta.photographer.trim()
    };
    format!("Photo by {} from {}", photographer, meta.source.display_name())
}

/// `<stem>-overlay.<ext>`，与原图在同一目录
pub fn overlay_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("image"));
    let name = match image.extension() {
        Some(ext) => format!("{stem}-overlay.{}", ext.to_string_lossy()),
        None => format!("{stem}-overlay"),
    };
    image.with_file_name(name)
}

/// 调用外部程序完成叠加
///
/// args 中的 `{input}`、`{output}`、`{text}` 会被替换
pub struct CommandOverlay {
    runner: Arc<dyn CommandRunner>,
    program: String,
    args: Vec<String>,
}

impl CommandOverlay {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            runner,
            program: program.into(),
            args,
        }
    }

    /// 根据 `[overlay]` 配置构建；未启用时返回 None
    pub fn from_config(config: &OverlayConfig) -> Result<Option<Self>, OverlayError> {
        if !config.enabled {
            return Ok(None);
        }
        let program = config
            .command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or(OverlayError::NotConfigured)?;
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        Ok(Some(Self::new(
            Arc::new(SystemRunner::with_timeout(timeout)),
            program,
            config.args.clone(),
        )))
    }

    fn render_args(&self, input: &Path, output: &Path, text: &str) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{output}", &output)
                    .replace("{text}", text)
            })
            .collect()
    }
}

#[async_trait]
impl AttributionOverlay for CommandOverlay {
    async fn apply(&self, image: &Path, meta: &ImageMeta) -> Result<PathBuf, OverlayError> {
        let output = overlay_path(image);
        let args = self.render_args(image, &output, &attribution_text(meta));
        debug!(program = %self.program, "applying attribution overlay");

        self.runner.run(&self.program, &args).await?.check(&self.program)?;

        if !output.is_file() {
            return Err(OverlayError::NoOutput(output));
        }
        Ok(output)
    }
}
