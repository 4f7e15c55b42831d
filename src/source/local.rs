// local.rs — 本地图片来源
// 扫描用户目录中满足分辨率与宽高比要求的图片，
// 返回与远程来源相同的 ImageMeta 结构（source = local）

use super::{ImageMeta, ImageSource, SourceError, SourceKind};
use crate::config::{self, SourcePreferences};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const DEFAULT_FOLDER: &str = "~/Pictures/Wallpapers";
pub const MIN_WIDTH: u32 = 1920;
/// 16:10
pub const MIN_RATIO: f64 = 1.5;
/// 略宽于 16:9
pub const MAX_RATIO: f64 = 1.9;

const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

#[derive(Debug, Clone)]
pub struct LocalImageProvider {
    folder: PathBuf,
    min_width: u32,
    min_ratio: f64,
    max_ratio: f64,
}

impl LocalImageProvider {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            min_width: MIN_WIDTH,
            min_ratio: MIN_RATIO,
            max_ratio: MAX_RATIO,
        }
    }

    pub fn from_preferences(prefs: &SourcePreferences) -> Self {
        let folder = config::resolve_user_path(prefs.folder.as_deref().unwrap_or(DEFAULT_FOLDER));
        Self::new(folder).with_constraints(
            prefs.min_width.unwrap_or(MIN_WIDTH),
            prefs.min_ratio.unwrap_or(MIN_RATIO),
            prefs.max_ratio.unwrap_or(MAX_RATIO),
        )
    }

    pub fn with_constraints(mut self, min_width: u32, min_ratio: f64, max_ratio: f64) -> Self {
        self.min_width = min_width;
        self.min_ratio = min_ratio;
        self.max_ratio = max_ratio;
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// 递归扫描目录，返回所有合格的壁纸
    pub fn scan(&self) -> Vec<ImageMeta> {
        if !self.folder.is_dir() {
            warn!("local folder does not exist: {}", self.folder.display());
            return Vec::new();
        }

        let mut scanned = 0usize;
        let mut images: Vec<ImageMeta> = WalkDir::new(&self.folder)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && is_supported_image(entry.path()))
            .filter_map(|entry| {
                scanned += 1;
                self.inspect(entry.path())
            })
            .collect();
        images.sort_by(|a, b| a.path.cmp(&b.path));

        info!("scanned {} local images, {} valid wallpapers", scanned, images.len());
        images
    }

    /// 只读取图片头部获取尺寸，检查最小宽度和宽高比
    fn inspect(&self, path: &Path) -> Option<ImageMeta> {
        let (width, height) = match image::image_dimensions(path) {
            Ok(dims) => dims,
            Err(e) => {
                warn!("failed to read {}: {e}", path.display());
                return None;
            }
        };

        if width < self.min_width || height == 0 {
            debug!("image too small: {} ({width}x{height})", path.display());
            return None;
        }
        let ratio = f64::from(width) / f64::from(height);
        if !(self.min_ratio..=self.max_ratio).contains(&ratio) {
            debug!("invalid aspect ratio: {} ({ratio:.2})", path.display());
            return None;
        }

        let mut meta = ImageMeta::local(path);
        meta.width = width;
        meta.height = height;
        Some(meta)
    }

    pub fn is_valid_wallpaper(&self, path: &Path) -> bool {
        self.inspect(path).is_some()
    }

    /// 随机选取至多 `count` 张
    pub fn random_images(&self, count: usize) -> Vec<ImageMeta> {
        let images = self.scan();
        let mut rng = rand::thread_rng();
        images
            .choose_multiple(&mut rng, count.min(images.len()))
            .cloned()
            .collect()
    }
}

pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(OsStr::to_str) {
        Some(ext) => SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

#[async_trait]
impl ImageSource for LocalImageProvider {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    async fn fetch(&self, count: usize) -> Result<Vec<ImageMeta>, SourceError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let provider = self.clone();
        let images = tokio::task::spawn_blocking(move || provider.random_images(count))
            .await
            .map_err(std::io::Error::other)?;
        info!("selected {} random local images", images.len());
        Ok(images)
    }

    /// 本地图片不需要下载，直接引用原路径
    async fn download(&self, meta: &ImageMeta, _dest_dir: &Path) -> Result<PathBuf, SourceError> {
        let path = meta
            .resolved_path()
            .ok_or_else(|| SourceError::MissingDownloadUrl(meta.id.clone()))?;
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} no longer exists", path.display()),
            )
            .into());
        }
        Ok(path.to_path_buf())
    }

    async fn test_connection(&self) -> Result<String, SourceError> {
        let provider = self.clone();
        let count = tokio::task::spawn_blocking(move || provider.scan().len())
            .await
            .map_err(std::io::Error::other)?;
        if count == 0 {
            return Err(SourceError::Empty(SourceKind::Local));
        }
        Ok(format!("{} valid wallpapers in {}", count, self.folder.display()))
    }
}
