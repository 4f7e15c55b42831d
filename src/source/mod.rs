// source/mod.rs — 壁纸源模块入口
// 定义所有图片来源（远程 API 与本地目录）必须实现的通用 Trait，
// 以及统一的图片元数据结构 ImageMeta

pub mod local;
pub mod pexels;
pub mod picsum;
pub mod pixabay;
pub mod unsplash;
pub mod wallhaven;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait; // 异步 Trait 支持宏
use serde::{Deserialize, Serialize};
use tokio::fs::File; // tokio 提供的异步文件操作
use tokio::io::AsyncWriteExt; // 异步写入 trait，提供 write_all() 等方法
use tracing::debug;

use crate::config::ConfigProvider;

/// API 请求超时
pub const API_TIMEOUT: Duration = Duration::from_secs(10);
/// 图片下载超时
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("wallspin/", env!("CARGO_PKG_VERSION"));

/// 图片来源种类
///
/// 数组 `ALL` 的顺序即分配算法的遍历顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Unsplash,
    Wallhaven,
    Pexels,
    Pixabay,
    Picsum,
    Local,
}

impl SourceKind {
    pub const ALL: [SourceKind; 6] = [
        SourceKind::Unsplash,
        SourceKind::Wallhaven,
        SourceKind::Pexels,
        SourceKind::Pixabay,
        SourceKind::Picsum,
        SourceKind::Local,
    ];

    /// 配置文件与元数据中使用的名称
    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Unsplash => "unsplash",
            SourceKind::Wallhaven => "wallhaven",
            SourceKind::Pexels => "pexels",
            SourceKind::Pixabay => "pixabay",
            SourceKind::Picsum => "picsum",
            SourceKind::Local => "local",
        }
    }

    /// 展示给用户的名称（用于署名文字）
    pub fn display_name(self) -> &'static str {
        match self {
            SourceKind::Unsplash => "Unsplash",
            SourceKind::Wallhaven => "Wallhaven",
            SourceKind::Pexels => "Pexels",
            SourceKind::Pixabay => "Pixabay",
            SourceKind::Picsum => "Picsum",
            SourceKind::Local => "Local",
        }
    }

    pub fn is_local(self) -> bool {
        self == SourceKind::Local
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceKind {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.name() == lower)
            .ok_or(SourceError::UnknownSource(lower))
    }
}

/// 统一的图片元数据结构
/// 不论来自哪个壁纸站或本地目录，都转换成这个结构体供上层使用
///
/// 远程图片以 `download_url` 为准，本地图片以 `path` 为准；
/// `local_path` 只有在下载（或本地引用）成功后才会填充。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMeta {
    /// 图片在来源站内的 ID
    #[serde(default)]
    pub id: String,
    pub source: SourceKind,
    #[serde(default)]
    pub photographer: String,
    #[serde(default, alias = "photographer_url")]
    pub photographer_url: String,
    /// 图片在来源站上的页面地址
    #[serde(default, alias = "page_url", alias = "image_url")]
    pub page_url: String,
    #[serde(default, alias = "download_url", skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "local_path", skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

/// 图片的权威来源位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin<'a> {
    Remote(&'a str),
    Local(&'a Path),
}

impl ImageMeta {
    /// 创建远程图片记录
    pub fn remote(source: SourceKind, id: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source,
            photographer: String::new(),
            photographer_url: String::new(),
            page_url: String::new(),
            download_url: Some(download_url.into()),
            path: None,
            description: String::new(),
            width: 0,
            height: 0,
            tags: Vec::new(),
            local_path: None,
        }
    }

    /// 创建本地图片记录，本地文件本身就是 local_path
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: stem.clone(),
            source: SourceKind::Local,
            photographer: String::from("You"),
            photographer_url: String::new(),
            page_url: String::new(),
            download_url: None,
            path: Some(path.clone()),
            description: stem,
            width: 0,
            height: 0,
            tags: Vec::new(),
            local_path: Some(path),
        }
    }

    pub fn origin(&self) -> Option<ImageOrigin<'_>> {
        if self.source.is_local() {
            self.path.as_deref().map(ImageOrigin::Local)
        } else {
            self.download_url.as_deref().map(ImageOrigin::Remote)
        }
    }

    /// 解析出可设置为壁纸的本地文件路径
    pub fn resolved_path(&self) -> Option<&Path> {
        self.local_path.as_deref().or(self.path.as_deref())
    }

    /// 下载文件使用的基础文件名（不含扩展名）
    pub fn file_stem(&self) -> String {
        let id: String = self
            .id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{}-{}", self.source, if id.is_empty() { "image" } else { &id })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("unknown image source: {0}")]
    UnknownSource(String),

    #[error("{0} is enabled but no credential is configured")]
    MissingCredential(SourceKind),

    #[error("image {0} has no download url")]
    MissingDownloadUrl(String),

    #[error("{0} returned no images")]
    Empty(SourceKind),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 图片来源的抽象 Trait
/// 所有的壁纸站客户端以及本地目录扫描器都实现这个 Trait
#[async_trait]
pub trait ImageSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// 请求 `count` 张图片，返回统一的 ImageMeta 列表（可能少于 count）
    async fn fetch(&self, count: usize) -> Result<Vec<ImageMeta>, SourceError>;

    /// 把图片保存到 `dest_dir`，返回保存后的完整路径
    async fn download(&self, meta: &ImageMeta, dest_dir: &Path) -> Result<PathBuf, SourceError>;

    /// 检查来源是否可用（凭据是否有效等），返回一段说明文字
    async fn test_connection(&self) -> Result<String, SourceError> {
        let images = self.fetch(1).await?;
        let first = images.first().ok_or(SourceError::Empty(self.kind()))?;
        Ok(format!(
            "{} is working (sample: {} by {})",
            self.kind().display_name(),
            first.id,
            if first.photographer.is_empty() { "unknown" } else { &first.photographer }
        ))
    }
}

/// 所有已构建的来源客户端
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<SourceKind, Arc<dyn ImageSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据配置构建全部内置来源
    pub fn from_config(config: &dyn ConfigProvider) -> Result<Self, SourceError> {
        let client = http_client()?;
        let mut registry = Self::new();

        registry.register(unsplash::UnsplashClient::new(
            client.clone(),
            config.api_key(SourceKind::Unsplash),
            config.source_preferences(SourceKind::Unsplash),
            config.get_preference(crate::config::keys::CUSTOM_QUERY),
        ));
        registry.register(wallhaven::WallhavenClient::new(
            client.clone(),
            config.api_key(SourceKind::Wallhaven),
            config.source_preferences(SourceKind::Wallhaven),
            config.get_preference(crate::config::keys::CUSTOM_QUERY),
        ));
        registry.register(pexels::PexelsClient::new(
            client.clone(),
            config.api_key(SourceKind::Pexels),
            config.source_preferences(SourceKind::Pexels),
            config.get_preference(crate::config::keys::CUSTOM_QUERY),
        ));
        registry.register(pixabay::PixabayClient::new(
            client.clone(),
            config.api_key(SourceKind::Pixabay),
            config.source_preferences(SourceKind::Pixabay),
            config.get_preference(crate::config::keys::CUSTOM_QUERY),
        ));
        registry.register(picsum::PicsumClient::new(
            client,
            config.source_preferences(SourceKind::Picsum),
        ));
        registry.register(local::LocalImageProvider::from_preferences(
            &config.source_preferences(SourceKind::Local),
        ));

        Ok(registry)
    }

    /// 注册（或替换）一个来源
    pub fn register(&mut self, source: impl ImageSource + 'static) {
        self.sources.insert(source.kind(), Arc::new(source));
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn ImageSource>> {
        self.sources.get(&kind).cloned()
    }
}

/// 构建带超时与 User-Agent 的 HTTP 客户端（内部有连接池，应复用）
pub fn http_client() -> Result<reqwest::Client, SourceError> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(DOWNLOAD_TIMEOUT)
        .connect_timeout(API_TIMEOUT)
        .build()?;
    Ok(client)
}

/// 从 URL 推断图片扩展名，无法判断时使用 jpg
pub(crate) fn extension_from_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "png",
        Some("webp") => "webp",
        _ => "jpg",
    }
}

/// 下载 `url` 到 `dest`
///
/// 先写入 `.part` 临时文件，完成后再重命名，避免留下半截图片
pub(crate) async fn download_to(
    client: &reqwest::Client,
    url: &str,
    dest: PathBuf,
) -> Result<PathBuf, SourceError> {
    debug!(url, dest = %dest.display(), "downloading image");

    let bytes = client
        .get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    let partial = dest.with_extension("part");
    let mut file = File::create(&partial).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    drop(file);
    tokio::fs::rename(&partial, &dest).await?;

    Ok(dest)
}

/// 远程来源共用的下载逻辑：`<source>-<id>.<ext>`
pub(crate) async fn download_remote(
    client: &reqwest::Client,
    meta: &ImageMeta,
    dest_dir: &Path,
) -> Result<PathBuf, SourceError> {
    let url = meta
        .download_url
        .as_deref()
        .ok_or_else(|| SourceError::MissingDownloadUrl(meta.id.clone()))?;
    let dest = dest_dir.join(format!("{}.{}", meta.file_stem(), extension_from_url(url)));
    download_to(client, url, dest).await
}

/// 按主题与自定义关键词拼出搜索词
/// 自定义关键词优先，其次 "<theme> wallpaper"，最后使用来源默认值
pub(crate) fn search_query(
    custom_query: Option<&str>,
    prefs: &crate::config::SourcePreferences,
    fallback: &str,
) -> String {
    if let Some(q) = custom_query.filter(|q| !q.trim().is_empty()) {
        return q.trim().to_string();
    }
    if let Some(q) = prefs.query.as_deref().filter(|q| !q.trim().is_empty()) {
        return q.trim().to_string();
    }
    match prefs.theme.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(theme) => format!("{} wallpaper", theme.trim()),
        None => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourcePreferences;

    #[test]
    fn source_kind_parses_case_insensitively() {
        assert_eq!("Unsplash".parse::<SourceKind>().unwrap(), SourceKind::Unsplash);
        assert_eq!(" local ".parse::<SourceKind>().unwrap(), SourceKind::Local);
        assert!("flickr".parse::<SourceKind>().is_err());
    }

    #[test]
    fn remote_meta_is_authoritative_by_url() {
        let meta = ImageMeta::remote(SourceKind::Pexels, "42", "https://img/x.png");
        assert_eq!(meta.origin(), Some(ImageOrigin::Remote("https://img/x.png")));
        assert!(meta.resolved_path().is_none());
    }

    #[test]
    fn local_meta_uses_its_path_as_local_path() {
        let meta = ImageMeta::local("/home/me/Pictures/lake.jpg");
        assert_eq!(meta.source, SourceKind::Local);
        assert_eq!(meta.id, "lake");
        assert_eq!(meta.origin(), Some(ImageOrigin::Local(Path::new("/home/me/Pictures/lake.jpg"))));
        assert_eq!(meta.resolved_path(), Some(Path::new("/home/me/Pictures/lake.jpg")));
    }

    #[test]
    fn meta_accepts_snake_case_fields_from_older_files() {
        let json = r#"{
            "id": "abc",
            "source": "pixabay",
            "photographer_url": "https://pixabay.com/users/x",
            "download_url": "https://cdn/abc.jpg",
            "local_path": "/tmp/pixabay-abc.jpg",
            "unexpected": true
        }"#;
        let meta: ImageMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.photographer_url, "https://pixabay.com/users/x");
        assert_eq!(meta.download_url.as_deref(), Some("https://cdn/abc.jpg"));
        assert_eq!(meta.local_path.as_deref(), Some(Path::new("/tmp/pixabay-abc.jpg")));
        assert!(meta.tags.is_empty());
    }

    #[test]
    fn file_stem_sanitizes_ids() {
        let meta = ImageMeta::remote(SourceKind::Wallhaven, "a/b c", "https://x/y.jpg");
        assert_eq!(meta.file_stem(), "wallhaven-a_b_c");
    }

    #[test]
    fn file_stem_keeps_non_ascii_names_apart() {
        let a = ImageMeta::local("/pics/山水.png");
        let b = ImageMeta::local("/pics/海洋.png");
        assert_eq!(a.file_stem(), "local-山水");
        assert_ne!(a.file_stem(), b.file_stem());
    }

    #[test]
    fn extension_is_taken_from_url_path() {
        assert_eq!(extension_from_url("https://w.wallhaven.cc/full/94/wallhaven-94x38z.png"), "png");
        assert_eq!(extension_from_url("https://images.unsplash.com/photo-1?fm=jpg&w=10"), "jpg");
        assert_eq!(extension_from_url("https://picsum.photos/1920/1080?random=3"), "jpg");
    }

    #[test]
    fn search_query_prefers_custom_then_theme() {
        let prefs = SourcePreferences {
            theme: Some("ocean".into()),
            ..Default::default()
        };
        assert_eq!(search_query(Some("cats"), &prefs, "nature"), "cats");
        assert_eq!(search_query(None, &prefs, "nature"), "ocean wallpaper");
        assert_eq!(search_query(Some("  "), &SourcePreferences::default(), "nature"), "nature");
    }
}
