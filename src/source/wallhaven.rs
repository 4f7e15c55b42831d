// wallhaven.rs — Wallhaven API 异步客户端模块
// 负责与 Wallhaven API 交互：搜索壁纸和下载图片

use super::{ImageMeta, ImageSource, SourceError, SourceKind, API_TIMEOUT};
use crate::config::SourcePreferences;
use async_trait::async_trait;
use serde::Deserialize; // 反序列化 trait，用于将 JSON 转为 Rust 结构体
use std::path::{Path, PathBuf}; // 路径的不可变借用类型（Borrowed），用于函数参数

/// Wallhaven API 搜索响应的顶层结构
///
/// 字段名必须与 JSON 的 key 完全匹配，多余的字段会被 serde 自动忽略
#[derive(Deserialize, Debug)]
pub struct SearchResponse {
    /// 搜索结果列表
    /// Wallhaven API 每页最多返回 24 条结果
    pub data: Vec<Wallpaper>,
}

/// 单张壁纸的数据结构
#[derive(Deserialize, Debug)]
pub struct Wallpaper {
    /// 壁纸唯一标识符（如 "94x38z"）
    pub id: String,

    /// 壁纸在 Wallhaven 上的页面
    #[serde(default)]
    pub url: String,

    /// 壁纸原图的直接下载 URL
    /// 格式如：https://w.wallhaven.cc/full/94/wallhaven-94x38z.jpg
    pub path: String,

    #[serde(default)]
    pub dimension_x: u32,
    #[serde(default)]
    pub dimension_y: u32,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub uploader: Option<Uploader>,
}

#[derive(Deserialize, Debug)]
pub struct Uploader {
    pub username: String,
}

/// Wallhaven API 异步客户端
///
/// API Key 可选，只有访问 NSFW 内容时才需要
pub struct WallhavenClient {
    /// HTTP 客户端（内部有连接池，应复用）
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    prefs: SourcePreferences,
    custom_query: Option<String>,
}

impl WallhavenClient {
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        prefs: SourcePreferences,
        custom_query: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: String::from("https://wallhaven.cc/api/v1"),
            api_key,
            prefs,
            custom_query,
        }
    }

    /// 构建搜索参数
    /// categories / purity 是 Wallhaven 特有的三位开关字符串（如 "111"、"100"）
    fn search_params(&self) -> Vec<(&'static str, String)> {
        let categories = self.prefs.categories.first().cloned().unwrap_or_else(|| "100".to_string());
        let purity = self.prefs.purity.clone().unwrap_or_else(|| "100".to_string());
        let atleast = self.prefs.resolution.clone().unwrap_or_else(|| "1920x1080".to_string());

        let mut params = vec![
            ("categories", categories),
            ("purity", purity),
            ("sorting", "random".to_string()),
            ("atleast", atleast),
            ("ratios", "landscape".to_string()),
        ];

        // Wallhaven 不需要 "wallpaper" 后缀，直接使用主题词
        let query = self
            .custom_query
            .clone()
            .or_else(|| self.prefs.query.clone())
            .or_else(|| self.prefs.theme.clone())
            .filter(|q| !q.trim().is_empty());
        if let Some(q) = query {
            params.push(("q", q));
        }

        // .as_deref() 将 Option<String> 转为 Option<&str>
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            params.push(("apikey", key.to_string()));
        }
        params
    }

    fn normalize(w: Wallpaper) -> ImageMeta {
        let mut meta = ImageMeta::remote(SourceKind::Wallhaven, w.id, w.path);
        meta.page_url = w.url;
        meta.width = w.dimension_x;
        meta.height = w.dimension_y;
        meta.description = w.category;
        if let Some(uploader) = w.uploader {
            meta.photographer_url = format!("https://wallhaven.cc/user/{}", uploader.username);
            meta.photographer = uploader.username;
        }
        meta
    }
}

#[async_trait]
impl ImageSource for WallhavenClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Wallhaven
    }

    async fn fetch(&self, count: usize) -> Result<Vec<ImageMeta>, SourceError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let url = format!("{}/search", self.base_url);
        let response: SearchResponse = self
            .client
            .get(&url)
            .query(&self.search_params())
            .timeout(API_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .data
            .into_iter()
            .take(count)
            .map(Self::normalize)
            .collect())
    }

    async fn download(&self, meta: &ImageMeta, dest_dir: &Path) -> Result<PathBuf, SourceError> {
        super::download_remote(&self.client, meta, dest_dir).await
    }
}
