// unsplash.rs — Unsplash API 异步客户端模块
// 负责与 Unsplash API 交互：随机获取壁纸和下载图片
//
// 注意：根据 Unsplash API Guidelines，每次实际下载图片前
// 必须先调用 /photos/:id/download 触发下载统计。

use super::{ImageMeta, ImageSource, SourceError, SourceKind, API_TIMEOUT};
use crate::config::SourcePreferences;
use async_trait::async_trait;
use serde::Deserialize; // 反序列化 trait，用于将 JSON 转为 Rust 结构体
use std::path::{Path, PathBuf};

/// Unsplash 单次随机请求最多返回 30 张
const MAX_PER_REQUEST: usize = 30;

/// 单张图片的数据结构
#[derive(Deserialize, Debug)]
pub struct Photo {
    /// 图片唯一标识符（如 "LBI7cgq3pbM"）
    pub id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub alt_description: Option<String>,
    /// 各尺寸图片 URL 集合
    pub urls: PhotoUrls,
    pub links: PhotoLinks,
    pub user: User,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// 图片 URL 集合
/// Unsplash 提供多种尺寸，raw 为原始无损图片
#[derive(Deserialize, Debug)]
pub struct PhotoUrls {
    pub raw: String,
}

#[derive(Deserialize, Debug)]
pub struct PhotoLinks {
    /// 图片在 Unsplash 上的页面
    #[serde(default)]
    pub html: String,
}

#[derive(Deserialize, Debug)]
pub struct User {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub links: UserLinks,
}

#[derive(Deserialize, Debug, Default)]
pub struct UserLinks {
    #[serde(default)]
    pub html: String,
}

#[derive(Deserialize, Debug)]
pub struct Tag {
    #[serde(default)]
    pub title: String,
}

/// 触发下载统计后返回的响应结构
#[derive(Deserialize, Debug)]
struct DownloadResponse {
    /// 实际可下载的图片 URL
    url: String,
}

/// Unsplash API 异步客户端
///
/// Access Key 通过 `Authorization: Client-ID <key>` header 传递。
pub struct UnsplashClient {
    /// HTTP 客户端（内部有连接池，应复用）
    client: reqwest::Client,
    base_url: String,
    access_key: Option<String>,
    prefs: SourcePreferences,
    custom_query: Option<String>,
}

impl UnsplashClient {
    pub fn new(
        client: reqwest::Client,
        access_key: Option<String>,
        prefs: SourcePreferences,
        custom_query: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: String::from("https://api.unsplash.com"),
            access_key,
            prefs,
            custom_query,
        }
    }

    /// 构建带 Authorization header 的请求
    /// Unsplash 使用 "Client-ID <key>" 格式，而非 Bearer token
    fn auth_header(&self) -> Result<String, SourceError> {
        let key = self
            .access_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(SourceError::MissingCredential(SourceKind::Unsplash))?;
        Ok(format!("Client-ID {}", key))
    }

    /// 构建随机接口的查询参数
    /// 配置了 collections 时按合集取图，否则按关键词取图
    fn random_params(&self, count: usize) -> Vec<(&'static str, String)> {
        let orientation = self
            .prefs
            .orientation
            .clone()
            .unwrap_or_else(|| "landscape".to_string());

        let mut params = vec![
            ("count", count.min(MAX_PER_REQUEST).to_string()),
            ("orientation", orientation),
            ("content_filter", "low".to_string()),
        ];

        if self.prefs.collections.is_empty() {
            let query = super::search_query(
                self.custom_query.as_deref(),
                &self.prefs,
                "wallpaper nature landscape",
            );
            params.push(("query", query));
        } else {
            params.push(("collections", self.prefs.collections.join(",")));
        }
        params
    }

    fn normalize(photo: Photo) -> ImageMeta {
        let mut meta = ImageMeta::remote(SourceKind::Unsplash, photo.id, photo.urls.raw);
        meta.photographer = photo.user.name;
        meta.photographer_url = photo.user.links.html;
        meta.page_url = photo.links.html;
        meta.description = photo
            .description
            .or(photo.alt_description)
            .unwrap_or_default();
        meta.width = photo.width;
        meta.height = photo.height;
        meta.tags = photo
            .tags
            .into_iter()
            .map(|t| t.title)
            .filter(|t| !t.is_empty())
            .collect();
        meta
    }
}

#[async_trait]
impl ImageSource for UnsplashClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Unsplash
    }

    async fn fetch(&self, count: usize) -> Result<Vec<ImageMeta>, SourceError> {
        let auth = self.auth_header()?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let url = format!("{}/photos/random", self.base_url);
        let photos: Vec<Photo> = self
            .client
            .get(&url)
            .header("Authorization", auth)
            .query(&self.random_params(count))
            .timeout(API_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(photos.into_iter().take(count).map(Self::normalize).collect())
    }

    async fn download(&self, meta: &ImageMeta, dest_dir: &Path) -> Result<PathBuf, SourceError> {
        // 第一步：调用 download 端点触发 Unsplash 下载统计（API Guidelines 强制要求）
        // 同时获取带签名的真实下载 URL
        let auth = self.auth_header()?;
        let location = format!("{}/photos/{}/download", self.base_url, meta.id);
        let signed: Option<DownloadResponse> = match self
            .client
            .get(&location)
            .header("Authorization", auth)
            .timeout(API_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(response) => response.json().await.ok(),
            Err(e) => {
                tracing::debug!("unsplash download tracking failed: {e}");
                None
            }
        };

        // 第二步：用统计接口返回的 URL 下载实际图片
        // 降级：统计接口失败时直接用 raw URL 下载
        match signed {
            Some(dl) => {
                let dest = dest_dir.join(format!("{}.jpg", meta.file_stem()));
                super::download_to(&self.client, &dl.url, dest).await
            }
            None => super::download_remote(&self.client, meta, dest_dir).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(prefs: SourcePreferences, key: Option<&str>) -> UnsplashClient {
        UnsplashClient::new(reqwest::Client::new(), key.map(String::from), prefs, None)
    }

    #[tokio::test]
    async fn fetch_without_key_reports_missing_credential() {
        let err = client(SourcePreferences::default(), None).fetch(3).await.unwrap_err();
        assert!(matches!(err, SourceError::MissingCredential(SourceKind::Unsplash)));
    }

    #[test]
    fn random_params_use_collections_when_configured() {
        let prefs = SourcePreferences {
            collections: vec!["317099".into(), "1065976".into()],
            ..Default::default()
        };
        let params = client(prefs, Some("k")).random_params(50);
        assert!(params.contains(&("collections", "317099,1065976".to_string())));
        assert!(params.contains(&("count", "30".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "query"));
    }

    #[test]
    fn normalize_maps_user_and_tags() {
        let json = r#"{
            "id": "LBI7cgq3pbM",
            "width": 5245,
            "height": 3497,
            "description": null,
            "alt_description": "a lake at dusk",
            "urls": { "raw": "https://images.unsplash.com/photo-1?ixid=1", "full": "https://x" },
            "links": { "html": "https://unsplash.com/photos/LBI7cgq3pbM" },
            "user": { "name": "Gilbert Kane", "links": { "html": "https://unsplash.com/@poorkane" } },
            "tags": [ { "title": "lake" }, { "title": "" } ]
        }"#;
        let photo: Photo = serde_json::from_str(json).unwrap();
        let meta = UnsplashClient::normalize(photo);
        assert_eq!(meta.photographer, "Gilbert Kane");
        assert_eq!(meta.description, "a lake at dusk");
        assert_eq!(meta.tags, vec!["lake".to_string()]);
        assert_eq!(meta.download_url.as_deref(), Some("https://images.unsplash.com/photo-1?ixid=1"));
    }
}
