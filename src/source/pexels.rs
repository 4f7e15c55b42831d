// pexels.rs — Pexels API 异步客户端模块

use super::{ImageMeta, ImageSource, SourceError, SourceKind, API_TIMEOUT};
use crate::config::SourcePreferences;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Pexels 每页最多 80 条
const MAX_PER_PAGE: usize = 80;

#[derive(Deserialize, Debug)]
pub struct SearchResponse {
    #[serde(default)]
    pub photos: Vec<Photo>,
}

#[derive(Deserialize, Debug)]
pub struct Photo {
    pub id: u64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// 图片在 Pexels 上的页面
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub photographer: String,
    #[serde(default)]
    pub photographer_url: String,
    #[serde(default)]
    pub alt: String,
    pub src: PhotoSrc,
}

/// 各尺寸图片 URL，original 为原图
#[derive(Deserialize, Debug)]
pub struct PhotoSrc {
    #[serde(default)]
    pub original: Option<String>,
    #[serde(default)]
    pub large2x: Option<String>,
    #[serde(default)]
    pub large: Option<String>,
}

/// Pexels API 异步客户端
/// API Key 直接放在 Authorization header 中（无前缀）
pub struct PexelsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    prefs: SourcePreferences,
    custom_query: Option<String>,
}

impl PexelsClient {
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        prefs: SourcePreferences,
        custom_query: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: String::from("https://api.pexels.com/v1"),
            api_key,
            prefs,
            custom_query,
        }
    }

    fn normalize(photo: Photo) -> Option<ImageMeta> {
        let download_url = photo.src.original.or(photo.src.large2x).or(photo.src.large)?;
        let mut meta = ImageMeta::remote(SourceKind::Pexels, photo.id.to_string(), download_url);
        meta.photographer = photo.photographer;
        meta.photographer_url = photo.photographer_url;
        meta.page_url = photo.url;
        meta.description = if photo.alt.is_empty() {
            "Pexels Photo".to_string()
        } else {
            photo.alt
        };
        meta.width = photo.width;
        meta.height = photo.height;
        Some(meta)
    }
}

#[async_trait]
impl ImageSource for PexelsClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Pexels
    }

    async fn fetch(&self, count: usize) -> Result<Vec<ImageMeta>, SourceError> {
        let key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(SourceError::MissingCredential(SourceKind::Pexels))?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let query = super::search_query(self.custom_query.as_deref(), &self.prefs, "nature landscape");
        let orientation = self.prefs.orientation.as_deref().unwrap_or("landscape");
        let per_page = count.min(MAX_PER_PAGE).to_string();

        let url = format!("{}/search", self.base_url);
        let response: SearchResponse = self
            .client
            .get(&url)
            .header("Authorization", key)
            .query(&[
                ("query", query.as_str()),
                ("orientation", orientation),
                ("per_page", per_page.as_str()),
                ("size", "large"),
            ])
            .timeout(API_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .photos
            .into_iter()
            .filter_map(Self::normalize)
            .take(count)
            .collect())
    }

    async fn download(&self, meta: &ImageMeta, dest_dir: &Path) -> Result<PathBuf, SourceError> {
        super::download_remote(&self.client, meta, dest_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_falls_back_through_sizes() {
        let json = r#"{
            "id": 2014422,
            "width": 3024,
            "height": 3024,
            "url": "https://www.pexels.com/photo/2014422/",
            "photographer": "Joey Farina",
            "photographer_url": "https://www.pexels.com/@joey",
            "alt": "",
            "src": { "large2x": "https://images.pexels.com/2014422/large2x.jpeg" }
        }"#;
        let photo: Photo = serde_json::from_str(json).unwrap();
        let meta = PexelsClient::normalize(photo).unwrap();
        assert_eq!(meta.id, "2014422");
        assert_eq!(meta.description, "Pexels Photo");
        assert_eq!(meta.download_url.as_deref(), Some("https://images.pexels.com/2014422/large2x.jpeg"));
    }

    #[test]
    fn normalize_skips_photos_without_any_url() {
        let json = r#"{ "id": 1, "src": {} }"#;
        let photo: Photo = serde_json::from_str(json).unwrap();
        assert!(PexelsClient::normalize(photo).is_none());
    }

    #[tokio::test]
    async fn fetch_without_key_fails_before_any_request() {
        let client = PexelsClient::new(reqwest::Client::new(), Some(String::new()), Default::default(), None);
        assert!(matches!(
            client.fetch(2).await,
            Err(SourceError::MissingCredential(SourceKind::Pexels))
        ));
    }
}
