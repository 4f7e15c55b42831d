// pixabay.rs — Pixabay API 异步客户端模块

use super::{ImageMeta, ImageSource, SourceError, SourceKind, API_TIMEOUT};
use crate::config::SourcePreferences;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Pixabay 的 per_page 取值范围是 3..=200
const MIN_PER_PAGE: usize = 3;
const MAX_PER_PAGE: usize = 200;

#[derive(Deserialize, Debug)]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Hit {
    pub id: u64,
    #[serde(default, rename = "pageURL")]
    pub page_url: String,
    /// 逗号分隔的标签，如 "sea, beach, sunset"
    #[serde(default)]
    pub tags: String,
    #[serde(default, rename = "largeImageURL")]
    pub large_image_url: Option<String>,
    #[serde(default, rename = "webformatURL")]
    pub webformat_url: Option<String>,
    #[serde(default)]
    pub image_width: u32,
    #[serde(default)]
    pub image_height: u32,
    #[serde(default)]
    pub user: String,
    #[serde(default, rename = "user_id")]
    pub user_id: u64,
}

/// Pixabay API 异步客户端，API Key 通过查询参数 `key` 传递
pub struct PixabayClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    prefs: SourcePreferences,
    custom_query: Option<String>,
}

impl PixabayClient {
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        prefs: SourcePreferences,
        custom_query: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: String::from("https://pixabay.com/api/"),
            api_key,
            prefs,
            custom_query,
        }
    }

    fn search_params(&self, key: &str, count: usize) -> Vec<(&'static str, String)> {
        let per_page = count.clamp(MIN_PER_PAGE, MAX_PER_PAGE);
        let mut params = vec![
            ("key", key.to_string()),
            ("image_type", "photo".to_string()),
            ("orientation", "horizontal".to_string()),
            ("min_width", "1920".to_string()),
            ("min_height", "1080".to_string()),
            ("per_page", per_page.to_string()),
            ("safesearch", self.prefs.safe_search.unwrap_or(true).to_string()),
            ("order", "popular".to_string()),
        ];

        // Pixabay 的 q 直接使用主题词，不追加 "wallpaper"
        let query = self
            .custom_query
            .clone()
            .or_else(|| self.prefs.query.clone())
            .or_else(|| self.prefs.theme.clone())
            .filter(|q| !q.trim().is_empty());
        if let Some(q) = query {
            params.push(("q", q));
        }

        if !self.prefs.categories.is_empty() {
            params.push(("category", self.prefs.categories.join(",")));
        }
        params
    }

    fn normalize(hit: Hit) -> Option<ImageMeta> {
        let download_url = hit.large_image_url.or(hit.webformat_url)?;
        let mut meta = ImageMeta::remote(SourceKind::Pixabay, hit.id.to_string(), download_url);
        meta.photographer_url = format!("https://pixabay.com/users/{}-{}", hit.user, hit.user_id);
        meta.photographer = hit.user;
        meta.page_url = hit.page_url;
        meta.width = hit.image_width;
        meta.height = hit.image_height;
        meta.tags = hit
            .tags
            .split(", ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        meta.description = hit.tags;
        Some(meta)
    }
}

#[async_trait]
impl ImageSource for PixabayClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Pixabay
    }

    async fn fetch(&self, count: usize) -> Result<Vec<ImageMeta>, SourceError> {
        let key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(SourceError::MissingCredential(SourceKind::Pixabay))?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let response: SearchResponse = self
            .client
            .get(&self.base_url)
            .query(&self.search_params(key, count))
            .timeout(API_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .hits
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
    fn per_page_is_clamped_to_api_range() {
        let client = PixabayClient::new(reqwest::Client::new(), None, Default::default(), None);
        let params = client.search_params("k", 1);
        assert!(params.contains(&("per_page", "3".to_string())));
        let params = client.search_params("k", 500);
        assert!(params.contains(&("per_page", "200".to_string())));
    }

    #[test]
    fn categories_are_joined() {
        let prefs = SourcePreferences {
            categories: vec!["nature".into(), "backgrounds".into()],
            safe_search: Some(false),
            ..Default::default()
        };
        let client = PixabayClient::new(reqwest::Client::new(), None, prefs, Some("fjord".into()));
        let params = client.search_params("k", 5);
        assert!(params.contains(&("category", "nature,backgrounds".to_string())));
        assert!(params.contains(&("safesearch", "false".to_string())));
        assert!(params.contains(&("q", "fjord".to_string())));
    }

    #[test]
    fn normalize_splits_tags() {
        let json = r#"{
            "id": 195893,
            "pageURL": "https://pixabay.com/en/blossom-bloom-flower-195893/",
            "tags": "blossom, bloom, flower",
            "largeImageURL": "https://pixabay.com/get/ed6a99fd0a76647_1280.jpg",
            "imageWidth": 4000,
            "imageHeight": 2250,
            "user": "Josch13",
            "user_id": 48777
        }"#;
        let hit: Hit = serde_json::from_str(json).unwrap();
        let meta = PixabayClient::normalize(hit).unwrap();
        assert_eq!(meta.tags, vec!["blossom", "bloom", "flower"]);
        assert_eq!(meta.photographer_url, "https://pixabay.com/users/Josch13-48777");
        assert_eq!(meta.width, 4000);
    }
}
