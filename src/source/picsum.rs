// picsum.rs — Lorem Picsum 随机图片来源
// 不需要任何 API Key，默认启用，作为兜底来源

use super::{ImageMeta, ImageSource, SourceError, SourceKind};
use crate::config::SourcePreferences;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const DEFAULT_WIDTH: u32 = 1920;
const DEFAULT_HEIGHT: u32 = 1080;

pub struct PicsumClient {
    client: reqwest::Client,
    base_url: String,
    width: u32,
    height: u32,
}

impl PicsumClient {
    pub fn new(client: reqwest::Client, prefs: SourcePreferences) -> Self {
        let (width, height) = prefs
            .resolution
            .as_deref()
            .and_then(parse_resolution)
            .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT));
        Self {
            client,
            base_url: String::from("https://picsum.photos"),
            width,
            height,
        }
    }

    /// 每个 URL 带上不同的 random 参数，避免 CDN 返回同一张图
    fn image_url(&self, nonce: u32, index: usize) -> String {
        format!(
            "{}/{}/{}?random={}-{}",
            self.base_url, self.width, self.height, nonce, index
        )
    }
}

#[async_trait]
impl ImageSource for PicsumClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Picsum
    }

    async fn fetch(&self, count: usize) -> Result<Vec<ImageMeta>, SourceError> {
        let nonce: u32 = rand::random();
        Ok((0..count)
            .map(|i| {
                let mut meta = ImageMeta::remote(
                    SourceKind::Picsum,
                    format!("{nonce:08x}-{}", i + 1),
                    self.image_url(nonce, i),
                );
                meta.photographer = String::from("Lorem Picsum");
                meta.photographer_url = self.base_url.clone();
                meta.page_url = self.base_url.clone();
                meta.description = String::from("Random photo");
                meta.width = self.width;
                meta.height = self.height;
                meta
            })
            .collect())
    }

    async fn download(&self, meta: &ImageMeta, dest_dir: &Path) -> Result<PathBuf, SourceError> {
        super::download_remote(&self.client, meta, dest_dir).await
    }

    async fn test_connection(&self) -> Result<String, SourceError> {
        let url = format!("{}/{}/{}", self.base_url, 16, 9);
        self.client
            .get(&url)
            .timeout(super::API_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(String::from("Picsum is reachable"))
    }
}

/// 解析 "WxH" 格式的分辨率字符串
/// 解析失败时返回 None
pub(crate) fn parse_resolution(resolution: &str) -> Option<(u32, u32)> {
    let (w, h) = resolution.split_once(['x', 'X'])?;
    let w = w.trim().parse::<u32>().ok()?;
    let h = h.trim().parse::<u32>().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}
