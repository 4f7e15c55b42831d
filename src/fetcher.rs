// fetcher.rs — 图片抓取与保存
// 调用分配器决定每个来源的数量，下载到按日期划分的目录，
// 并在图片旁写一份同名 JSON 元数据

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::ConfigProvider;
use crate::distributor;
use crate::overlay::AttributionOverlay;
use crate::source::{ImageMeta, ImageSource, SourceKind, SourceRegistry};
use crate::state;

const DAY_FORMAT: &str = "%Y-%m-%d";

pub struct ImageFetcher {
    config: Arc<dyn ConfigProvider>,
    registry: SourceRegistry,
    overlay: Option<Arc<dyn AttributionOverlay>>,
    images_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl ImageFetcher {
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        registry: SourceRegistry,
        images_dir: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            registry,
            overlay: None,
            images_dir: images_dir.into(),
            clock,
        }
    }

    pub fn with_overlay(mut self, overlay: Arc<dyn AttributionOverlay>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// 今天的批次目录 `<images_dir>/YYYY-MM-DD`
    pub fn today_dir(&self) -> PathBuf {
        self.images_dir
            .join(self.clock.now().date_naive().format(DAY_FORMAT).to_string())
    }

    /// 抓取一批图片
    ///
    /// 单个来源失败只记录日志并跳过，返回成功的部分（可能为空）
    pub async fn fetch_batch(&self, target: usize) -> Vec<ImageMeta> {
        if target == 0 {
            return Vec::new();
        }
        let day_dir = self.today_dir();
        if let Err(e) = fs::create_dir_all(&day_dir) {
            warn!("failed to create {}: {e}", day_dir.display());
            return Vec::new();
        }

        let sources = self.config.source_configs();
        if distributor::local_missing_weight(&sources) {
            warn!("local source is enabled but has no weight, it will receive no images");
        }
        let local_count = distributor::local_share(target, &sources);
        let plan = distributor::distribute(target - local_count, &sources);
        info!(target, local = local_count, ?plan, "fetching batch");

        let mut batch = Vec::new();
        for (kind, count) in plan {
            let Some(source) = self.registry.get(kind) else {
                warn!("no client registered for {kind}");
                continue;
            };
            batch.extend(self.fetch_remote(source.as_ref(), count, &day_dir).await);
        }

        if local_count > 0 {
            batch.extend(self.fetch_local(local_count, &day_dir).await);
        }

        info!("batch complete: {} of {} images", batch.len(), target);
        batch
    }

    async fn fetch_remote(&self, source: &dyn ImageSource, count: usize, day_dir: &Path) -> Vec<ImageMeta> {
        let kind = source.kind();
        let records = match source.fetch(count).await {
            Ok(records) => records,
            Err(e) => {
                warn!("{kind}: fetch failed, skipping: {e}");
                return Vec::new();
            }
        };

        let mut saved = Vec::with_capacity(records.len());
        for mut meta in records {
            let downloaded = match source.download(&meta, day_dir).await {
                Ok(path) => path,
                Err(e) => {
                    warn!("{kind}: download of {} failed: {e}", meta.id);
                    continue;
                }
            };
            meta.local_path = Some(self.apply_overlay(&downloaded, &meta).await);

            write_sidecar(&downloaded.with_extension("json"), &meta);
            debug!("{kind}: saved {}", downloaded.display());
            saved.push(meta);
        }
        saved
    }

    /// 本地图片只引用原路径，不复制也不叠加署名
    async fn fetch_local(&self, count: usize, day_dir: &Path) -> Vec<ImageMeta> {
        let Some(local) = self.registry.get(SourceKind::Local) else {
            return Vec::new();
        };
        let records = match local.fetch(count).await {
            Ok(records) => records,
            Err(e) => {
                warn!("local: scan failed, skipping: {e}");
                return Vec::new();
            }
        };

        let mut saved = Vec::with_capacity(records.len());
        for mut meta in records {
            let Some(original) = meta.resolved_path().map(Path::to_path_buf) else {
                continue;
            };
            let sidecar = day_dir.join(local_sidecar_name(&meta, &original));
            meta.local_path = Some(original);
            write_sidecar(&sidecar, &meta);
            saved.push(meta);
        }
        info!("added {} local images", saved.len());
        saved
    }

    /// 叠加失败时保留原图
    async fn apply_overlay(&self, image: &Path, meta: &ImageMeta) -> PathBuf {
        let Some(overlay) = &self.overlay else {
            return image.to_path_buf();
        };
        match overlay.apply(image, meta).await {
            Ok(out) => out,
            Err(e) => {
                warn!("attribution overlay failed for {}: {e}", image.display());
                image.to_path_buf()
            }
        }
    }

    /// 根据当天目录下的元数据文件重建今天的批次
    ///
    /// 只保留对应图片仍存在的记录，按文件名排序
    pub fn today_images(&self) -> Vec<ImageMeta> {
        let day_dir = self.today_dir();
        let Ok(entries) = fs::read_dir(&day_dir) else {
            return Vec::new();
        };

        let mut sidecars: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        sidecars.sort();

        sidecars
            .into_iter()
            .filter_map(|path| {
                let content = fs::read_to_string(&path).ok()?;
                match serde_json::from_str::<ImageMeta>(&content) {
                    Ok(meta) => Some(meta),
                    Err(e) => {
                        warn!("skipping unreadable metadata {}: {e}", path.display());
                        None
                    }
                }
            })
            .filter(|meta| meta.resolved_path().is_some_and(Path::exists))
            .collect()
    }

    /// 删除早于 `keep_days` 天的日期目录，返回删除的目录数
    ///
    /// 非 `YYYY-MM-DD` 命名的目录不会被触碰
    pub fn cleanup_old_images(&self, keep_days: u32) -> usize {
        let cutoff = self.clock.now().date_naive() - chrono::Duration::days(i64::from(keep_days));
        let Ok(entries) = fs::read_dir(&self.images_dir) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(date) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| NaiveDate::parse_from_str(n, DAY_FORMAT).ok())
            else {
                continue;
            };
            if date >= cutoff {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    info!("removed old images: {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("failed to remove {}: {e}", path.display()),
            }
        }
        removed
    }
}

/// 本地图片的元数据文件名，带上完整路径的哈希
///
/// 子目录中的同名文件各自得到一份元数据
fn local_sidecar_name(meta: &ImageMeta, original: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    original.hash(&mut hasher);
    format!("{}-{:016x}.json", meta.file_stem(), hasher.finish())
}

fn write_sidecar(path: &Path, meta: &ImageMeta) {
    let result = serde_json::to_vec_pretty(meta)
        .map_err(std::io::Error::from)
        .and_then(|json| state::write_atomic(path, &json));
    if let Err(e) = result {
        warn!("failed to write metadata {}: {e}", path.display());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::clock::manual::ManualClock;
    use crate::config::{SourcePreferences, SourceConfig};
    use crate::overlay::OverlayError;
    use crate::source::SourceError;
    use async_trait::async_trait;
    use chrono::{Local, TimeZone};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// 内存中的配置
    #[derive(Default)]
    pub struct StaticConfig {
        pub prefs: HashMap<String, String>,
        pub sources: Vec<SourceConfig>,
    }

    impl StaticConfig {
        pub fn with_sources(sources: Vec<SourceConfig>) -> Self {
            Self {
                sources,
                ..Default::default()
            }
        }
    }

    impl ConfigProvider for StaticConfig {
        fn get_preference(&self, key: &str) -> Option<String> {
            self.prefs.get(key).cloned()
        }
        fn enabled_sources(&self) -> Vec<SourceKind> {
            self.sources.iter().filter(|s| s.enabled).map(|s| s.kind).collect()
        }
        fn source_weights(&self) -> HashMap<SourceKind, u32> {
            self.sources.iter().filter_map(|s| s.weight.map(|w| (s.kind, w))).collect()
        }
        fn source_preferences(&self, _source: SourceKind) -> SourcePreferences {
            SourcePreferences::default()
        }
        fn api_key(&self, _source: SourceKind) -> Option<String> {
            None
        }
        fn source_configs(&self) -> Vec<SourceConfig> {
            self.sources.clone()
        }
    }

    /// 返回固定数量记录的假来源，下载时写一个小文件
    pub struct FakeSource {
        pub kind: SourceKind,
        pub available: usize,
        pub fail: bool,
        pub requested: Mutex<Vec<usize>>,
    }

    impl FakeSource {
        pub fn new(kind: SourceKind, available: usize) -> Self {
            Self {
                kind,
                available,
                fail: false,
                requested: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(kind: SourceKind) -> Self {
            Self {
                fail: true,
                ..Self::new(kind, 0)
            }
        }
    }

    #[async_trait]
    impl ImageSource for FakeSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch(&self, count: usize) -> Result<Vec<ImageMeta>, SourceError> {
            self.requested.lock().unwrap().push(count);
            if self.fail {
                return Err(SourceError::Empty(self.kind));
            }
            Ok((0..count.min(self.available))
                .map(|i| {
                    let mut meta = ImageMeta::remote(self.kind, format!("img{i}"), format!("https://x/{i}.jpg"));
                    meta.photographer = "Tester".into();
                    meta
                })
                .collect())
        }

        async fn download(&self, meta: &ImageMeta, dest_dir: &Path) -> Result<PathBuf, SourceError> {
            let path = dest_dir.join(format!("{}.jpg", meta.file_stem()));
            std::fs::write(&path, b"jpeg")?;
            Ok(path)
        }
    }

    pub fn fixed_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Local.with_ymd_and_hms(2025, 6, 15, 9, 0, 0).unwrap()))
    }

    fn fetcher(dir: &Path, sources: Vec<SourceConfig>, fakes: Vec<FakeSource>) -> ImageFetcher {
        let mut registry = SourceRegistry::new();
        for fake in fakes {
            registry.register(fake);
        }
        ImageFetcher::new(
            Arc::new(StaticConfig::with_sources(sources)),
            registry,
            dir,
            fixed_clock(),
        )
    }

    #[tokio::test]
    async fn batch_is_written_under_the_day_directory() {
        let dir = tempfile::tempdir().unwrap();
        let f = fetcher(
            dir.path(),
            vec![SourceConfig::new(SourceKind::Picsum, true, None)],
            vec![FakeSource::new(SourceKind::Picsum, 10)],
        );
        let batch = f.fetch_batch(3).await;
        assert_eq!(batch.len(), 3);

        let day = dir.path().join("2025-06-15");
        for meta in &batch {
            let path = meta.local_path.as_ref().unwrap();
            assert!(path.starts_with(&day));
            assert!(path.with_extension("json").is_file());
        }
    }

    #[tokio::test]
    async fn failing_source_is_skipped_and_partial_batch_kept() {
        let dir = tempfile::tempdir().unwrap();
        let f = fetcher(
            dir.path(),
            vec![
                SourceConfig::new(SourceKind::Unsplash, true, Some(50)),
                SourceConfig::new(SourceKind::Pexels, true, Some(50)),
            ],
            vec![
                FakeSource::failing(SourceKind::Unsplash),
                FakeSource::new(SourceKind::Pexels, 10),
            ],
        );
        let batch = f.fetch_batch(4).await;
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|m| m.source == SourceKind::Pexels));
    }

    #[tokio::test]
    async fn no_enabled_sources_yields_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let f = fetcher(dir.path(), Vec::new(), Vec::new());
        assert!(f.fetch_batch(5).await.is_empty());
    }

    #[tokio::test]
    async fn today_images_rebuilds_batch_from_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let f = fetcher(
            dir.path(),
            vec![SourceConfig::new(SourceKind::Wallhaven, true, None)],
            vec![FakeSource::new(SourceKind::Wallhaven, 3)],
        );
        let batch = f.fetch_batch(3).await;

        // 删除一张图片后，它的元数据不应再出现
        std::fs::remove_file(batch[1].local_path.as_ref().unwrap()).unwrap();
        let rebuilt = f.today_images();
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt[0], batch[0]);
        assert_eq!(rebuilt[1], batch[2]);
    }

    #[tokio::test]
    async fn local_images_are_referenced_and_get_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let pictures = tempfile::tempdir().unwrap();
        let original = pictures.path().join("lake.png");
        image::ImageBuffer::<image::Rgb<u8>, Vec<u8>>::new(160, 90)
            .save(&original)
            .unwrap();

        let mut registry = SourceRegistry::new();
        registry.register(
            crate::source::local::LocalImageProvider::new(pictures.path()).with_constraints(160, 1.5, 1.9),
        );
        registry.register(FakeSource::new(SourceKind::Picsum, 10));
        let f = ImageFetcher::new(
            Arc::new(StaticConfig::with_sources(vec![
                SourceConfig::new(SourceKind::Local, true, Some(50)),
                SourceConfig::new(SourceKind::Picsum, true, Some(50)),
            ])),
            registry,
            dir.path(),
            fixed_clock(),
        );

        let batch = f.fetch_batch(2).await;
        assert_eq!(batch.len(), 2);
        let local = batch.iter().find(|m| m.source == SourceKind::Local).unwrap();
        assert_eq!(local.local_path.as_deref(), Some(original.as_path()));
        let sidecars: Vec<_> = std::fs::read_dir(dir.path().join("2025-06-15"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("local-lake-") && name.ends_with(".json"))
            .collect();
        assert_eq!(sidecars.len(), 1);
        assert_eq!(f.today_images().len(), 2);
    }

    #[tokio::test]
    async fn local_images_with_clashing_names_keep_separate_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let pictures = tempfile::tempdir().unwrap();
        for name in ["trips/lake.png", "home/lake.png", "山水.png", "海洋.png"] {
            let path = pictures.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            image::ImageBuffer::<image::Rgb<u8>, Vec<u8>>::new(160, 90)
                .save(&path)
                .unwrap();
        }

        let mut registry = SourceRegistry::new();
        registry.register(
            crate::source::local::LocalImageProvider::new(pictures.path()).with_constraints(160, 1.5, 1.9),
        );
        let f = ImageFetcher::new(
            Arc::new(StaticConfig::with_sources(vec![SourceConfig::new(
                SourceKind::Local,
                true,
                Some(100),
            )])),
            registry,
            dir.path(),
            fixed_clock(),
        );

        let batch = f.fetch_batch(4).await;
        assert_eq!(batch.len(), 4);

        let rebuilt = f.today_images();
        assert_eq!(rebuilt.len(), batch.len());
        let mut paths: Vec<_> = rebuilt.iter().filter_map(|m| m.local_path.clone()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 4);
    }

    struct BrokenOverlay;

    #[async_trait]
    impl AttributionOverlay for BrokenOverlay {
        async fn apply(&self, _image: &Path, _meta: &ImageMeta) -> Result<PathBuf, OverlayError> {
            Err(OverlayError::NotConfigured)
        }
    }

    #[tokio::test]
    async fn overlay_failure_keeps_original_file() {
        let dir = tempfile::tempdir().unwrap();
        let f = fetcher(
            dir.path(),
            vec![SourceConfig::new(SourceKind::Picsum, true, None)],
            vec![FakeSource::new(SourceKind::Picsum, 1)],
        )
        .with_overlay(Arc::new(BrokenOverlay));
        let batch = f.fetch_batch(1).await;
        let path = batch[0].local_path.as_ref().unwrap();
        assert!(path.is_file());
        assert!(!path.to_string_lossy().contains("-overlay"));
    }

    #[test]
    fn cleanup_removes_only_old_dated_directories() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2025-06-01", "2025-06-08", "2025-06-14", "2025-06-15", "favourites"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        let f = fetcher(dir.path(), Vec::new(), Vec::new());
        assert_eq!(f.cleanup_old_images(7), 1);

        assert!(!dir.path().join("2025-06-01").exists());
        assert!(dir.path().join("2025-06-08").exists());
        assert!(dir.path().join("2025-06-15").exists());
        assert!(dir.path().join("favourites").exists());
    }
}
