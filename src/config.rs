// config.rs — 配置管理模块
// 遵循 Unix 风格：优先从 ~/.config/wallspin/config.toml 读取配置
//
// 引擎、分配器与各来源只依赖 ConfigProvider 这个只读接口，
// 从不关心配置文件的格式和位置。

use schemars::JsonSchema; // 引入用于生成 JSON Schema 的 trait
use serde::{Deserialize, Serialize}; // 引入序列化与反序列化 trait
use shellexpand::tilde; // 用于展开 ~ 和环境变量
use std::collections::HashMap;
use std::env; // 环境变量模块
use std::fs; // 文件系统模块
use std::path::{Path, PathBuf}; // 路径处理类型
use std::str::FromStr;

use crate::source::SourceKind;
use crate::state;

/// 偏好项的键名
pub mod keys {
    pub const IMAGES_PER_DAY: &str = "images_per_day";
    pub const ROTATION_INTERVAL_MINUTES: &str = "rotation_interval_minutes";
    pub const RETRY_CHECK_MINUTES: &str = "retry_check_minutes";
    pub const KEEP_DAYS: &str = "keep_days";
    pub const AUTO_DELETE_OLD: &str = "auto_delete_old";
    pub const CUSTOM_QUERY: &str = "custom_query";
    pub const MAX_FETCH_RETRIES: &str = "max_fetch_retries";
    pub const IMAGES_DIR: &str = "images_dir";
    pub const STATE_DIR: &str = "state_dir";
}

/// 单个来源的偏好设置
/// 所有字段都是可选的，每个来源只读取自己关心的部分
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct SourcePreferences {
    /// 主题，如 nature / city / space，会被拼成搜索词
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    /// 显式搜索词，优先于 theme
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// landscape / portrait / squarish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Unsplash 合集 ID
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
    /// Wallhaven 纯净度开关 (sfw/sketchy/nsfw)，如 "100"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purity: Option<String>,
    /// 最低分辨率，如 "1920x1080"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_search: Option<bool>,
    /// 本地图片目录（仅 local 来源）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ratio: Option<f64>,
}

/// 分配器看到的来源配置
///
/// `weight` 为 `None` 表示未配置权重；显式的 0 表示不参与分配
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub enabled: bool,
    pub weight: Option<u32>,
    pub preferences: SourcePreferences,
}

impl SourceConfig {
    pub fn new(kind: SourceKind, enabled: bool, weight: Option<u32>) -> Self {
        Self {
            kind,
            enabled,
            weight,
            preferences: SourcePreferences::default(),
        }
    }
}

/// 配置提供者：只读接口
pub trait ConfigProvider: Send + Sync {
    /// 读取偏好项的字符串形式，未配置时返回 None
    fn get_preference(&self, key: &str) -> Option<String>;

    fn enabled_sources(&self) -> Vec<SourceKind>;

    fn source_weights(&self) -> HashMap<SourceKind, u32>;

    fn source_preferences(&self, source: SourceKind) -> SourcePreferences;

    fn api_key(&self, source: SourceKind) -> Option<String>;

    /// 按 SourceKind::ALL 的顺序组合出全部来源配置
    fn source_configs(&self) -> Vec<SourceConfig> {
        let enabled = self.enabled_sources();
        let weights = self.source_weights();
        SourceKind::ALL
            .into_iter()
            .map(|kind| SourceConfig {
                kind,
                enabled: enabled.contains(&kind),
                weight: weights.get(&kind).copied(),
                preferences: self.source_preferences(kind),
            })
            .collect()
    }
}

impl dyn ConfigProvider + '_ {
    /// 读取并解析偏好项，缺失或解析失败时返回 `default`
    pub fn preference_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get_preference(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

/// 展开路径中的 ~ 和环境变量 ($HOME, $XDG_CONFIG_HOME 等)
/// 支持格式: ~/path, $HOME/path, ${HOME}/path
fn expand_path(path_str: &str) -> PathBuf {
    // shellexpand::tilde 会展开 ~ 和 $HOME 等环境变量
    let expanded = tilde(path_str).into_owned();
    PathBuf::from(expanded)
}

/// 展开用户路径，相对路径则相对于 $HOME
pub fn resolve_user_path(path_str: &str) -> PathBuf {
    let p = expand_path(path_str);
    if p.is_absolute() {
        p
    } else {
        dirs::home_dir().unwrap_or_default().join(p)
    }
}

/// 映射 config.toml 文件内容的嵌套结构体
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema)]
struct ConfigFile {
    #[serde(default)]
    common: CommonConfig,
    #[serde(default)]
    source: SourceTables,
    #[serde(default)]
    overlay: OverlayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
struct CommonConfig {
    /// 图片保存根目录，按日期分子目录 (支持 ~、$HOME 等环境变量，相对路径则相对于 $HOME)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    images_dir: Option<String>,
    /// 轮换状态文件所在目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state_dir: Option<String>,
    /// 每次抓取的图片数量
    #[serde(default = "default_images_per_day")]
    images_per_day: u32,
    /// 定时抓取间隔（分钟）
    #[serde(default = "default_rotation_interval")]
    rotation_interval_minutes: u64,
    /// 失败重试检查间隔（分钟）
    #[serde(default = "default_retry_check")]
    retry_check_minutes: u64,
    /// 旧图片保留天数
    #[serde(default = "default_keep_days")]
    keep_days: u32,
    #[serde(default = "default_true")]
    auto_delete_old: bool,
    /// 所有来源共用的搜索词，覆盖各来源的 theme
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_query: Option<String>,
    /// 连续失败多少次后停止自动重试，0 表示不限
    #[serde(default = "default_max_fetch_retries")]
    max_fetch_retries: u32,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            images_dir: None,
            state_dir: None,
            images_per_day: default_images_per_day(),
            rotation_interval_minutes: default_rotation_interval(),
            retry_check_minutes: default_retry_check(),
            keep_days: default_keep_days(),
            auto_delete_old: true,
            custom_query: None,
            max_fetch_retries: default_max_fetch_retries(),
        }
    }
}

fn default_images_per_day() -> u32 {
    5
}
fn default_rotation_interval() -> u64 {
    60
}
fn default_retry_check() -> u64 {
    15
}
fn default_keep_days() -> u32 {
    7
}
fn default_true() -> bool {
    true
}
fn default_max_fetch_retries() -> u32 {
    24
}

/// 单个来源的配置表 `[source.<name>]`
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ProviderTable {
    #[serde(default)]
    pub enabled: bool,
    /// 分配权重，不配置时参与平均分配
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    /// API Key / Access Key (优先级：ENV > TOML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, flatten)]
    pub preferences: SourcePreferences,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
struct SourceTables {
    #[serde(default)]
    unsplash: ProviderTable,
    #[serde(default)]
    wallhaven: ProviderTable,
    #[serde(default)]
    pexels: ProviderTable,
    #[serde(default)]
    pixabay: ProviderTable,
    #[serde(default = "default_picsum")]
    picsum: ProviderTable,
    #[serde(default)]
    local: ProviderTable,
}

impl Default for SourceTables {
    fn default() -> Self {
        Self {
            unsplash: ProviderTable::default(),
            wallhaven: ProviderTable::default(),
            pexels: ProviderTable::default(),
            pixabay: ProviderTable::default(),
            picsum: default_picsum(),
            local: ProviderTable::default(),
        }
    }
}

/// Picsum 无需凭据，默认启用
fn default_picsum() -> ProviderTable {
    ProviderTable {
        enabled: true,
        ..Default::default()
    }
}

impl SourceTables {
    fn table(&self, kind: SourceKind) -> &ProviderTable {
        match kind {
            SourceKind::Unsplash => &self.unsplash,
            SourceKind::Wallhaven => &self.wallhaven,
            SourceKind::Pexels => &self.pexels,
            SourceKind::Pixabay => &self.pixabay,
            SourceKind::Picsum => &self.picsum,
            SourceKind::Local => &self.local,
        }
    }

    fn table_mut(&mut self, kind: SourceKind) -> &mut ProviderTable {
        match kind {
            SourceKind::Unsplash => &mut self.unsplash,
            SourceKind::Wallhaven => &mut self.wallhaven,
            SourceKind::Pexels => &mut self.pexels,
            SourceKind::Pixabay => &mut self.pixabay,
            SourceKind::Picsum => &mut self.picsum,
            SourceKind::Local => &mut self.local,
        }
    }
}

/// 外部署名叠加命令 `[overlay]`
///
/// args 中可使用 {input}、{output}、{text} 占位符
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct OverlayConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// 凭据对应的环境变量
fn credential_env(kind: SourceKind) -> Option<&'static str> {
    match kind {
        SourceKind::Unsplash => Some("UNSPLASH_ACCESS_KEY"),
        SourceKind::Wallhaven => Some("WALLHAVEN_API_KEY"),
        SourceKind::Pexels => Some("PEXELS_API_KEY"),
        SourceKind::Pixabay => Some("PIXABAY_API_KEY"),
        SourceKind::Picsum | SourceKind::Local => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 应用全局配置项
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 配置文件所在路径
    pub config_path: PathBuf,
    /// 图片保存根目录
    pub images_dir: PathBuf,
    /// 轮换状态所在目录
    pub state_dir: PathBuf,
    file: ConfigFile,
}

impl AppConfig {
    /// 从默认位置初始化配置
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"))
            .join("wallspin");
        Self::load_from(config_dir.join("config.toml"))
    }

    /// 从指定文件初始化配置，文件缺失或格式错误时使用默认值
    pub fn load_from(config_path: PathBuf) -> Self {
        let file = Self::load_config_from_file(&config_path).unwrap_or_default();
        Self::from_file(config_path, file)
    }

    fn from_file(config_path: PathBuf, file: ConfigFile) -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"))
            .join("wallspin");

        // 目录：
        // 1. 如果配置了路径：展开 ~ 和环境变量，相对路径则相对于 $HOME
        // 2. 如果未配置：默认使用 $XDG_DATA_HOME/wallspin
        let images_dir = file
            .common
            .images_dir
            .as_deref()
            .map(resolve_user_path)
            .unwrap_or_else(|| data_dir.join("images"));
        let state_dir = file
            .common
            .state_dir
            .as_deref()
            .map(resolve_user_path)
            .unwrap_or(data_dir);

        Self {
            config_path,
            images_dir,
            state_dir,
            file,
        }
    }

    /// 辅助函数：解析 TOML 配置文件
    fn load_config_from_file(path: &Path) -> Option<ConfigFile> {
        let content = fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!("ignoring malformed config {}: {e}", path.display());
                None
            }
        }
    }

    /// 确保所有必要的目录都存在
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&self.images_dir)?;
        fs::create_dir_all(&self.state_dir)?;
        Ok(())
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join("rotation_state.json")
    }

    pub fn overlay(&self) -> &OverlayConfig {
        &self.file.overlay
    }

    /// 将配置保存回文件（先写临时文件再替换）
    pub fn save(&self) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(&self.file)?;
        state::write_atomic(&self.config_path, toml_str.as_bytes())?;
        Ok(())
    }

    /// 获取配置文件的 JSON Schema
    pub fn get_schema() -> String {
        let schema = schemars::schema_for!(ConfigFile);
        serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
    }

    /// 将当前配置转换为 TOML 字符串
    pub fn to_toml(&self) -> String {
        let toml_str = toml::to_string_pretty(&self.file)
            .unwrap_or_else(|_| "# Error serializing config".to_string());

        // toml 库不支持带注释序列化，所以手动插入
        toml_str.replacen(
            "[source.unsplash]",
            "# 图片来源配置\n# 可选来源: unsplash, wallhaven, pexels, pixabay, picsum (default), local\n# weight 为分配权重，0 表示不参与分配\n[source.unsplash]",
            1,
        )
    }

    /// 修改配置项
    ///
    /// 支持 [common] 中的键，以及 `<source>.enabled`、`<source>.weight`、
    /// `<source>.theme`、`<source>.api_key`、`local.folder`
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let optional = |v: &str| (!v.trim().is_empty()).then(|| v.trim().to_string());
        let common = &mut self.file.common;

        match key {
            keys::IMAGES_PER_DAY => {
                common.images_per_day = value.parse().ok().filter(|n| *n > 0).ok_or_else(invalid)?
            }
            keys::ROTATION_INTERVAL_MINUTES => {
                common.rotation_interval_minutes =
                    value.parse().ok().filter(|n| *n > 0).ok_or_else(invalid)?
            }
            keys::RETRY_CHECK_MINUTES => {
                common.retry_check_minutes = value.parse().ok().filter(|n| *n > 0).ok_or_else(invalid)?
            }
            keys::KEEP_DAYS => common.keep_days = value.parse().map_err(|_| invalid())?,
            keys::AUTO_DELETE_OLD => common.auto_delete_old = value.parse().map_err(|_| invalid())?,
            keys::MAX_FETCH_RETRIES => common.max_fetch_retries = value.parse().map_err(|_| invalid())?,
            keys::CUSTOM_QUERY => common.custom_query = optional(value),
            keys::IMAGES_DIR => {
                common.images_dir = optional(value);
                self.images_dir = resolve_user_path(value);
            }
            keys::STATE_DIR => {
                common.state_dir = optional(value);
                self.state_dir = resolve_user_path(value);
            }
            _ => {
                let (source, field) = key
                    .split_once('.')
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let kind: SourceKind = source
                    .parse()
                    .map_err(|_| ConfigError::UnknownKey(key.to_string()))?;
                let table = self.file.source.table_mut(kind);
                match field {
                    "enabled" => table.enabled = value.parse().map_err(|_| invalid())?,
                    "weight" => table.weight = Some(value.parse().map_err(|_| invalid())?),
                    "theme" => table.preferences.theme = optional(value),
                    "query" => table.preferences.query = optional(value),
                    "api_key" => table.api_key = optional(value),
                    "folder" if kind.is_local() => table.preferences.folder = optional(value),
                    _ => return Err(ConfigError::UnknownKey(key.to_string())),
                }
            }
        }
        Ok(())
    }
}

impl ConfigProvider for AppConfig {
    fn get_preference(&self, key: &str) -> Option<String> {
        let common = &self.file.common;
        match key {
            keys::IMAGES_PER_DAY => Some(common.images_per_day.to_string()),
            keys::ROTATION_INTERVAL_MINUTES => Some(common.rotation_interval_minutes.to_string()),
            keys::RETRY_CHECK_MINUTES => Some(common.retry_check_minutes.to_string()),
            keys::KEEP_DAYS => Some(common.keep_days.to_string()),
            keys::AUTO_DELETE_OLD => Some(common.auto_delete_old.to_string()),
            keys::MAX_FETCH_RETRIES => Some(common.max_fetch_retries.to_string()),
            keys::CUSTOM_QUERY => common.custom_query.clone().filter(|q| !q.trim().is_empty()),
            keys::IMAGES_DIR => Some(self.images_dir.to_string_lossy().into_owned()),
            keys::STATE_DIR => Some(self.state_dir.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    fn enabled_sources(&self) -> Vec<SourceKind> {
        SourceKind::ALL
            .into_iter()
            .filter(|kind| self.file.source.table(*kind).enabled)
            .collect()
    }

    fn source_weights(&self) -> HashMap<SourceKind, u32> {
        SourceKind::ALL
            .into_iter()
            .filter_map(|kind| self.file.source.table(kind).weight.map(|w| (kind, w)))
            .collect()
    }

    fn source_preferences(&self, source: SourceKind) -> SourcePreferences {
        self.file.source.table(source).preferences.clone()
    }

    fn api_key(&self, source: SourceKind) -> Option<String> {
        // 优先级：环境变量 > 配置文件内容
        credential_env(source)
            .and_then(|name| env::var(name).ok())
            .filter(|k| !k.is_empty())
            .or_else(|| self.file.source.table(source).api_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> AppConfig {
        let file: ConfigFile = toml::from_str(toml_str).unwrap();
        AppConfig::from_file(PathBuf::from("/tmp/wallspin-test/config.toml"), file)
    }

    #[test]
    fn defaults_enable_picsum_only() {
        let config = parse("");
        assert_eq!(config.enabled_sources(), vec![SourceKind::Picsum]);
        assert!(config.source_weights().is_empty());
        let provider: &dyn ConfigProvider = &config;
        assert_eq!(provider.preference_or(keys::IMAGES_PER_DAY, 0u32), 5);
        assert_eq!(provider.preference_or(keys::MAX_FETCH_RETRIES, 0u32), 24);
        assert!(provider.preference_or(keys::AUTO_DELETE_OLD, false));
    }

    #[test]
    fn source_tables_map_to_configs() {
        let config = parse(
            r#"
            [common]
            images_per_day = 8
            custom_query = "aurora"

            [source.pexels]
            enabled = true
            weight = 30
            api_key = "px"
            theme = "ocean"

            [source.pixabay]
            enabled = true
            weight = 70
            categories = ["nature"]

            [source.picsum]
            enabled = false
            "#,
        );
        assert_eq!(config.enabled_sources(), vec![SourceKind::Pexels, SourceKind::Pixabay]);
        assert_eq!(config.source_weights().get(&SourceKind::Pixabay), Some(&70));
        assert_eq!(config.source_preferences(SourceKind::Pexels).theme.as_deref(), Some("ocean"));
        assert_eq!(config.source_preferences(SourceKind::Pixabay).categories, vec!["nature"]);
        assert_eq!(config.get_preference(keys::CUSTOM_QUERY).as_deref(), Some("aurora"));

        let configs = config.source_configs();
        assert_eq!(configs.len(), SourceKind::ALL.len());
        let pexels = configs.iter().find(|c| c.kind == SourceKind::Pexels).unwrap();
        assert!(pexels.enabled);
        assert_eq!(pexels.weight, Some(30));
        let picsum = configs.iter().find(|c| c.kind == SourceKind::Picsum).unwrap();
        assert!(!picsum.enabled);
    }

    #[test]
    fn preference_or_falls_back_on_garbage() {
        struct Raw;
        impl ConfigProvider for Raw {
            fn get_preference(&self, _key: &str) -> Option<String> {
                Some("not-a-number".into())
            }
            fn enabled_sources(&self) -> Vec<SourceKind> {
                Vec::new()
            }
            fn source_weights(&self) -> HashMap<SourceKind, u32> {
                HashMap::new()
            }
            fn source_preferences(&self, _source: SourceKind) -> SourcePreferences {
                SourcePreferences::default()
            }
            fn api_key(&self, _source: SourceKind) -> Option<String> {
                None
            }
        }
        let raw: &dyn ConfigProvider = &Raw;
        assert_eq!(raw.preference_or("images_per_day", 3u32), 3);
    }

    #[test]
    fn set_value_updates_common_and_source_keys() {
        let mut config = parse("");
        config.set_value("images_per_day", "3").unwrap();
        config.set_value("wallhaven.enabled", "true").unwrap();
        config.set_value("wallhaven.weight", "0").unwrap();
        config.set_value("local.folder", "~/Pictures/Walls").unwrap();
        config.set_value("custom_query", "").unwrap();

        assert_eq!(config.get_preference(keys::IMAGES_PER_DAY).as_deref(), Some("3"));
        assert!(config.enabled_sources().contains(&SourceKind::Wallhaven));
        assert_eq!(config.source_weights().get(&SourceKind::Wallhaven), Some(&0));
        assert_eq!(
            config.source_preferences(SourceKind::Local).folder.as_deref(),
            Some("~/Pictures/Walls")
        );
        assert!(config.get_preference(keys::CUSTOM_QUERY).is_none());
    }

    #[test]
    fn set_value_rejects_bad_input() {
        let mut config = parse("");
        assert!(matches!(config.set_value("images_per_day", "0"), Err(ConfigError::InvalidValue { .. })));
        assert!(matches!(config.set_value("colour", "red"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(config.set_value("flickr.enabled", "true"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(config.set_value("pexels.folder", "/x"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn save_then_load_keeps_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = AppConfig::load_from(path.clone());
        config.set_value("pexels.enabled", "true").unwrap();
        config.set_value("pexels.weight", "40").unwrap();
        config.save().unwrap();

        let reloaded = AppConfig::load_from(path);
        assert!(reloaded.enabled_sources().contains(&SourceKind::Pexels));
        assert_eq!(reloaded.source_weights().get(&SourceKind::Pexels), Some(&40));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[common\nimages_per_day = ").unwrap();
        let config = AppConfig::load_from(path);
        assert_eq!(config.enabled_sources(), vec![SourceKind::Picsum]);
    }

    #[test]
    fn dump_and_schema_describe_the_file() {
        let config = parse("");
        assert!(config.to_toml().contains("[source.unsplash]"));
        assert!(AppConfig::get_schema().contains("images_per_day"));
    }
}
