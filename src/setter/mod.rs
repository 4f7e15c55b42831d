// setter/mod.rs — 系统壁纸设置模块
// 按检测到的桌面环境依次尝试一组设置方法，第一个成功的即返回；
// 环境专用方法全部失败后，再尝试通用的 X11 壁纸工具

pub mod command;
pub mod detect;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

pub use command::{CommandOutput, CommandRunner, SystemRunner};
pub use detect::DesktopEnvironment;

#[derive(Debug, thiserror::Error)]
pub enum SetterError {
    #[error("image not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("path is not valid UTF-8: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{program} failed: {stderr}")]
    Failed { program: String, stderr: String },

    #[error("no matching xfce4-desktop image property was set")]
    NoProperties,

    #[error("every wallpaper method failed on {desktop}: {}", summarize(.attempts))]
    Exhausted {
        desktop: DesktopEnvironment,
        attempts: Vec<(String, String)>,
    },
}

fn summarize(attempts: &[(String, String)]) -> String {
    attempts
        .iter()
        .map(|(method, reason)| format!("{method} ({reason})"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// 设置桌面壁纸的抽象
#[async_trait]
pub trait WallpaperSetter: Send + Sync {
    async fn set(&self, image: &Path) -> Result<(), SetterError>;
}

/// 单个壁纸设置方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Gnome,
    Cinnamon,
    Mate,
    Qdbus,
    Qdbus6,
    Xfconf,
    Pcmanfm,
    PcmanfmQt,
    Feh,
    Nitrogen,
    Hsetroot,
}

/// 通用工具，按优先顺序排列
pub const GENERIC_CHAIN: [Method; 3] = [Method::Feh, Method::Nitrogen, Method::Hsetroot];

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::Gnome => "gsettings (gnome)",
            Method::Cinnamon => "gsettings (cinnamon)",
            Method::Mate => "gsettings (mate)",
            Method::Qdbus => "qdbus",
            Method::Qdbus6 => "qdbus6",
            Method::Xfconf => "xfconf-query",
            Method::Pcmanfm => "pcmanfm",
            Method::PcmanfmQt => "pcmanfm-qt",
            Method::Feh => "feh",
            Method::Nitrogen => "nitrogen",
            Method::Hsetroot => "hsetroot",
        }
    }

    /// 方法依赖的可执行文件
    pub fn program(self) -> &'static str {
        match self {
            Method::Gnome | Method::Cinnamon | Method::Mate => "gsettings",
            Method::Qdbus => "qdbus",
            Method::Qdbus6 => "qdbus6",
            Method::Xfconf => "xfconf-query",
            Method::Pcmanfm => "pcmanfm",
            Method::PcmanfmQt => "pcmanfm-qt",
            Method::Feh => "feh",
            Method::Nitrogen => "nitrogen",
            Method::Hsetroot => "hsetroot",
        }
    }

    /// 某个桌面环境下依次尝试的方法
    pub fn chain(desktop: DesktopEnvironment) -> Vec<Method> {
        let specific: &[Method] = match desktop {
            DesktopEnvironment::Gnome => &[Method::Gnome],
            DesktopEnvironment::Cinnamon => &[Method::Cinnamon],
            DesktopEnvironment::Mate => &[Method::Mate],
            DesktopEnvironment::Kde => &[Method::Qdbus, Method::Qdbus6],
            DesktopEnvironment::Xfce => &[Method::Xfconf],
            DesktopEnvironment::Lxde => &[Method::Pcmanfm, Method::PcmanfmQt],
            DesktopEnvironment::Unknown => &[],
        };
        specific.iter().chain(GENERIC_CHAIN.iter()).copied().collect()
    }
}

const GNOME_SCHEMA: &str = "org.gnome.desktop.background";

/// Plasma 脚本：给每个虚拟桌面写入壁纸插件配置
fn plasma_script(uri: &str) -> String {
    let uri = uri.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "var allDesktops = desktops();\n\
         for (var i = 0; i < allDesktops.length; i++) {{\n\
           var d = allDesktops[i];\n\
           d.wallpaperPlugin = \"org.kde.image\";\n\
           d.currentConfigGroup = [\"Wallpaper\", \"org.kde.image\", \"General\"];\n\
           d.writeConfig(\"Image\", \"{uri}\");\n\
         }}\n"
    )
}

/// xfce4-desktop 中存放壁纸路径的属性
fn is_xfce_image_property(property: &str) -> bool {
    property.starts_with("/backdrop/screen")
        && (property.ends_with("/last-image") || property.ends_with("/image-path"))
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// 根据桌面环境设置壁纸
pub struct DesktopSetter {
    runner: Arc<dyn CommandRunner>,
    desktop: DesktopEnvironment,
}

impl DesktopSetter {
    /// 使用真实命令并自动检测桌面环境
    pub fn new() -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());
        let desktop = detect::detect(runner.as_ref());
        Self { runner, desktop }
    }

    pub fn with_environment(runner: Arc<dyn CommandRunner>, desktop: DesktopEnvironment) -> Self {
        Self { runner, desktop }
    }

    pub fn desktop(&self) -> DesktopEnvironment {
        self.desktop
    }

    async fn run_checked(&self, program: &str, args: Vec<String>) -> Result<CommandOutput, SetterError> {
        self.runner.run(program, &args).await?.check(program)
    }

    /// gsettings 设置次要键，失败只记录日志
    async fn gsettings_best_effort(&self, key: &str, value: &str) {
        if let Err(e) = self
            .run_checked("gsettings", args(["set", GNOME_SCHEMA, key, value]))
            .await
        {
            debug!("optional gsettings key {key} not set: {e}");
        }
    }

    async fn attempt(&self, method: Method, path: &str, uri: &str) -> Result<(), SetterError> {
        match method {
            Method::Gnome => {
                self.run_checked("gsettings", args(["set", GNOME_SCHEMA, "picture-uri", uri]))
                    .await?;
                // GNOME 42+ 的深色模式壁纸，以及缩放方式
                self.gsettings_best_effort("picture-uri-dark", uri).await;
                self.gsettings_best_effort("picture-options", "zoom").await;
                Ok(())
            }
            Method::Cinnamon => self
                .run_checked(
                    "gsettings",
                    args(["set", "org.cinnamon.desktop.background", "picture-uri", uri]),
                )
                .await
                .map(drop),
            Method::Mate => self
                .run_checked(
                    "gsettings",
                    args(["set", "org.mate.background", "picture-filename", path]),
                )
                .await
                .map(drop),
            Method::Qdbus | Method::Qdbus6 => self
                .run_checked(
                    method.program(),
                    vec![
                        "org.kde.plasmashell".to_string(),
                        "/PlasmaShell".to_string(),
                        "org.kde.PlasmaShell.evaluateScript".to_string(),
                        plasma_script(uri),
                    ],
                )
                .await
                .map(drop),
            Method::Xfconf => self.set_xfce(path).await,
            Method::Pcmanfm | Method::PcmanfmQt => self
                .run_checked(method.program(), args(["--set-wallpaper", path]))
                .await
                .map(drop),
            Method::Feh => self.run_checked("feh", args(["--bg-scale", path])).await.map(drop),
            Method::Nitrogen => self
                .run_checked("nitrogen", args(["--set-scaled", "--save", path]))
                .await
                .map(drop),
            Method::Hsetroot => self.run_checked("hsetroot", args(["-fill", path])).await.map(drop),
        }
    }

    /// 枚举所有显示器/工作区的属性，逐个设置；至少成功一个才算成功
    async fn set_xfce(&self, path: &str) -> Result<(), SetterError> {
        let listing = self
            .run_checked("xfconf-query", args(["-c", "xfce4-desktop", "-l"]))
            .await?;

        let mut set_any = false;
        for property in listing.stdout.lines().map(str::trim).filter(|p| is_xfce_image_property(p)) {
            match self
                .run_checked(
                    "xfconf-query",
                    args(["-c", "xfce4-desktop", "-p", property, "-s", path]),
                )
                .await
            {
                Ok(_) => set_any = true,
                Err(e) => debug!("xfconf property {property} not set: {e}"),
            }
        }

        if set_any { Ok(()) } else { Err(SetterError::NoProperties) }
    }
}

impl Default for DesktopSetter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WallpaperSetter for DesktopSetter {
    async fn set(&self, image: &Path) -> Result<(), SetterError> {
        if !image.is_file() {
            return Err(SetterError::NotFound(image.to_path_buf()));
        }
        let absolute = std::path::absolute(image).unwrap_or_else(|_| image.to_path_buf());
        let path = absolute
            .to_str()
            .ok_or_else(|| SetterError::InvalidPath(absolute.clone()))?;
        // 空格、# 等字符需要百分号编码
        let uri = reqwest::Url::from_file_path(&absolute)
            .map_err(|()| SetterError::InvalidPath(absolute.clone()))?
            .to_string();

        let mut attempts = Vec::new();
        for method in Method::chain(self.desktop) {
            if !self.runner.is_available(method.program()) {
                attempts.push((method.name().to_string(), "not installed".to_string()));
                continue;
            }
            match self.attempt(method, path, &uri).await {
                Ok(()) => {
                    info!(desktop = %self.desktop, method = method.name(), "wallpaper set: {path}");
                    return Ok(());
                }
                Err(e) => {
                    debug!("{} failed: {e}", method.name());
                    attempts.push((method.name().to_string(), e.to_string()));
                }
            }
        }

        warn!(desktop = %self.desktop, "no wallpaper method succeeded");
        Err(SetterError::Exhausted {
            desktop: self.desktop,
            attempts,
        })
    }
}
