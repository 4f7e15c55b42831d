// detect.rs — 桌面环境检测

use std::env;
use std::fmt;
use std::sync::OnceLock;

use tracing::debug;

use super::command::CommandRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DesktopEnvironment {
    Gnome,
    Kde,
    Xfce,
    Mate,
    Cinnamon,
    Lxde,
    Unknown,
}

impl DesktopEnvironment {
    pub fn name(self) -> &'static str {
        match self {
            DesktopEnvironment::Gnome => "gnome",
            DesktopEnvironment::Kde => "kde",
            DesktopEnvironment::Xfce => "xfce",
            DesktopEnvironment::Mate => "mate",
            DesktopEnvironment::Cinnamon => "cinnamon",
            DesktopEnvironment::Lxde => "lxde",
            DesktopEnvironment::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DesktopEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 子串匹配顺序：cinnamon / mate 要排在 gnome 之前（如 "X-Cinnamon"、"MATE"），
/// unity 与 ubuntu 会话本质上是 GNOME
const SIGNATURES: [(&str, DesktopEnvironment); 11] = [
    ("cinnamon", DesktopEnvironment::Cinnamon),
    ("mate", DesktopEnvironment::Mate),
    ("gnome", DesktopEnvironment::Gnome),
    ("unity", DesktopEnvironment::Gnome),
    ("ubuntu", DesktopEnvironment::Gnome),
    ("kde", DesktopEnvironment::Kde),
    ("plasma", DesktopEnvironment::Kde),
    ("xfce", DesktopEnvironment::Xfce),
    ("lxde", DesktopEnvironment::Lxde),
    ("lxqt", DesktopEnvironment::Lxde),
    ("pantheon", DesktopEnvironment::Gnome),
];

/// 工具探测顺序
const PROBES: [(&str, DesktopEnvironment); 6] = [
    ("gsettings", DesktopEnvironment::Gnome),
    ("qdbus", DesktopEnvironment::Kde),
    ("qdbus6", DesktopEnvironment::Kde),
    ("xfconf-query", DesktopEnvironment::Xfce),
    ("pcmanfm", DesktopEnvironment::Lxde),
    ("pcmanfm-qt", DesktopEnvironment::Lxde),
];

fn match_signal(signal: Option<&str>) -> Option<DesktopEnvironment> {
    let value = signal?.trim().to_ascii_lowercase();
    if value.is_empty() {
        return None;
    }
    SIGNATURES
        .iter()
        .find(|(needle, _)| value.contains(needle))
        .map(|(_, de)| *de)
}

/// 纯函数形式的检测逻辑
///
/// 1. XDG_CURRENT_DESKTOP 子串匹配
/// 2. DESKTOP_SESSION 子串匹配
/// 3. 两个信号都缺失时探测 $PATH 中的控制工具
pub fn detect_from(
    current_desktop: Option<&str>,
    desktop_session: Option<&str>,
    has_tool: impl Fn(&str) -> bool,
) -> DesktopEnvironment {
    if let Some(de) = match_signal(current_desktop).or_else(|| match_signal(desktop_session)) {
        return de;
    }

    let signals_absent = [current_desktop, desktop_session]
        .into_iter()
        .all(|s| s.is_none_or(|v| v.trim().is_empty()));
    if signals_absent {
        if let Some((_, de)) = PROBES.iter().find(|(tool, _)| has_tool(tool)) {
            return *de;
        }
    }
    DesktopEnvironment::Unknown
}

/// 检测当前桌面环境，每个进程只检测一次
pub fn detect(runner: &dyn CommandRunner) -> DesktopEnvironment {
    static DETECTED: OnceLock<DesktopEnvironment> = OnceLock::new();
    *DETECTED.get_or_init(|| {
        let current = env::var("XDG_CURRENT_DESKTOP").ok();
        let session = env::var("DESKTOP_SESSION").ok();
        let de = detect_from(current.as_deref(), session.as_deref(), |tool| runner.is_available(tool));
        debug!(?current, ?session, desktop = %de, "detected desktop environment");
        de
    })
}
