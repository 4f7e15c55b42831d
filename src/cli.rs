// cli.rs — 命令行接口定义模块
// 使用 clap 的 derive 模式定义所有子命令和参数

use std::path::PathBuf;

use clap::{Parser, Subcommand}; // Parser: 解析命令行参数的 trait; Subcommand: 定义子命令的 trait
use clap_complete::Shell; // Shell 枚举：Bash, Zsh, Fish, Elvish, PowerShell

/// 多来源壁纸轮换工具
///
/// 按权重从多个图片站和本地目录获取壁纸，定时轮换桌面背景，
/// 并在重启后恢复轮换进度。
#[derive(Parser)]
#[command(name = "wallspin")]
#[command(version)] // 自动从 Cargo.toml 读取 version 字段
#[command(author)]
#[command(about = "多来源壁纸轮换工具：按权重抓取壁纸并定时设置为桌面背景")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 抓取新的一批壁纸，并设置第一张
    ///
    /// 用法示例:
    ///   wallspin fetch
    Fetch,

    /// 切换到下一张壁纸
    Next,

    /// 切换到上一张壁纸
    #[command(alias = "prev")]
    Previous,

    /// 将本地指定的图片设置为壁纸（不改变轮换进度）
    ///
    /// 用法示例:
    ///   wallspin set ~/Pictures/lake.jpg
    Set {
        /// 图片的本地路径
        image: PathBuf,
    },

    /// 显示当前壁纸信息
    Current,

    /// 显示轮换状态（批次大小、当前位置、重试次数）
    Status,

    /// 在前台运行定时轮换服务，Ctrl-C 退出
    ///
    /// 用法示例:
    ///   wallspin daemon
    Daemon,

    /// 列出图片来源以及下一批图片的分配方案
    Sources,

    /// 测试某个来源是否可用（凭据、网络）
    ///
    /// 用法示例:
    ///   wallspin test-source unsplash
    TestSource {
        /// 来源名称 (unsplash, wallhaven, pexels, pixabay, picsum, local)
        name: String,
    },

    /// 删除超过保留天数的旧批次
    ///
    /// 用法示例:
    ///   wallspin clean
    ///   wallspin clean --keep-days 3
    Clean {
        /// 保留天数（默认读取配置中的 keep_days）
        #[arg(short, long, value_name = "DAYS")]
        keep_days: Option<u32>,
    },

    /// 配置管理操作
    ///
    /// 用法示例:
    ///   wallspin config show
    ///   wallspin config dump
    ///   wallspin config set unsplash.weight 50
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// 生成 shell 补全脚本（支持 bash, zsh, fish, elvish, powershell）
    ///
    /// 用法示例：
    ///   wallspin completions zsh > ~/.zsh/completions/_wallspin
    ///   wallspin completions fish > ~/.config/fish/completions/wallspin.fish
    Completions {
        /// 目标 shell 类型
        shell: Shell,
    },
}

/// 配置管理操作
#[derive(Subcommand)]
pub enum ConfigAction {
    /// 查看当前所有配置简报
    Show,
    /// 生成配置文件对应的 JSON Schema
    Schema,
    /// 以 TOML 格式打印当前完整配置内容
    Dump,
    /// 设置配置项的值
    ///
    /// 支持 [common] 中的键（如 images_per_day、custom_query），
    /// 以及 <来源>.enabled / weight / theme / query / api_key、local.folder
    Set {
        /// 要设置的键
        key: String,
        /// 要设置的值
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn prev_is_an_alias_of_previous() {
        let cli = Cli::try_parse_from(["wallspin", "prev"]).unwrap();
        assert!(matches!(cli.command, Commands::Previous));
    }

    #[test]
    fn parses_nested_config_set() {
        let cli = Cli::try_parse_from(["wallspin", "config", "set", "pexels.weight", "30"]).unwrap();
        match cli.command {
            Commands::Config {
                action: ConfigAction::Set { key, value },
            } => {
                assert_eq!(key, "pexels.weight");
                assert_eq!(value, "30");
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn test_source_takes_a_name() {
        let cli = Cli::try_parse_from(["wallspin", "test-source", "picsum"]).unwrap();
        assert!(matches!(cli.command, Commands::TestSource { name } if name == "picsum"));
    }
}
