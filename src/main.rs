// main.rs — 程序入口
// 负责初始化日志与异步运行时、解析命令行参数、组装各组件并分发子命令

mod cli; // 命令行定义
mod clock;
mod config; // 配置文件与 ConfigProvider
mod distributor;
mod fetcher;
mod overlay;
mod rotator; // 轮换引擎
mod scheduler;
mod setter; // 桌面环境检测与壁纸设置
mod source; // 各图片来源
mod state;

// 初始化多语言支持，嵌入 locales 目录下的所有翻译
rust_i18n::i18n!("locales");

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser}; // 引入 Parser trait 的 parse() 方法; CommandFactory 用于生成补全脚本
use clap_complete::generate; // 引入补全脚本生成函数
use rust_i18n::t; // 引入翻译宏
use tracing_subscriber::prelude::*;

use cli::{Cli, Commands, ConfigAction};
use config::{keys, AppConfig, ConfigProvider};
use fetcher::ImageFetcher;
use overlay::CommandOverlay;
use rotator::{EngineError, RotationEngine};
use scheduler::Scheduler;
use setter::DesktopSetter;
use source::local::LocalImageProvider;
use source::{ImageMeta, ImageOrigin, SourceKind, SourceRegistry};
use state::StateStore;

/// `#[tokio::main]` 宏将 async main 转换为同步 main + tokio 运行时
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    // 自动检测系统语言并设置
    let locale = std::env::var("LANG").unwrap_or_else(|_| "en".to_string());
    if locale.starts_with("zh") {
        rust_i18n::set_locale("zh-CN");
    } else {
        rust_i18n::set_locale("en");
    }

    // 解析命令行参数
    let cli = Cli::parse();

    // 读取配置文件（缺失或格式错误时使用默认值）
    let mut config = AppConfig::new();
    config.ensure_dirs()?;

    // 不需要引擎的子命令
    match &cli.command {
        Commands::Completions { shell } => {
            generate(*shell, &mut Cli::command(), "wallspin", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Config { action } => return handle_config(&mut config, action),
        Commands::Sources => {
            handle_sources(&config);
            return Ok(());
        }
        Commands::TestSource { name } => return handle_test_source(&config, name).await,
        _ => {}
    }

    let engine = build_engine(&config)?;

    match cli.command {
        Commands::Fetch => {
            println!("{}", t!("fetch_start"));
            exit_on_failure(engine.fetch_and_rotate(false).await);
            print_current(&engine).await;
        }
        Commands::Next => {
            exit_on_failure(engine.next().await);
            print_current(&engine).await;
        }
        Commands::Previous => {
            exit_on_failure(engine.previous().await);
            print_current(&engine).await;
        }
        Commands::Set { image } => {
            warn_if_unusual(&config, &image);
            exit_on_failure(engine.set_specific(&image).await);
            println!("{}", t!("set_done", path => image.display()));
        }
        Commands::Current => print_current(&engine).await,
        Commands::Status => print_status(&engine).await,
        Commands::Daemon => handle_daemon(&config, engine).await,
        Commands::Clean { keep_days } => {
            let provider: &dyn ConfigProvider = &config;
            let keep_days = keep_days.unwrap_or_else(|| provider.preference_or(keys::KEEP_DAYS, 7));
            let removed = engine.fetcher().cleanup_old_images(keep_days);
            println!("{}", t!("clean_done", count => removed, days => keep_days));
        }
        Commands::Completions { .. } | Commands::Config { .. } | Commands::Sources | Commands::TestSource { .. } => {}
    }

    Ok(())
}

/// 日志输出到 stderr：本程序的事件按 RUST_LOG 级别过滤，ERROR 一律输出
fn init_logger() {
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|level| level.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO);

    let log_format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();

    let log_filter = tracing_subscriber::fmt::Layer::default()
        .with_writer(std::io::stderr)
        .event_format(log_format)
        .with_filter(tracing_subscriber::filter::filter_fn(move |metadata| {
            metadata.level() == &tracing::Level::ERROR
                || (metadata.target().starts_with("wallspin") && metadata.level() <= &log_level)
        }));

    tracing_subscriber::registry().with(log_filter).init();
}

/// 按配置组装 来源 → 抓取器 → 设置器 → 引擎
fn build_engine(config: &AppConfig) -> Result<RotationEngine, Box<dyn std::error::Error>> {
    let provider: Arc<dyn ConfigProvider> = Arc::new(config.clone());
    let registry = SourceRegistry::from_config(provider.as_ref())?;

    let mut fetcher = ImageFetcher::new(
        provider.clone(),
        registry,
        config.images_dir.clone(),
        Arc::new(clock::SystemClock),
    );
    match CommandOverlay::from_config(config.overlay()) {
        Ok(Some(overlay)) => fetcher = fetcher.with_overlay(Arc::new(overlay)),
        Ok(None) => {}
        // 叠加只是锦上添花，配置有误时照常运行
        Err(e) => tracing::warn!("overlay disabled: {e}"),
    }

    let setter = DesktopSetter::new();
    tracing::debug!(desktop = %setter.desktop(), "desktop environment detected");

    Ok(RotationEngine::new(
        provider,
        fetcher,
        Arc::new(setter),
        StateStore::new(config.state_file()),
        Arc::new(clock::SystemClock),
    ))
}

/// 操作失败时打印原因并以状态码 1 退出
fn exit_on_failure(result: Result<(), EngineError>) {
    if let Err(e) = result {
        eprintln!("{}", t!("operation_failed", reason => e));
        std::process::exit(1);
    }
}

fn print_image(meta: &ImageMeta) {
    println!("{}", t!("image_source", source => meta.source.display_name()));
    if !meta.photographer.is_empty() {
        println!("{}", t!("image_photographer", name => meta.photographer));
    }
    if !meta.description.is_empty() {
        println!("{}", t!("image_description", text => meta.description));
    }
    if let Some(path) = meta.resolved_path() {
        println!("{}", t!("image_path", path => path.display()));
    }
    if let Some(ImageOrigin::Remote(url)) = meta.origin() {
        println!("{}", t!("image_origin", url => url));
    }
    if !meta.page_url.is_empty() {
        println!("{}", t!("image_page", url => meta.page_url));
    }
}

async fn print_current(engine: &RotationEngine) {
    match engine.current().await {
        Some(meta) => {
            println!("{}", t!("current_title"));
            print_image(&meta);
        }
        None => println!("{}", t!("current_none")),
    }
}

async fn print_status(engine: &RotationEngine) {
    let status = engine.status().await;
    println!("{}", t!("status_title"));
    if status.image_count == 0 {
        println!("{}", t!("status_empty"));
    } else {
        println!(
            "{}",
            t!("status_position", current => status.current_index + 1, total => status.image_count)
        );
    }
    println!("{}", t!("status_retries", count => status.fetch_retry_count));
    match status.last_fetch_attempt {
        Some(at) => println!(
            "{}",
            t!("status_last_attempt", time => at.format("%Y-%m-%d %H:%M:%S"))
        ),
        None => println!("{}", t!("status_never_fetched")),
    }
    println!("{}", t!("status_should_retry", value => engine.should_retry_fetch().await));
    if let Some(meta) = status.current {
        println!();
        print_image(&meta);
    }
}

/// 本地图片不满足壁纸条件时只提示，仍然设置
fn warn_if_unusual(config: &AppConfig, image: &Path) {
    let local = LocalImageProvider::from_preferences(&config.source_preferences(SourceKind::Local));
    if image.is_file() && !local.is_valid_wallpaper(image) {
        println!("{}", t!("set_unusual_image", path => image.display()));
    }
}

async fn handle_daemon(config: &AppConfig, engine: RotationEngine) {
    let provider: &dyn ConfigProvider = config;
    let fetch_minutes: u64 = provider.preference_or(keys::ROTATION_INTERVAL_MINUTES, 60).max(1);
    let retry_minutes: u64 = provider.preference_or(keys::RETRY_CHECK_MINUTES, 15).max(1);
    let max_retries: u32 = provider.preference_or(keys::MAX_FETCH_RETRIES, 24);

    println!(
        "{}",
        t!("daemon_start", fetch => fetch_minutes, retry => retry_minutes)
    );
    let scheduler = Scheduler::new(
        Arc::new(engine),
        Duration::from_secs(fetch_minutes * 60),
        Duration::from_secs(retry_minutes * 60),
        max_retries,
    );
    scheduler.run(scheduler::shutdown_signal()).await;
    println!("{}", t!("daemon_stopped"));
}

/// 列出来源配置以及下一批图片的分配
fn handle_sources(config: &AppConfig) {
    let provider: &dyn ConfigProvider = config;
    let sources = provider.source_configs();
    let total: usize = provider.preference_or(keys::IMAGES_PER_DAY, 5);

    println!("{}", t!("sources_title"));
    for source in &sources {
        let weight = source
            .weight
            .map(|w| w.to_string())
            .unwrap_or_else(|| "-".to_string());
        let state = if source.enabled { t!("enabled") } else { t!("disabled") };
        println!(
            "  {:<10} {:<8} {}",
            source.kind.name(),
            state,
            t!("sources_weight", weight => weight)
        );
        if source.kind.is_local() && source.enabled {
            let local = LocalImageProvider::from_preferences(&source.preferences);
            println!("             {}", t!("sources_folder", path => local.folder().display()));
        }
    }

    let local = distributor::local_share(total, &sources);
    let plan = distributor::distribute(total - local, &sources);
    println!();
    println!("{}", t!("sources_plan", total => total));
    if local > 0 {
        println!("  {:<10} {}", SourceKind::Local.name(), local);
    }
    for (kind, count) in &plan {
        println!("  {:<10} {}", kind.name(), count);
    }
    if plan.is_empty() && local == 0 {
        println!("{}", t!("sources_none"));
    }
    if distributor::local_missing_weight(&sources) {
        println!("{}", t!("sources_local_needs_weight"));
    }
}

async fn handle_test_source(config: &AppConfig, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let kind: SourceKind = name.parse()?;
    let registry = SourceRegistry::from_config(config)?;
    let Some(source) = registry.get(kind) else {
        return Err(t!("source_unavailable", name => kind.name()).into());
    };

    println!("{}", t!("test_source_start", name => kind.display_name()));
    match source.test_connection().await {
        Ok(summary) => println!("{}", t!("test_source_ok", summary => summary)),
        Err(e) => {
            eprintln!("{}", t!("test_source_failed", name => kind.display_name(), reason => e));
            std::process::exit(1);
        }
    }
    Ok(())
}

/// 处理 config 子命令：查看或修改配置
fn handle_config(config: &mut AppConfig, action: &ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let provider: &dyn ConfigProvider = &*config;
            println!("{}", t!("config_title"));
            println!("{}", t!("config_path", path => config.config_path.display()));
            println!("{}", t!("config_images_dir", path => config.images_dir.display()));
            println!("{}", t!("config_state_file", path => config.state_file().display()));
            for key in [
                keys::IMAGES_PER_DAY,
                keys::ROTATION_INTERVAL_MINUTES,
                keys::RETRY_CHECK_MINUTES,
                keys::KEEP_DAYS,
                keys::AUTO_DELETE_OLD,
                keys::MAX_FETCH_RETRIES,
                keys::CUSTOM_QUERY,
            ] {
                let value = provider.get_preference(key).unwrap_or_else(|| "None".to_string());
                println!("  {key} = {value}");
            }
            let enabled: Vec<&str> = provider.enabled_sources().into_iter().map(SourceKind::name).collect();
            println!("{}", t!("config_enabled_sources", sources => enabled.join(", ")));
            println!("{}", t!("config_overlay", enabled => config.overlay().enabled));
        }
        ConfigAction::Schema => {
            println!("{}", AppConfig::get_schema());
        }
        ConfigAction::Dump => {
            println!("{}", config.to_toml());
        }
        ConfigAction::Set { key, value } => {
            config.set_value(key, value)?;
            config.save()?;
            println!("{}", t!("config_updated", key => key, value => value));
        }
    }
    Ok(())
}
