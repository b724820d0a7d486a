use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use scan_everything::application::Config;
use scan_everything::infrastructure::{ErrorLogger, Logger, LoggerTrait, LoggingObserver};
use scan_everything::presentation::{print_report, ProgressDisplay, ScanSummary};
use scan_everything::{RuleSet, Scanner};

/// 按规则扫描目录中文件内容的命令行工具
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// 要扫描的目录路径，省略时使用配置或交互式输入
    path: Option<PathBuf>,

    /// 规则文件路径 (默认读取配置中的 rules_path)
    #[clap(short, long)]
    rules: Option<PathBuf>,

    /// 配置文件路径 (默认为程序同级目录下的 config.toml)
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// 工作线程数 (默认使用所有可用CPU)
    #[clap(short = 'j', long)]
    threads: Option<usize>,

    /// 不使用并行处理
    #[clap(long)]
    no_parallel: bool,

    /// 最小文件大小 (例如 "1K", "1M", "1G")
    #[clap(long)]
    min_size: Option<String>,

    /// 最大文件大小 (例如 "1K", "1M", "1G")
    #[clap(long)]
    max_size: Option<String>,

    /// 跟随符号链接
    #[clap(long)]
    follow_links: bool,

    /// 遵循 .gitignore 规则，默认情况下会扫描所有文件
    #[clap(long)]
    respect_gitignore: bool,

    /// 启用详细日志记录，日志文件保存到当前目录
    #[clap(long)]
    log: bool,
}

/// 命令行参数覆盖配置文件中的值
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(threads) = args.threads {
        config.performance.threads = threads;
    }
    if args.no_parallel {
        config.performance.threads = 1;
    }
    if args.min_size.is_some() {
        config.filter.min_size = args.min_size.clone();
    }
    if args.max_size.is_some() {
        config.filter.max_size = args.max_size.clone();
    }
    if args.follow_links {
        config.scan.follow_links = true;
    }
    if args.respect_gitignore {
        config.scan.respect_gitignore = true;
    }
}

/// 确定扫描目录：命令行参数 > 配置默认值 > 交互式输入
fn resolve_scan_path(args: &Args, config: &Config) -> Result<PathBuf> {
    if let Some(path) = &args.path {
        return Ok(path.clone());
    }
    if !config.scan.default_scan_path.trim().is_empty() {
        return Ok(PathBuf::from(config.scan.default_scan_path.trim()));
    }

    print!("请输入要扫描的目录: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).context("无法读取输入")?;
    let line = line.trim();
    if line.is_empty() {
        anyhow::bail!("未指定扫描目录");
    }
    Ok(PathBuf::from(line))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 加载配置
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };
    let mut config = Config::load_or_create(&config_path)?;
    apply_overrides(&mut config, &args);
    config.validate().context("配置无效")?;

    // 初始化日志记录器
    let logger = Arc::new(Logger::new(args.log)?);
    let error_logger = Arc::new(ErrorLogger::new(args.log)?);

    // 编译规则，失败时不会开始扫描
    let rules_path = match &args.rules {
        Some(path) => path.clone(),
        None => config.rules_path(config_path.parent().unwrap_or(Path::new("."))),
    };
    let rules = RuleSet::compile_file(&rules_path)
        .with_context(|| format!("无法编译规则文件: {}", rules_path.display()))?;

    let root = resolve_scan_path(&args, &config)?;
    let options = config.scan_options()?;

    println!("扫描目录: {}", root.display());
    println!("规则文件: {} ({} 条规则)", rules_path.display(), rules.len());
    println!("工作线程: {}", options.threads);
    println!("跟随符号链接: {}", options.walk.follow_links);
    println!("遵循 .gitignore 规则: {}", options.walk.respect_gitignore);
    println!("启用日志记录: {}", args.log);
    println!();

    if logger.is_enabled() {
        logger.log_message(&format!("扫描目录: {}", root.display()))?;
        logger.log_message(&format!("规则文件: {}", rules_path.display()))?;
        logger.log_message(&format!("规则: {}", rules.rule_names().collect::<Vec<_>>().join(", ")))?;
        logger.log_message(&format!("工作线程: {}", options.threads))?;
        logger.log_message(&format!("队列容量: {}", options.queue_capacity))?;
        if let Some(min) = options.filter.min_size {
            logger.log_message(&format!("最小文件大小: {}", min))?;
        }
        if let Some(max) = options.filter.max_size {
            logger.log_message(&format!("最大文件大小: {}", max))?;
        }
        logger.log_message(&format!("跟随符号链接: {}", options.walk.follow_links))?;
        logger.log_message(&format!("遵循 .gitignore 规则: {}", options.walk.respect_gitignore))?;
    }

    let max_path_width = config.display.max_path_width;
    let scanner = Scanner::new(Arc::new(rules), options);

    // Ctrl+C 只停止提交新文件，已开始的文件会完成
    let cancel = scanner.cancel_token();
    ctrlc::set_handler(move || cancel.cancel()).context("无法注册中断处理函数")?;

    let display = ProgressDisplay::new();
    let observer = LoggingObserver::new(Arc::clone(&logger), Arc::clone(&error_logger));
    let report = scanner.run(&root, &display, &observer)?;

    ScanSummary::new(&report).print()?;
    print_report(&report, max_path_width)?;
    error_logger.print_error_summary();

    // 完成日志记录
    error_logger.finalize()?;
    if logger.is_enabled() {
        if report.cancelled {
            logger.log_message("扫描被用户取消")?;
        }
        logger.finalize(
            report.files_scanned,
            report.errors,
            report.matched_count(),
            report.elapsed,
        )?;
    }

    Ok(())
}
