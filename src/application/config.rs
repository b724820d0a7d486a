use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{FileFilter, ScanOptions, WalkOptions};

/// 应用程序配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 扫描相关配置
    pub scan: ScanConfig,
    /// 性能相关配置
    pub performance: PerformanceConfig,
    /// 排除规则配置
    pub exclude: ExcludeConfig,
    /// 文件大小过滤
    #[serde(default)]
    pub filter: FilterConfig,
    /// 显示相关配置
    pub display: DisplayConfig,
}

/// 扫描配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// 规则文件路径，相对路径以配置文件所在目录为基准
    pub rules_path: String,
    /// 默认扫描目录，为空时交互式询问
    pub default_scan_path: String,
    /// 是否包含隐藏文件
    pub hidden: bool,
    /// 是否跟随符号链接
    pub follow_links: bool,
    /// 是否遵循 .gitignore 规则
    pub respect_gitignore: bool,
}

/// 性能配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// 工作线程数，0 表示使用所有 CPU
    pub threads: usize,
    /// 任务队列容量，0 表示线程数的两倍
    pub queue_capacity: usize,
    /// 进度刷新间隔毫秒数
    pub progress_interval_ms: u64,
}

/// 排除规则配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludeConfig {
    /// 默认排除的目录
    pub dirs: Vec<String>,
    /// 默认排除的文件
    pub files: Vec<String>,
}

/// 文件大小过滤配置，例如 "1K", "10M"
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<String>,
}

/// 显示配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// 结果表中路径列的最大宽度
    pub max_path_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan: ScanConfig {
                rules_path: "rules.toml".to_string(),
                default_scan_path: String::new(),
                hidden: true,
                follow_links: false,
                respect_gitignore: false,
            },
            performance: PerformanceConfig {
                threads: 0,
                queue_capacity: 0,
                progress_interval_ms: 100,
            },
            exclude: ExcludeConfig {
                dirs: vec![".git".to_string()],
                files: vec![],
            },
            filter: FilterConfig::default(),
            display: DisplayConfig { max_path_width: 60 },
        }
    }
}

/// 解析文件大小字符串为字节数
pub fn parse_size(size_str: &str) -> Result<u64> {
    let size_str = size_str.trim().to_lowercase();

    let multiplier = if size_str.ends_with('k') {
        1024
    } else if size_str.ends_with('m') {
        1024 * 1024
    } else if size_str.ends_with('g') {
        1024 * 1024 * 1024
    } else {
        1
    };

    let numeric_part = size_str
        .trim_end_matches(|c: char| c.is_alphabetic())
        .parse::<f64>()
        .with_context(|| format!("无效的大小值: {}", size_str))?;

    if numeric_part < 0.0 {
        anyhow::bail!("大小不能为负数: {}", size_str);
    }

    Ok((numeric_part * multiplier as f64) as u64)
}

impl Config {
    /// 从配置文件加载配置，如果文件不存在则创建默认配置文件
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            let config = Self::default();
            config.save_to_file(config_path)?;
            println!("已创建默认配置文件: {}", config_path.display());
            Ok(config)
        }
    }

    /// 从文件加载配置
    pub fn load_from_file(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("无法读取配置文件: {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", config_path.display()))?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("无法创建配置目录: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("无法序列化配置")?;

        fs::write(config_path, content)
            .with_context(|| format!("无法写入配置文件: {}", config_path.display()))?;

        Ok(())
    }

    /// 获取配置文件的默认路径（程序所在目录）
    pub fn default_config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("无法获取程序路径")?;

        let exe_dir = exe_path.parent().context("无法获取程序目录")?;

        Ok(exe_dir.join("config.toml"))
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.scan.rules_path.trim().is_empty() {
            anyhow::bail!("rules_path 不能为空");
        }

        if self.performance.threads > 1024 {
            anyhow::bail!("threads 不能超过 1024");
        }

        let interval = self.performance.progress_interval_ms;
        if interval == 0 || interval > 10000 {
            anyhow::bail!("progress_interval_ms 必须在 1-10000 之间");
        }

        if self.display.max_path_width < 20 {
            anyhow::bail!("max_path_width 不能小于 20");
        }

        let (min, max) = self.size_limits()?;
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                anyhow::bail!("min_size 不能大于 max_size");
            }
        }

        Ok(())
    }

    /// 解析后的文件大小上下限
    pub fn size_limits(&self) -> Result<(Option<u64>, Option<u64>)> {
        let min = self.filter.min_size.as_deref().map(parse_size).transpose()?;
        let max = self.filter.max_size.as_deref().map(parse_size).transpose()?;
        Ok((min, max))
    }

    /// 规则文件的实际路径，相对路径以 `base_dir` 为基准
    pub fn rules_path(&self, base_dir: &Path) -> PathBuf {
        let path = PathBuf::from(&self.scan.rules_path);
        if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        }
    }

    /// 转换为扫描参数
    pub fn scan_options(&self) -> Result<ScanOptions> {
        let (min_size, max_size) = self.size_limits()?;
        let threads = match self.performance.threads {
            0 => num_cpus::get(),
            n => n,
        }
        .max(1);
        let queue_capacity = match self.performance.queue_capacity {
            0 => threads * 2,
            n => n,
        };

        Ok(ScanOptions {
            threads,
            queue_capacity,
            progress_interval: Duration::from_millis(self.performance.progress_interval_ms),
            walk: WalkOptions {
                hidden: self.scan.hidden,
                follow_links: self.scan.follow_links,
                respect_gitignore: self.scan.respect_gitignore,
            },
            filter: FileFilter::new(
                min_size,
                max_size,
                self.exclude.dirs.clone(),
                self.exclude.files.clone(),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scan.rules_path, "rules.toml");
        assert_eq!(config.performance.progress_interval_ms, 100);
        assert!(config.exclude.dirs.contains(&".git".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.scan.rules_path, deserialized.scan.rules_path);
        assert_eq!(config.performance.threads, deserialized.performance.threads);
        assert!(deserialized.filter.min_size.is_none());
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested/test_config.toml");

        let created = Config::load_or_create(&config_path).unwrap();
        assert!(config_path.exists());

        let mut changed = created.clone();
        changed.filter.max_size = Some("10M".to_string());
        changed.save_to_file(&config_path).unwrap();

        let loaded = Config::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.filter.max_size.as_deref(), Some("10M"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.performance.progress_interval_ms = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.display.max_path_width = 5;
        assert!(config.validate().is_err());

        config = Config::default();
        config.filter.min_size = Some("2M".to_string());
        config.filter.max_size = Some("1M".to_string());
        assert!(config.validate().is_err());

        config = Config::default();
        config.filter.min_size = Some("lots".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size(" 1.5m ").unwrap(), 1572864);
        assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
        assert!(parse_size("abc").is_err());
        assert!(parse_size("-1K").is_err());
    }

    #[test]
    fn test_scan_options() {
        let mut config = Config::default();
        config.performance.threads = 3;
        config.filter.max_size = Some("1K".to_string());
        config.scan.follow_links = true;

        let options = config.scan_options().unwrap();
        assert_eq!(options.threads, 3);
        assert_eq!(options.queue_capacity, 6);
        assert_eq!(options.filter.max_size, Some(1024));
        assert!(options.walk.follow_links);
        assert!(options.filter.excluded_dirs.contains(".git"));
    }

    #[test]
    fn test_rules_path_resolution() {
        let config = Config::default();
        assert_eq!(
            config.rules_path(Path::new("/opt/scan")),
            PathBuf::from("/opt/scan/rules.toml")
        );
    }
}
