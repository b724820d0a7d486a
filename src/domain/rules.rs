use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use grep_matcher::Matcher;
use grep_regex::RegexMatcher;
use serde::Deserialize;
use thiserror::Error;

/// 规则名称，在同一规则集中唯一
pub type RuleName = String;

/// 已编译规则集的抽象接口
///
/// 扫描核心只依赖这个 trait：实现必须是不可变的，
/// 并且可以被多个工作线程同时只读调用。
pub trait RuleMatcher: Send + Sync {
    /// 对一段字节内容求值，返回命中的规则名集合（可能为空）
    fn match_bytes(&self, data: &[u8]) -> Result<BTreeSet<RuleName>, MatchError>;
}

/// 规则编译错误
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("无法读取规则文件 {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析规则文件: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("规则 `{rule}` 无效: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("规则名称重复: {0}")]
    DuplicateRule(String),

    #[error("规则文件中没有任何规则")]
    Empty,
}

/// 匹配器内部错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct MatchError(pub String);

/// 规则命中条件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    /// 任意一个模式命中即可
    #[default]
    Any,
    /// 所有模式都必须命中
    All,
}

/// 搜索模式类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPattern {
    /// 普通文本
    Text(String),
    /// 十六进制字节序列
    Hex(Vec<u8>),
    /// 正则表达式
    Regex(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PatternDef {
    Text(String),
    Hex(String),
    Regex(String),
}

#[derive(Debug, Deserialize)]
struct RuleDef {
    name: String,
    #[serde(default)]
    condition: Condition,
    patterns: Vec<PatternDef>,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default, rename = "rule")]
    rules: Vec<RuleDef>,
}

impl SearchPattern {
    /// 从规则文件中的定义创建搜索模式
    fn from_def(def: &PatternDef) -> Result<Self, String> {
        match def {
            PatternDef::Text(text) => {
                if text.is_empty() {
                    return Err("文本模式不能为空".to_string());
                }
                Ok(SearchPattern::Text(text.clone()))
            }
            PatternDef::Hex(input) => {
                let compact: String = input.split_whitespace().collect();
                let bytes = hex::decode(&compact)
                    .map_err(|err| format!("无效的十六进制值 `{}`: {}", input, err))?;
                if bytes.is_empty() {
                    return Err("十六进制模式不能为空".to_string());
                }
                Ok(SearchPattern::Hex(bytes))
            }
            PatternDef::Regex(pattern) => Ok(SearchPattern::Regex(pattern.clone())),
        }
    }

    /// 获取匹配器
    pub fn get_matcher(&self) -> Result<RegexMatcher, String> {
        let pattern = match self {
            // 转义正则表达式特殊字符
            SearchPattern::Text(text) => regex::escape(text),
            // 关闭 Unicode 模式，使 \xNN 匹配原始字节而不是码点
            SearchPattern::Hex(bytes) => bytes
                .iter()
                .map(|b| format!(r"(?-u:\x{:02x})", b))
                .collect::<String>(),
            SearchPattern::Regex(pattern) => pattern.clone(),
        };

        RegexMatcher::new(&pattern).map_err(|err| err.to_string())
    }
}

/// 已编译的单条规则
#[derive(Debug)]
struct CompiledRule {
    name: RuleName,
    condition: Condition,
    matchers: Vec<RegexMatcher>,
}

impl CompiledRule {
    fn is_match(&self, data: &[u8]) -> Result<bool, MatchError> {
        let hits = self
            .matchers
            .iter()
            .map(|m| m.is_match(data).map_err(|err| MatchError(err.to_string())));

        match self.condition {
            Condition::Any => {
                for hit in hits {
                    if hit? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::All => {
                for hit in hits {
                    if !hit? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

/// 从 TOML 规则文件编译出的规则集
///
/// 规则文件格式:
///
/// ```toml
/// [[rule]]
/// name = "suspicious_header"
/// condition = "any"          # 可选, "any" 或 "all"
/// patterns = [
///     { text = "eval(" },
///     { hex = "4D 5A 90 00" },
///     { regex = "pass(word)?\\s*=" },
/// ]
/// ```
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// 读取并编译规则文件
    pub fn compile_file(path: &Path) -> Result<Self, CompileError> {
        let source = fs::read_to_string(path).map_err(|source| CompileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::compile_str(&source)
    }

    /// 编译规则源文本
    pub fn compile_str(source: &str) -> Result<Self, CompileError> {
        let file: RuleFile = toml::from_str(source)?;
        if file.rules.is_empty() {
            return Err(CompileError::Empty);
        }

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(file.rules.len());

        for def in &file.rules {
            if def.name.trim().is_empty() {
                return Err(CompileError::InvalidRule {
                    rule: def.name.clone(),
                    reason: "规则名称不能为空".to_string(),
                });
            }
            if !seen.insert(def.name.clone()) {
                return Err(CompileError::DuplicateRule(def.name.clone()));
            }
            if def.patterns.is_empty() {
                return Err(CompileError::InvalidRule {
                    rule: def.name.clone(),
                    reason: "至少需要一个模式".to_string(),
                });
            }

            let invalid = |reason: String| CompileError::InvalidRule {
                rule: def.name.clone(),
                reason,
            };

            let matchers = def
                .patterns
                .iter()
                .map(|p| SearchPattern::from_def(p).and_then(|sp| sp.get_matcher()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(invalid)?;

            rules.push(CompiledRule {
                name: def.name.clone(),
                condition: def.condition,
                matchers,
            });
        }

        Ok(Self { rules })
    }

    /// 规则数量
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 按定义顺序返回规则名称
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }
}

impl RuleMatcher for RuleSet {
    fn match_bytes(&self, data: &[u8]) -> Result<BTreeSet<RuleName>, MatchError> {
        let mut matched = BTreeSet::new();
        for rule in &self.rules {
            if rule.is_match(data)? {
                matched.insert(rule.name.clone());
            }
        }
        Ok(matched)
    }
}
