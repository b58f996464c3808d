//! 语言包
//!
//! 每种输出语言提供：系统指令、固定步骤（标题 + 提示词）、
//! 章节摘要模板以及连接章节标题的分隔符。

use serde::Deserialize;

use crate::error::{AppResult, ConfigError};
use crate::models::loaders::parse_language_pack;

/// 章节模板中的占位符
pub const SECTIONS_PLACEHOLDER: &str = "{sections}";

static DE: &str = include_str!("../../lang/de.toml");
static EN: &str = include_str!("../../lang/en.toml");
static ES: &str = include_str!("../../lang/es.toml");
static FR: &str = include_str!("../../lang/fr.toml");
static JA: &str = include_str!("../../lang/ja.toml");
static KO: &str = include_str!("../../lang/ko.toml");
static ZH: &str = include_str!("../../lang/zh.toml");

/// 语言名称 / 区域设置前缀 → 语言代码
static LANGUAGE_ALIASES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "chinese" => "zh",
    "english" => "en",
    "french" => "fr",
    "german" => "de",
    "japanese" => "ja",
    "korean" => "ko",
    "spanish" => "es",
    "de" => "de",
    "en" => "en",
    "es" => "es",
    "fr" => "fr",
    "ja" => "ja",
    "ko" => "ko",
    "zh" => "zh",
};

/// 固定步骤
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FixedStep {
    /// 在最终结果中显示的标题（如 "# Abstract"）
    pub title: String,
    pub prompt: String,
}

/// 语言包
#[derive(Debug, Clone, Deserialize)]
pub struct LanguagePack {
    pub name: String,
    pub system_instruction: String,
    pub steps: Vec<FixedStep>,
    /// 包含 `{sections}` 占位符的章节摘要模板
    pub section_template: String,
    pub section_separator: String,
    /// 输出章节结构 JSON 的步骤下标，默认为最后一个固定步骤
    #[serde(default)]
    pub structure_step: Option<usize>,
}

impl LanguagePack {
    /// 按语言代码或名称选择内置语言包
    ///
    /// 未指定时使用系统区域设置，无法识别时使用英语。
    pub fn select(language: Option<&str>) -> AppResult<Self> {
        let requested = language.map(str::to_string).unwrap_or_else(system_locale);
        let code = resolve_code(&requested);
        let source = match code {
            "de" => DE,
            "es" => ES,
            "fr" => FR,
            "ja" => JA,
            "ko" => KO,
            "zh" => ZH,
            _ => EN,
        };
        parse_language_pack(code, source)
    }

    /// 章节结构步骤的下标
    pub fn structure_step(&self) -> usize {
        self.structure_step
            .unwrap_or_else(|| self.steps.len().saturating_sub(1))
    }

    /// 用章节标题列表生成提示词
    pub fn section_prompt(&self, titles: &[String]) -> String {
        self.section_template
            .replace(SECTIONS_PLACEHOLDER, &titles.join(&self.section_separator))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidLanguagePack {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.steps.is_empty() {
            return Err(invalid("没有固定步骤"));
        }
        if !self.section_template.contains(SECTIONS_PLACEHOLDER) {
            return Err(invalid("章节模板缺少 {sections} 占位符"));
        }
        if self.structure_step() >= self.steps.len() {
            return Err(invalid("structure_step 超出固定步骤范围"));
        }
        Ok(())
    }
}

/// 语言名称或区域设置（如 "ja_JP.UTF-8"）转为语言代码
pub fn resolve_code(requested: &str) -> &'static str {
    let normalized = requested.trim().to_lowercase();
    LANGUAGE_ALIASES
        .entries()
        .find(|(prefix, _)| normalized.starts_with(*prefix))
        .map(|(_, code)| *code)
        .unwrap_or("en")
}

fn system_locale() -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}
