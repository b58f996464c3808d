//! 步骤文件
//!
//! 每个步骤完成后写入 `NNN.md`：
//!
//! ```text
//! # Prompt <n>
//!
//! <key>: <value>
//!
//! > <提示词第一行>
//! > <提示词第二行>
//!
//! <响应>
//! ```
//!
//! 文件存在即表示该步骤已完成，重新运行时直接读取其中的响应。

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{StatValue, UsageStats};

const QUOTE_PREFIX: &str = "> ";

/// 步骤文件名（三位数字）
pub fn artifact_file_name(index: usize) -> String {
    format!("{:03}.md", index)
}

pub fn artifact_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(artifact_file_name(index))
}

fn usage_line_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-zA-Z_]+): (.*)$").ok())
        .as_ref()
}

/// 解析 `key: value` 行
pub fn parse_usage_line(line: &str) -> Option<(String, StatValue)> {
    let caps = usage_line_regex()?.captures(line)?;
    Some((caps[1].to_string(), StatValue::parse(&caps[2])))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepArtifact {
    pub index: usize,
    pub usage: UsageStats,
    pub prompt: String,
    /// 以一个换行结尾
    pub response: String,
}

/// 没有引用块时用量块的结束位置
///
/// 用量从标题后的第一个空行之后开始，遇到第一行非用量内容（通常是空行）结束。
fn usage_block_end(lines: &[&str]) -> usize {
    let mut end = 0;
    if lines.first().is_some_and(|l| l.starts_with("# Prompt ")) {
        end = 1;
        if lines.get(1).is_some_and(|l| l.is_empty()) {
            end = 2;
        }
    }
    while end < lines.len() && parse_usage_line(lines[end]).is_some() {
        end += 1;
    }
    end
}

impl StepArtifact {
    pub fn render(&self) -> String {
        let mut text = format!("# Prompt {}\n\n", self.index);
        text.push_str(&self.usage.to_lines());
        text.push('\n');
        for line in self.prompt.trim_end().lines() {
            text.push_str(QUOTE_PREFIX);
            text.push_str(line);
            text.push('\n');
        }
        text.push('\n');
        text.push_str(&self.response);
        text
    }

    /// 从文件内容恢复
    ///
    /// 第一个引用块之前的 `key: value` 行是用量；跳过第一个连续的引用块，
    /// 其后（去掉开头空行）是响应。没有引用块时，用量只取标题后紧接的连续行，
    /// 之后都是响应。
    pub fn parse(index: usize, text: &str) -> Self {
        let lines: Vec<&str> = text.trim_end().lines().collect();
        let quote_start = lines.iter().position(|l| l.starts_with(QUOTE_PREFIX));
        let preamble_end = quote_start.unwrap_or_else(|| usage_block_end(&lines));

        let mut usage = UsageStats::new();
        for line in &lines[..preamble_end] {
            if let Some((key, value)) = parse_usage_line(line) {
                usage.update(&key, &value);
            }
        }

        let (prompt, mut body) = match quote_start {
            Some(start) => {
                let end = lines[start..]
                    .iter()
                    .position(|l| !l.starts_with(QUOTE_PREFIX))
                    .map_or(lines.len(), |offset| start + offset);
                let prompt = lines[start..end]
                    .iter()
                    .map(|l| &l[QUOTE_PREFIX.len()..])
                    .collect::<Vec<_>>()
                    .join("\n");
                (prompt, end)
            }
            None => (String::new(), preamble_end),
        };

        while body < lines.len() && lines[body].is_empty() {
            body += 1;
        }
        let response = format!("{}\n", lines[body..].join("\n"));

        Self {
            index,
            usage,
            prompt,
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StepArtifact {
        let mut usage = UsageStats::new();
        usage.set("prompt_token_count", 120);
        usage.set("prompt_eval_duration", 800);
        usage.set("prompt_eval_rate", "150.00 tps".to_string());
        StepArtifact {
            index: 3,
            usage,
            prompt: "What problem is solved?\nAnswer briefly.".to_string(),
            response: "It solves X.\n\n> quoted in answer\n".to_string(),
        }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(artifact_file_name(0), "000.md");
        assert_eq!(artifact_file_name(12), "012.md");
    }

    #[test]
    fn test_render_layout() {
        assert_eq!(
            sample().render(),
            "# Prompt 3\n\n\
             prompt_token_count: 120\n\
             prompt_eval_duration: 800\n\
             prompt_eval_rate: 150.00 tps\n\
             \n\
             > What problem is solved?\n\
             > Answer briefly.\n\
             \n\
             It solves X.\n\n> quoted in answer\n"
        );
    }

    #[test]
    fn test_parse_rendered() {
        let artifact = sample();
        let parsed = StepArtifact::parse(3, &artifact.render());
        assert_eq!(parsed.response, artifact.response);
        assert_eq!(parsed.prompt, artifact.prompt);
        assert_eq!(parsed.usage.get("prompt_token_count"), Some(&StatValue::Int(120)));
        // 速率字段只占位，不累加
        assert_eq!(parsed.usage.get("prompt_eval_rate"), Some(&StatValue::Int(0)));
    }

    #[test]
    fn test_parse_without_usage() {
        let text = "# Prompt 0\n\n\n> Translate the title.\n\nA Title\n";
        let parsed = StepArtifact::parse(0, text);
        assert!(parsed.usage.is_empty());
        assert_eq!(parsed.response, "A Title\n");
    }

    #[test]
    fn test_parse_without_quote_block() {
        let text = "# Prompt 1\n\ntotal_token_count: 9\n\nJust the answer\nsecond line\n\n\n";
        let parsed = StepArtifact::parse(1, text);
        assert_eq!(parsed.usage.get("total_token_count"), Some(&StatValue::Int(9)));
        assert_eq!(parsed.response, "Just the answer\nsecond line\n");
    }

    #[test]
    fn test_parse_keeps_key_value_lines_in_response() {
        let text = "# Prompt 2\n\ntotal_token_count: 9\n\n\nAnswer: 42\nUnit: none\n";
        let parsed = StepArtifact::parse(2, text);
        assert_eq!(parsed.usage.get("total_token_count"), Some(&StatValue::Int(9)));
        assert!(parsed.usage.get("Answer").is_none());
        assert_eq!(parsed.response, "Answer: 42\nUnit: none\n");

        // 没有用量时同样保留
        let parsed = StepArtifact::parse(2, "# Prompt 2\n\n\n\nAnswer: 42\n");
        assert!(parsed.usage.is_empty());
        assert_eq!(parsed.response, "Answer: 42\n");
    }

    #[test]
    fn test_parse_usage_line() {
        assert_eq!(
            parse_usage_line("total_token_count: 42"),
            Some(("total_token_count".to_string(), StatValue::Int(42)))
        );
        assert_eq!(parse_usage_line("# Prompt 0"), None);
        assert_eq!(parse_usage_line("no-dash: 1"), None);
    }
}
