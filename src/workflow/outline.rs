//! 章节结构响应
//!
//! 章节结构步骤的响应中必须恰好有一个 ```` ```json ```` 代码块，内容为标题字符串数组。

use crate::error::OutlineError;

const FENCE_OPEN: &str = "```json";
const FENCE: &str = "```";

/// 代码块起止行（均为围栏行）
fn locate_json_block(lines: &[&str]) -> Result<(usize, usize), OutlineError> {
    let opens: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.starts_with(FENCE_OPEN))
        .map(|(i, _)| i)
        .collect();

    let open = match opens.as_slice() {
        [] => return Err(OutlineError::MissingJsonBlock),
        [open] => *open,
        many => return Err(OutlineError::AmbiguousJsonBlocks { count: many.len() }),
    };

    let close = lines[open + 1..]
        .iter()
        .position(|line| line.starts_with(FENCE))
        .map(|offset| open + 1 + offset)
        .ok_or(OutlineError::UnterminatedJsonBlock)?;

    Ok((open, close))
}

/// 取出章节标题列表
pub fn extract_chapter_titles(response: &str) -> Result<Vec<String>, OutlineError> {
    let lines: Vec<&str> = response.lines().collect();
    let (open, close) = locate_json_block(&lines)?;
    let json = lines[open + 1..close].join("\n");
    serde_json::from_str(&json).map_err(|source| OutlineError::InvalidJson { source })
}

/// 去掉 JSON 代码块及其之前的内容，保留后面的缩进列表
///
/// 围栏之后到第一个空行之间的说明文字一并去掉。
pub fn strip_structure_json(response: &str) -> String {
    let lines: Vec<&str> = response.lines().collect();
    let Ok((_, close)) = locate_json_block(&lines) else {
        return response.to_string();
    };

    let mut start = lines[close + 1..]
        .iter()
        .position(|line| line.trim().is_empty())
        .map_or(close + 1, |offset| close + 1 + offset);
    while start < lines.len() && lines[start].trim().is_empty() {
        start += 1;
    }
    if start >= lines.len() {
        return String::new();
    }
    format!("{}\n", lines[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "Here is the structure:\n```json\n[\n  \"1 Introduction\",\n  \"1.1 Background\",\n  \"2 Methods\"\n]\n```\n\n- 1 Introduction\n  - 1.1 Background\n- 2 Methods\n";

    #[test]
    fn test_extract_titles() {
        let titles = extract_chapter_titles(RESPONSE).unwrap();
        assert_eq!(titles, vec!["1 Introduction", "1.1 Background", "2 Methods"]);
    }

    #[test]
    fn test_strip_keeps_outline() {
        assert_eq!(
            strip_structure_json(RESPONSE),
            "- 1 Introduction\n  - 1.1 Background\n- 2 Methods\n"
        );
    }

    #[test]
    fn test_strip_drops_prose_after_fence() {
        let text = "```json\n[\"1 Intro\"]\n```\nThese are all chapters.\n\n- 1 Intro\n";
        assert_eq!(strip_structure_json(text), "- 1 Intro\n");
    }

    #[test]
    fn test_strip_without_blank_line_keeps_rest() {
        let text = "```json\n[\"1 Intro\"]\n```\n- 1 Intro\n";
        assert_eq!(strip_structure_json(text), "- 1 Intro\n");
    }

    #[test]
    fn test_missing_block() {
        assert!(matches!(
            extract_chapter_titles("No chapters here.\n"),
            Err(OutlineError::MissingJsonBlock)
        ));
        assert_eq!(strip_structure_json("plain\n"), "plain\n");
    }

    #[test]
    fn test_multiple_blocks_rejected() {
        let text = "```json\n[\"1 A\"]\n```\n```json\n[\"2 B\"]\n```\n";
        assert!(matches!(
            extract_chapter_titles(text),
            Err(OutlineError::AmbiguousJsonBlocks { count: 2 })
        ));
    }

    #[test]
    fn test_unterminated_block() {
        assert!(matches!(
            extract_chapter_titles("```json\n[\"1 A\"]\n"),
            Err(OutlineError::UnterminatedJsonBlock)
        ));
    }

    #[test]
    fn test_non_string_array_rejected() {
        assert!(matches!(
            extract_chapter_titles("```json\n{\"title\": 1}\n```\n"),
            Err(OutlineError::InvalidJson { .. })
        ));
    }
}
