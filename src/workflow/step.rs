//! 步骤规划
//!
//! 先执行语言包中的固定步骤，再为章节结构中每个顶层章节执行一个扩展步骤。

use std::path::Path;

use crate::error::{AppError, AppResult};
use crate::models::{LanguagePack, SectionTree};

/// 步骤所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    /// 第 n 个固定步骤
    Fixed(usize),
    /// 第 n 个顶层章节
    Expansion(usize),
    Done,
}

impl StepPhase {
    pub fn of(index: usize, fixed_count: usize, section_count: usize) -> Self {
        if index < fixed_count {
            StepPhase::Fixed(index)
        } else if index - fixed_count < section_count {
            StepPhase::Expansion(index - fixed_count)
        } else {
            StepPhase::Done
        }
    }
}

/// 一个待执行的步骤
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub index: usize,
    /// 最终结果中的标题
    pub title: String,
    pub prompt: String,
}

/// 根据当前已知的章节结构规划第 `index` 个步骤，全部完成时返回 `None`
pub fn plan_step(pack: &LanguagePack, tree: &SectionTree, index: usize) -> Option<PlannedStep> {
    match StepPhase::of(index, pack.steps.len(), tree.top_level().len()) {
        StepPhase::Fixed(i) => {
            let step = &pack.steps[i];
            Some(PlannedStep {
                index,
                title: step.title.clone(),
                prompt: step.prompt.clone(),
            })
        }
        StepPhase::Expansion(j) => {
            let id = tree.top_level()[j];
            Some(PlannedStep {
                index,
                title: format!("## {}", tree.get(id).title),
                prompt: pack.section_prompt(&tree.flatten(id)),
            })
        }
        StepPhase::Done => None,
    }
}

/// 步骤结果的来源，每个步骤只判断一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSource {
    /// 步骤文件已存在
    Cached { text: String },
    /// 需要发送请求
    Live { prompt: String },
}

impl StepSource {
    pub async fn locate(path: &Path, prompt: &str) -> AppResult<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(StepSource::Live {
                prompt: prompt.to_string(),
            });
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;
        Ok(StepSource::Cached { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        assert_eq!(StepPhase::of(0, 7, 0), StepPhase::Fixed(0));
        assert_eq!(StepPhase::of(6, 7, 0), StepPhase::Fixed(6));
        assert_eq!(StepPhase::of(7, 7, 0), StepPhase::Done);
        assert_eq!(StepPhase::of(7, 7, 2), StepPhase::Expansion(0));
        assert_eq!(StepPhase::of(8, 7, 2), StepPhase::Expansion(1));
        assert_eq!(StepPhase::of(9, 7, 2), StepPhase::Done);
    }

    #[test]
    fn test_expansion_step_prompt() {
        let pack = LanguagePack::select(Some("en")).unwrap();
        let mut tree = SectionTree::new();
        tree.insert(&["1 Intro", "1.1 Background", "2 Methods"]);

        let fixed = pack.steps.len();
        let step = plan_step(&pack, &tree, fixed).unwrap();
        assert_eq!(step.title, "## 1 Intro");
        assert_eq!(
            step.prompt,
            pack.section_template.replace(
                "{sections}",
                &["1 Intro", "1.1 Background"].join(&pack.section_separator)
            )
        );
        assert_eq!(plan_step(&pack, &tree, fixed + 1).unwrap().title, "## 2 Methods");
        assert!(plan_step(&pack, &tree, fixed + 2).is_none());
    }

    #[tokio::test]
    async fn test_locate_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("000.md");

        let source = StepSource::locate(&path, "Translate").await.unwrap();
        assert_eq!(
            source,
            StepSource::Live {
                prompt: "Translate".to_string()
            }
        );

        tokio::fs::write(&path, "# Prompt 0\n").await.unwrap();
        let source = StepSource::locate(&path, "Translate").await.unwrap();
        assert_eq!(
            source,
            StepSource::Cached {
                text: "# Prompt 0\n".to_string()
            }
        );
    }
}
