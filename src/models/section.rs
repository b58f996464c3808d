//! 章节树
//!
//! 根据论文的章节编号（如 "2.1.3"）构建层级结构。
//! 节点保存在数组中，父子关系用下标表示。

/// 节点下标
pub type SectionId = usize;

/// 章节节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// 标题（去除首尾空白）
    pub title: String,
    /// 编号（标题第一个词，去除末尾的 "."）
    pub number: String,
    pub parent: Option<SectionId>,
    pub children: Vec<SectionId>,
}

impl Section {
    pub fn new(title: &str) -> Self {
        let title = title.trim().to_string();
        let number = title
            .split_whitespace()
            .next()
            .unwrap_or("")
            .trim_end_matches('.')
            .to_string();
        Self {
            title,
            number,
            parent: None,
            children: Vec::new(),
        }
    }

    /// `other` 的编号是否以 `self.number + "."` 开头
    pub fn is_parent(&self, other: &Section) -> bool {
        other
            .number
            .strip_prefix(self.number.as_str())
            .is_some_and(|rest| rest.starts_with('.'))
    }
}

/// 章节树，下标 0 为根节点
#[derive(Debug, Clone)]
pub struct SectionTree {
    nodes: Vec<Section>,
}

impl Default for SectionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionTree {
    pub const ROOT: SectionId = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![Section::new("")],
        }
    }

    pub fn get(&self, id: SectionId) -> &Section {
        &self.nodes[id]
    }

    /// 根节点的直接子章节
    pub fn top_level(&self) -> &[SectionId] {
        &self.nodes[Self::ROOT].children
    }

    /// 插入按顺序排列的标题列表
    ///
    /// 从根节点开始：最后一个子节点是新章节的父节点时向下，
    /// 当前节点不是新章节的父节点时向上，否则作为子节点追加。
    pub fn insert<S: AsRef<str>>(&mut self, titles: &[S]) {
        let mut current = Self::ROOT;
        let mut index = 0;
        while index < titles.len() {
            let section = Section::new(titles[index].as_ref());

            if let Some(&last) = self.nodes[current].children.last() {
                if self.nodes[last].is_parent(&section) {
                    current = last;
                    continue;
                }
            }
            if let Some(parent) = self.nodes[current].parent {
                if !self.nodes[current].is_parent(&section) {
                    current = parent;
                    continue;
                }
            }

            let id = self.nodes.len();
            self.nodes.push(Section {
                parent: Some(current),
                ..section
            });
            self.nodes[current].children.push(id);
            index += 1;
        }
    }

    /// 深度优先（先序）展开，包含节点自身
    pub fn flatten(&self, id: SectionId) -> Vec<String> {
        let mut titles = Vec::new();
        self.collect(id, &mut titles);
        titles
    }

    fn collect(&self, id: SectionId, titles: &mut Vec<String>) {
        titles.push(self.nodes[id].title.clone());
        for &child in &self.nodes[id].children {
            self.collect(child, titles);
        }
    }

    /// 渲染为缩进列表（不包含根节点）
    pub fn render(&self) -> String {
        let mut out = String::new();
        for &child in self.top_level() {
            self.render_node(child, 0, &mut out);
        }
        out
    }

    fn render_node(&self, id: SectionId, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str("- ");
        out.push_str(&self.nodes[id].title);
        out.push('\n');
        for &child in &self.nodes[id].children {
            self.render_node(child, depth + 1, out);
        }
    }
}
