//! 用量统计
//!
//! 记录 token 数、耗时和速率。累加时速率字段（`_rate` 结尾）不参与求和，
//! 只在最后根据累计的 token 数和耗时重新计算。

use std::fmt;

/// 推荐的显示顺序，其余字段按插入顺序排在后面
const PREFERRED_ORDER: [&str; 8] = [
    "cached_content_token_count",
    "prompt_token_count",
    "prompt_eval_duration",
    "prompt_eval_rate",
    "candidates_token_count",
    "candidates_eval_duration",
    "candidates_eval_rate",
    "total_token_count",
];

const RATE_SUFFIX: &str = "_rate";
const DURATION_SUFFIX: &str = "_duration";

/// 统计值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatValue {
    Int(u64),
    Text(String),
}

impl StatValue {
    /// 全部是数字时解析为整数，否则保留为字符串
    pub fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse() {
                return StatValue::Int(n);
            }
        }
        StatValue::Text(raw.to_string())
    }

    pub fn as_int(&self) -> Option<u64> {
        match self {
            StatValue::Int(n) => Some(*n),
            StatValue::Text(_) => None,
        }
    }
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Int(n) => write!(f, "{}", n),
            StatValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for StatValue {
    fn from(n: u64) -> Self {
        StatValue::Int(n)
    }
}

impl From<String> for StatValue {
    fn from(s: String) -> Self {
        StatValue::Text(s)
    }
}

/// 有序的统计记录
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageStats {
    entries: Vec<(String, StatValue)>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&StatValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn get_int(&self, key: &str) -> u64 {
        self.get(key).and_then(StatValue::as_int).unwrap_or(0)
    }

    /// 设置字段（已存在时保留原位置）
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<StatValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// 把一个字段累加到总计中
    ///
    /// 速率字段只保证存在，不求和；非整数值直接覆盖。
    pub fn update(&mut self, key: &str, value: &StatValue) {
        if key.ends_with(RATE_SUFFIX) {
            if self.get(key).is_none() {
                self.set(key, 0);
            }
            return;
        }
        let current = self.get(key).and_then(StatValue::as_int);
        match (current, value) {
            (Some(old), StatValue::Int(add)) => self.set(key, old + add),
            _ => self.set(key, value.clone()),
        }
    }

    /// 合并另一条记录
    pub fn merge(&mut self, other: &UsageStats) {
        for (key, value) in other.iter() {
            self.update(key, value);
        }
    }

    /// 按推荐顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StatValue)> + '_ {
        let preferred = PREFERRED_ORDER
            .iter()
            .filter_map(move |key| self.get(key).map(|v| (*key, v)));
        let rest = self
            .entries
            .iter()
            .filter(|(k, _)| !PREFERRED_ORDER.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v));
        preferred.chain(rest)
    }

    /// 根据 token 数和耗时（毫秒）重新计算速率
    ///
    /// 任一耗时小于 1ms 时不计算。
    pub fn apply_rates(&mut self) {
        let prompt_ms = self.get_int("prompt_eval_duration");
        let candidates_ms = self.get_int("candidates_eval_duration");
        if prompt_ms < 1 || candidates_ms < 1 {
            return;
        }
        let prompt_rate = self.get_int("prompt_token_count") as f64 / (prompt_ms as f64 / 1000.0);
        let candidates_rate =
            self.get_int("candidates_token_count") as f64 / (candidates_ms as f64 / 1000.0);
        self.set("prompt_eval_rate", format!("{:.2} tps", prompt_rate));
        self.set("candidates_eval_rate", format!("{:.2} tps", candidates_rate));
    }

    /// 格式化为多行文本，耗时字段显示为时:分:秒
    pub fn render(&self, prefix: &str) -> String {
        let width = self.entries.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        let mut out = String::new();
        for (key, value) in self.iter() {
            let shown = match value {
                StatValue::Int(ms) if key.ends_with(DURATION_SUFFIX) => format_elapsed(*ms),
                other => other.to_string(),
            };
            out.push_str(&format!("{}{:<width$}: {}\n", prefix, key, shown, width = width));
        }
        out
    }

    /// 写入步骤文件的 `key: value` 行
    pub fn to_lines(&self) -> String {
        self.iter().map(|(k, v)| format!("{}: {}\n", k, v)).collect()
    }
}

/// 毫秒转为 `H:MM:SS[.ffffff]`，超过一天时加上天数
pub fn format_elapsed(ms: u64) -> String {
    let days = ms / 86_400_000;
    let rem = ms % 86_400_000;
    let hours = rem / 3_600_000;
    let minutes = rem % 3_600_000 / 60_000;
    let seconds = rem % 60_000 / 1000;
    let micros = rem % 1000 * 1000;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{} day{}, ", days, if days == 1 { "" } else { "s" }));
    }
    out.push_str(&format!("{}:{:02}:{:02}", hours, minutes, seconds));
    if micros > 0 {
        out.push_str(&format!(".{:06}", micros));
    }
    out
}
