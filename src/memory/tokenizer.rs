//! 分词模块
//!
//! 中英文混合分词，用于向量记忆的关键词检索。
//! 含 CJK 字符时用 jieba-rs；英文按空白与标点切分，但保留文件名中的 `.` `_` `-`（如 `notes.txt`、`ctrl+s` 拆成 `ctrl`/`s`）。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// 词内可保留的符号（文件名、路径片段）
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '_' | '-')
}

fn normalize(word: &str) -> Option<String> {
    let w = word
        .trim_matches(|c: char| c == '.' || c == '-' || c == '_')
        .to_lowercase();
    let keep = w.chars().count() > 1 || w.chars().next().map(is_cjk).unwrap_or(false);
    keep.then_some(w)
}

/// 智能分词：含 CJK 用 jieba 搜索引擎模式，否则按非词字符切分
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .filter(|s| s.chars().any(is_word_char))
            .filter_map(normalize)
            .collect()
    } else {
        text.split(|c: char| !is_word_char(c))
            .filter_map(normalize)
            .collect()
    }
}

pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 重叠分数（交集大小）
pub fn overlap_score(set1: &HashSet<String>, set2: &HashSet<String>) -> usize {
    set1.intersection(set2).count()
}
