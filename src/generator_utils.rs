//! KRC、QRC、KSC 生成器共用的子行与逐字选择逻辑。

use crate::types::{Line, Word};
use crate::utils::{ZERO_WIDTH_SPACE, normalize_for_match};

/// 单个子行的生成计划。
#[derive(Debug)]
pub(crate) struct RowPlan<'a> {
    /// 清理后的子行文本
    pub content: String,
    /// 归属该子行的逐字，伪逐字行总是为空
    pub words: Vec<&'a Word>,
}

pub(crate) fn row_texts(line: &Line) -> Vec<String> {
    if line.row_texts.is_empty() {
        line.text.split('\n').map(str::to_string).collect()
    } else {
        line.row_texts.clone()
    }
}

/// 内容末尾误接了其它子行的文本时裁掉。只裁严格后缀，相同的子行保持原样。
fn trim_foreign_suffix(content: &str, rows: &[String], self_idx: usize) -> String {
    let content_norm = normalize_for_match(content);
    for (j, other) in rows.iter().enumerate() {
        if j == self_idx {
            continue;
        }
        let other_norm = normalize_for_match(other);
        if other_norm.is_empty()
            || other_norm.len() >= content_norm.len()
            || !content_norm.ends_with(&other_norm)
        {
            continue;
        }
        let mut to_drop = other_norm.chars().count();
        let mut cut = content.len();
        for (idx, ch) in content.char_indices().rev() {
            if to_drop == 0 {
                break;
            }
            cut = idx;
            if !ch.is_whitespace() && ch != '\u{200b}' {
                to_drop -= 1;
            }
        }
        return content[..cut].to_string();
    }
    content.to_string()
}

/// 为每个子行挑选内容和逐字，并修正合并时可能错位的子行号。
pub(crate) fn plan_rows(line: &Line) -> Vec<RowPlan<'_>> {
    let rows = row_texts(line);
    let norm_rows: Vec<String> = rows.iter().map(|r| normalize_for_match(r)).collect();
    let all_words: Vec<&Word> = line.words.iter().filter(|w| !w.single_line).collect();
    let all_words_norm =
        normalize_for_match(&all_words.iter().map(|w| w.text.as_str()).collect::<String>());
    let global_match = if all_words_norm.is_empty() {
        None
    } else {
        norm_rows.iter().position(|r| *r == all_words_norm)
    };

    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let content = trim_foreign_suffix(row.split('\n').next().unwrap_or(""), &rows, i);
            if line.pseudo_per_word {
                return RowPlan {
                    content,
                    words: Vec::new(),
                };
            }

            let mut words: Vec<&Word> = all_words
                .iter()
                .copied()
                .filter(|w| w.line_no == i + 1)
                .collect();
            if !words.is_empty() {
                let candidate =
                    normalize_for_match(&words.iter().map(|w| w.text.as_str()).collect::<String>());
                let self_match = !candidate.is_empty() && candidate == norm_rows[i];
                if !self_match
                    && !candidate.is_empty()
                    && norm_rows
                        .iter()
                        .enumerate()
                        .any(|(j, r)| j != i && *r == candidate)
                {
                    words.clear();
                }
            }
            if words.is_empty() && global_match == Some(i) {
                words = all_words.clone();
            }

            RowPlan { content, words }
        })
        .collect()
}

/// 逐个接受字，直到累计文本不再是子行内容的前缀。
///
/// 返回 `(文本, 取整后的时长)`，空文本以零宽空格占位。
pub(crate) fn accept_prefix_words(words: &[&Word], content: &str) -> Vec<(String, u64)> {
    let target = normalize_for_match(content);
    let mut built = String::new();
    let mut accepted = Vec::new();

    for word in words {
        let text = if word.text.is_empty() {
            ZERO_WIDTH_SPACE.to_string()
        } else {
            word.text.clone()
        };
        let next = format!("{built}{}", normalize_for_match(&text));
        if !target.is_empty() && !target.starts_with(&next) {
            break;
        }
        accepted.push((text, word.duration));
        built = next;
        if !target.is_empty() && built.len() == target.len() {
            break;
        }
    }
    accepted
}
