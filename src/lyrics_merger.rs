//! 规范文本解析后的合并管线。
//!
//! 顺序固定：去重、合并同时间戳、排序、编号与时长、最后一行时长、伪逐字。

use std::collections::{HashMap, HashSet};

use crate::lrc_parser::parse_time_tag_ms;
use crate::settings::ParserSettings;
use crate::types::{Line, Metadata, Word};
use crate::utils::even_pack;

pub fn merge_and_sort_lines(
    raw_lines: Vec<Line>,
    metadata: &Metadata,
    settings: &ParserSettings,
) -> Vec<Line> {
    let lines = deduplicate_lines(raw_lines);
    let mut lines = merge_same_timestamp_lines(lines);
    lines.sort_by_key(|line| line.start_time);
    assign_numbers_and_durations(&mut lines);
    set_last_line_duration(&mut lines, metadata, settings);
    distribute_pseudo_per_word(&mut lines);
    lines
}

/// 以完整结构的序列化结果作为身份，去掉完全相同的行。
fn deduplicate_lines(lines: Vec<Line>) -> Vec<Line> {
    let mut seen = HashSet::new();
    lines
        .into_iter()
        .filter(|line| match serde_json::to_string(line) {
            Ok(key) => seen.insert(key),
            Err(_) => true,
        })
        .collect()
}

/// 相同开始时间的行合并为多子行，后来者的字接在已有最大子行号之后。
fn merge_same_timestamp_lines(lines: Vec<Line>) -> Vec<Line> {
    let mut merged: Vec<Line> = Vec::with_capacity(lines.len());
    let mut index_by_start: HashMap<u64, usize> = HashMap::new();

    for mut line in lines {
        match index_by_start.get(&line.start_time) {
            Some(&idx) => {
                let existing = &mut merged[idx];
                let row_offset = existing.words.iter().map(|w| w.line_no).max().unwrap_or(0);
                existing.text.push('\n');
                existing.text.push_str(&line.text);
                for word in &mut line.words {
                    word.line_no += row_offset;
                }
                existing.words.append(&mut line.words);
            }
            None => {
                index_by_start.insert(line.start_time, merged.len());
                merged.push(line);
            }
        }
    }
    merged
}

fn assign_numbers_and_durations(lines: &mut [Line]) {
    let next_starts: Vec<Option<u64>> = (0..lines.len())
        .map(|i| lines.get(i + 1).map(|next| next.start_time))
        .collect();

    for (i, (line, next_start)) in lines.iter_mut().zip(next_starts).enumerate() {
        if let Some(next_start) = next_start {
            line.duration = next_start.saturating_sub(line.start_time) as f64;
        }
        line.no = i + 1;
        line.row_texts = line.text.split('\n').map(str::to_string).collect();
        line.text = line.row_texts.first().cloned().unwrap_or_default();
    }
}

fn set_last_line_duration(lines: &mut [Line], metadata: &Metadata, settings: &ParserSettings) {
    let Some(last) = lines.last_mut() else {
        return;
    };
    let song_length = metadata
        .get_text("length")
        .and_then(|len| parse_time_tag_ms(&format!("[{len}]")));

    last.duration = match song_length {
        Some(length) if !settings.last_line_infinite => {
            let remaining = length as f64 - last.start_time as f64;
            if remaining > 0.0 {
                remaining
            } else {
                f64::INFINITY
            }
        }
        _ => f64::INFINITY,
    };
}

/// 没有真正逐字时间的行，按码点均分时长生成伪逐字。
fn distribute_pseudo_per_word(lines: &mut [Line]) {
    for line in lines.iter_mut() {
        let timed: Vec<&Word> = line.words.iter().filter(|w| w.has_timing()).collect();
        let non_empty_rows = line
            .row_texts
            .iter()
            .filter(|row| !row.trim().is_empty())
            .count();

        let mut per_row: HashMap<usize, usize> = HashMap::new();
        for word in &timed {
            *per_row.entry(word.line_no.max(1)).or_default() += 1;
        }
        let whole_row_tokens = !timed.is_empty()
            && per_row.values().all(|&count| count <= 1)
            && timed.len() <= non_empty_rows;

        if !(timed.is_empty() || whole_row_tokens) {
            continue;
        }

        let mut total = if line.duration.is_finite() && line.duration > 0.0 {
            line.duration.round() as u64
        } else {
            0
        };
        if total == 0 {
            total = timed.iter().map(|w| w.duration).max().unwrap_or(0);
        }
        if total == 0 {
            continue;
        }

        let row_idx = match line.row_texts.first() {
            Some(first) if !first.trim().is_empty() => 0,
            _ => line
                .row_texts
                .iter()
                .position(|row| !row.trim().is_empty())
                .unwrap_or(0),
        };
        let Some(row_text) = line.row_texts.get(row_idx) else {
            continue;
        };
        let chars: Vec<char> = row_text.chars().collect();
        if chars.is_empty() {
            continue;
        }

        line.words = chars
            .iter()
            .zip(even_pack(total, chars.len()))
            .map(|(ch, duration)| Word {
                line_no: row_idx + 1,
                ..Word::new(ch.to_string(), duration)
            })
            .collect();
        line.text = line.row_texts.first().cloned().unwrap_or_default();
        line.pseudo_per_word = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lrc_parser::parse_lrc_text;

    fn finalize(text: &str) -> (Vec<Line>, Metadata) {
        let mut meta = Metadata::new();
        let raw = parse_lrc_text(text, &mut meta);
        let lines = merge_and_sort_lines(raw, &meta, &ParserSettings::default());
        (lines, meta)
    }

    #[test]
    fn test_dedup_merge_and_sort() {
        let (lines, _) = finalize("[00:03.000]B\n[00:01.000]A\n[00:01.000]A\n[00:01.000]译文");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].start_time, 1000);
        assert_eq!(lines[0].row_texts, vec!["A", "译文"]);
        assert_eq!(lines[0].text, "A");
        assert_eq!(lines[0].no, 1);
        assert_eq!(lines[1].no, 2);
        assert_eq!(lines[0].duration, 2000.0);
        assert!(lines[1].duration.is_infinite(), "没有 length 元数据时最后一行为无穷大");
    }

    #[test]
    fn test_merged_words_continue_row_numbers() {
        let (lines, _) = finalize("[00:01.000]<100>a<100>b\n[00:01.000]<100>c<100>d\n[00:02.000]x");
        let rows: Vec<usize> = lines[0].words.iter().map(|w| w.line_no).collect();
        assert_eq!(rows, vec![1, 1, 2, 2]);
        assert!(!lines[0].pseudo_per_word);
    }

    #[test]
    fn test_length_metadata_and_pseudo_words() {
        let (lines, _) = finalize("[length:02:05]\n[00:01.000]<500>He<500>llo\n[00:02.000]World");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].duration, 1000.0);
        assert_eq!(lines[0].words.iter().map(|w| w.duration).sum::<u64>(), 1000);
        assert!(!lines[0].pseudo_per_word);

        assert_eq!(lines[1].duration, 123_000.0);
        assert!(lines[1].pseudo_per_word);
        assert_eq!(lines[1].words.len(), 5);
        assert!(lines[1].words.iter().all(|w| w.duration == 24_600));
    }

    #[test]
    fn test_length_before_last_start_is_infinite() {
        let (lines, _) = finalize("[length:00:01]\n[00:05.000]late");
        assert!(lines[0].duration.is_infinite());
    }

    #[test]
    fn test_last_line_infinite_option() {
        let mut meta = Metadata::new();
        let raw = parse_lrc_text("[length:02:05]\n[00:01.000]x", &mut meta);
        let settings = ParserSettings {
            last_line_infinite: true,
            ..ParserSettings::default()
        };
        let lines = merge_and_sort_lines(raw, &meta, &settings);
        assert!(lines[0].duration.is_infinite());
    }

    #[test]
    fn test_pseudo_even_split() {
        let (lines, _) = finalize("[00:00.000]一二三\n[00:00.100]next");
        let durations: Vec<u64> = lines[0].words.iter().map(|w| w.duration).collect();
        assert_eq!(durations, vec![34, 33, 33]);
        assert!(lines[0].has_per_word_timing());
    }

    #[test]
    fn test_whole_row_token_uses_word_duration_when_infinite() {
        let (lines, _) = finalize("[00:01.000]<300>abc");
        let line = &lines[0];
        assert!(line.duration.is_infinite());
        assert!(line.pseudo_per_word);
        let durations: Vec<u64> = line.words.iter().map(|w| w.duration).collect();
        assert_eq!(durations, vec![100, 100, 100]);
    }

    #[test]
    fn test_empty_first_row_uses_next_row() {
        let (lines, _) = finalize("[00:01.000]\n[00:01.000]ab\n[00:02.000]z");
        let line = &lines[0];
        assert!(line.pseudo_per_word);
        assert!(line.words.iter().all(|w| w.line_no == 2));
        assert_eq!(line.text, "");
    }

    #[test]
    fn test_infinite_single_line_stays_whole() {
        let (lines, _) = finalize("[00:01.000]end");
        assert!(!lines[0].pseudo_per_word);
        assert!(lines[0].words[0].single_line);
    }
}
