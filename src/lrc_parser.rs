use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::lyric::Lyric;
use crate::settings::ParserSettings;
use crate::types::{Line, MetaValue, Metadata, Word};
use crate::utils::{format_lrc_time_ms, strip_bom};

/// 以 `[xxx:yyy]` 开头的行才会被处理
static LINE_TIME_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[[^:]+:[^\]]*\]").expect("未能编译 LINE_TIME_TAG_REGEX"));
/// 旧式 `[开始毫秒,持续毫秒]` 行首
static ALT_LINE_STYLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\d+),(\d+)\]").expect("未能编译 ALT_LINE_STYLE_REGEX"));
static ALT_WORD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(0,(\d+)\)").expect("未能编译 ALT_WORD_REGEX"));
static TIME_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(\d+):(\d+)(?:[.:](\d+))?\]").expect("未能编译 TIME_TAG_REGEX")
});
static WORD_TIME_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(\d+)>").expect("未能编译 WORD_TIME_TAG_REGEX"));
static META_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[([a-z#]+):([^\]]*)\]").expect("未能编译 META_TAG_REGEX"));

/// 解析 LRC / TRC 文件。
pub fn parse_lrc(bytes: &[u8], settings: &ParserSettings) -> Result<Lyric> {
    let text = String::from_utf8_lossy(bytes);
    Ok(Lyric::from_canonical_text(Metadata::new(), &text, settings))
}

/// 把规范文本逐行解析为原始行，元数据写入 `metadata`。
///
/// 返回的行还没有经过合并、排序和时长推断。
pub fn parse_lrc_text(text: &str, metadata: &mut Metadata) -> Vec<Line> {
    let mut lines = Vec::new();
    for raw_line in strip_bom(text).lines() {
        let line = rewrite_alt_line_style(raw_line);
        if !LINE_TIME_TAG_REGEX.is_match(&line) {
            continue;
        }
        if let Some(caps) = META_TAG_REGEX.captures(&line) {
            apply_meta_tag(metadata, &caps[1], &caps[2]);
        } else if TIME_TAG_REGEX.is_match(&line) {
            lines.extend(parse_lyric_line(&line));
        }
    }
    lines
}

/// `[开始毫秒,x]` 改写为 `[mm:ss.fff]`，`(0,毫秒)` 改写为 `<毫秒>`。
///
/// 分钟取小时内的分钟数，超过一小时的部分会丢失。
fn rewrite_alt_line_style(line: &str) -> Cow<'_, str> {
    let Some(caps) = ALT_LINE_STYLE_REGEX.captures(line) else {
        return Cow::Borrowed(line);
    };
    let start_ms: u64 = caps[1].parse().unwrap_or(0);
    let minute_of_hour = (start_ms / 60000) % 60;
    let rewritten_tag = format_lrc_time_ms(minute_of_hour * 60000 + start_ms % 60000);
    let rest = &line[caps.get(0).map_or(0, |m| m.end())..];
    let rest = ALT_WORD_REGEX.replace_all(rest, "<$1>");
    Cow::Owned(format!("{rewritten_tag}{rest}"))
}

fn apply_meta_tag(metadata: &mut Metadata, tag: &str, value: &str) {
    let tag = tag.to_lowercase();
    match tag.as_str() {
        "ar" | "au" | "ti" | "al" | "by" | "re" | "ve" | "key" | "sign" | "qq" | "id"
        | "hash" | "length" => metadata.insert(tag, value),
        "total" => {
            let total_ms: u64 = value.trim().parse().unwrap_or(0);
            let seconds = total_ms.saturating_add(500) / 1000;
            metadata.insert("length", format!("{:02}:{:02}", seconds / 60, seconds % 60));
        }
        "offset" => {
            metadata.insert("offset", MetaValue::Number(parse_leading_int(value)));
        }
        _ => {}
    }
}

/// 取开头的整数部分，解析失败为 0。
pub(crate) fn parse_leading_int(value: &str) -> i64 {
    let trimmed = value.trim();
    let end = trimmed
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(trimmed.len(), |(i, _)| i);
    trimmed[..end].parse().unwrap_or(0)
}

/// 解析时间标签中的毫秒部分，不足三位时右补 0。
fn parse_fraction_ms(fraction: &str) -> u64 {
    let digits: String = fraction.chars().take(3).collect();
    format!("{digits:0<3}").parse().unwrap_or(0)
}

/// 解析 `[mm:ss.fff]` 形式的时长，例如 `length` 元数据。
pub(crate) fn parse_time_tag_ms(text: &str) -> Option<u64> {
    let caps = TIME_TAG_REGEX.captures(text)?;
    let minutes: u64 = caps[1].parse().ok()?;
    let seconds: u64 = caps[2].parse().ok()?;
    let fraction = caps.get(3).map_or(0, |m| parse_fraction_ms(m.as_str()));
    minutes
        .checked_mul(60)?
        .checked_add(seconds)?
        .checked_mul(1000)?
        .checked_add(fraction)
}

fn parse_lyric_line(line: &str) -> Vec<Line> {
    let start_times: Vec<u64> = TIME_TAG_REGEX
        .find_iter(line)
        .filter_map(|m| parse_time_tag_ms(m.as_str()))
        .collect();
    let time_text = TIME_TAG_REGEX.replace_all(line, "");

    let durations: Vec<u64> = WORD_TIME_TAG_REGEX
        .captures_iter(&time_text)
        .map(|caps| caps[1].parse().unwrap_or(0))
        .collect();

    let words: Vec<Word> = if durations.is_empty() {
        vec![Word::whole_line(time_text.trim())]
    } else {
        // 第一个标签之前的文本不属于任何字
        WORD_TIME_TAG_REGEX
            .split(&time_text)
            .skip(1)
            .zip(durations)
            .map(|(text, duration)| Word::new(text, duration))
            .collect()
    };
    let line_text = WORD_TIME_TAG_REGEX.replace_all(&time_text, "");
    let line_text = line_text.trim();

    start_times
        .into_iter()
        .map(|start| Line::new(start, line_text, words.clone()))
        .collect()
}
