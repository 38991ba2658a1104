use std::fmt::{self, Write as FmtWrite};

use crate::error::Result;

use crate::generator_utils::{RowPlan, plan_rows, row_texts};
use crate::lyric::Lyric;
use crate::types::{Line, MetaValue};
use crate::utils::{even_pack, format_lrc_time_ms};

/// 不作为 `karaoke.tag` 输出的键，它们有各自的语句
const RESERVED_KEYS: [&str; 8] = [
    "ti",
    "ar",
    "歌名",
    "歌手",
    "rows",
    "videofilename",
    "audiofilename",
    "internalnumber",
];

fn escape_ksc(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

/// `mm:ss.fff`
fn ksc_time(ms: u64) -> String {
    let tag = format_lrc_time_ms(ms);
    tag.trim_start_matches('[').trim_end_matches(']').to_string()
}

/// 子行中每个码点的时长。
///
/// 逐字文本拼接后与内容一致时，把每个字的时长均分到它的码点上；
/// 否则把逐字总时长均分到整行。没有逐字时只输出一个时长。
fn row_durations(plan: &RowPlan, line_duration: u64) -> Vec<u64> {
    if plan.words.is_empty() {
        return vec![line_duration];
    }

    let char_count = plan.content.chars().count();
    let total = plan
        .words
        .iter()
        .fold(0u64, |acc, w| acc.saturating_add(w.duration));
    let fallback = || even_pack(if total > 0 { total } else { line_duration }, char_count);

    let joined: String = plan.words.iter().map(|w| w.text.as_str()).collect();
    if joined != plan.content {
        return fallback();
    }

    let per_char: Vec<u64> = plan
        .words
        .iter()
        .flat_map(|w| even_pack(w.duration, w.text.chars().count()))
        .collect();
    if per_char.len() == char_count {
        per_char
    } else {
        fallback()
    }
}

fn write_line(out: &mut String, line: &Line) -> fmt::Result {
    let start = line.start_time;
    let duration = line.duration_ms();
    let end = start.saturating_add(duration);

    for plan in plan_rows(line) {
        if plan.content.trim().is_empty() {
            continue;
        }
        let csv = row_durations(&plan, duration)
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        writeln!(
            out,
            "karaoke.add('{}', '{}', '{}', '{csv}');",
            ksc_time(start),
            ksc_time(end),
            escape_ksc(&plan.content)
        )?;
    }
    Ok(())
}

/// 生成 KSC 脚本文本。
pub fn generate_ksc(lyric: &Lyric) -> Result<String> {
    let metadata = lyric.metadata();
    let mut out = String::from("karaoke := CreateKaraokeObject;\n");

    let rows = lyric
        .lines()
        .iter()
        .map(|line| row_texts(line).len())
        .max()
        .unwrap_or(1)
        .clamp(1, 4);
    writeln!(out, "karaoke.rows := {rows};")?;
    out.push_str("karaoke.clear;\n");

    for (key, tag) in [("ti", "歌名"), ("ar", "歌手")] {
        if let Some(value) = metadata.get_text(key).filter(|v| !v.is_empty()) {
            writeln!(out, "karaoke.tag('{tag}', '{}');", escape_ksc(value))?;
        }
    }
    for key in ["videofilename", "audiofilename"] {
        if let Some(value) = metadata.get_text(key).filter(|v| !v.is_empty()) {
            writeln!(out, "karaoke.{key} := '{}';", escape_ksc(value))?;
        }
    }
    if let Some(number) = metadata.get_number("internalnumber") {
        writeln!(out, "karaoke.internalnumber := {number};")?;
    }

    for (key, value) in metadata.iter() {
        if RESERVED_KEYS.contains(&key) || matches!(value, MetaValue::Json(_)) {
            continue;
        }
        writeln!(
            out,
            "karaoke.tag('{}', '{}');",
            escape_ksc(key),
            escape_ksc(&value.to_string())
        )?;
    }

    for line in lyric.lines() {
        write_line(&mut out, line)?;
    }

    if out.ends_with('\n') {
        out.pop();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ksc_parser::parse_ksc;
    use crate::settings::ParserSettings;
    use crate::types::Metadata;

    fn parse(text: &str) -> Lyric {
        Lyric::from_canonical_text(Metadata::new(), text, &ParserSettings::default())
    }

    #[test]
    fn test_generate_ksc_script() {
        let lyric = parse("[ti:歌]\n[ar:Tom's]\n[al:专辑]\n[00:01.000]<500>你好<300>啊\n[00:02.000]整行\n[00:03.000]");
        let ksc = generate_ksc(&lyric).unwrap();
        let lines: Vec<&str> = ksc.lines().collect();
        assert_eq!(lines[0], "karaoke := CreateKaraokeObject;");
        assert_eq!(lines[1], "karaoke.rows := 1;");
        assert_eq!(lines[2], "karaoke.clear;");
        assert_eq!(lines[3], "karaoke.tag('歌名', '歌');");
        assert_eq!(lines[4], "karaoke.tag('歌手', 'Tom\\'s');");
        assert_eq!(lines[5], "karaoke.tag('al', '专辑');");
        assert_eq!(
            lines[6],
            "karaoke.add('00:01.000', '00:02.000', '你好啊', '250,250,300');"
        );
        assert_eq!(lines[7], "karaoke.add('00:02.000', '00:03.000', '整行', '1000');");
        assert_eq!(lines.len(), 8, "空行不输出");
    }

    #[test]
    fn test_mismatched_words_are_packed_evenly() {
        let words = [crate::types::Word::new("ab", 100), crate::types::Word::new("x", 1)];
        let plan = RowPlan {
            content: "abc".to_string(),
            words: words.iter().collect(),
        };
        assert_eq!(row_durations(&plan, 1000), vec![34, 34, 33]);
    }

    #[test]
    fn test_rows_clamped_and_bilingual() {
        let lyric = parse("[00:01.000]<300>你<300>好\n[00:01.000]hello\n[00:02.000]x");
        let ksc = generate_ksc(&lyric).unwrap();
        assert!(ksc.contains("karaoke.rows := 2;"));
        assert!(ksc.contains("karaoke.add('00:01.000', '00:02.000', '你好', '300,300');"));
        assert!(ksc.contains("karaoke.add('00:01.000', '00:02.000', 'hello', '1000');"));
    }

    #[test]
    fn test_huge_word_duration_saturates_total() {
        let lyric = parse("[00:00.000]<18446744073709551615>a<5>b");
        let ksc = generate_ksc(&lyric).unwrap();
        assert!(ksc.contains("'ab', '18446744073709551615,5');"));

        let words = [crate::types::Word::new("ab", u64::MAX), crate::types::Word::new("x", 5)];
        let plan = RowPlan {
            content: "abc".to_string(),
            words: words.iter().collect(),
        };
        assert_eq!(row_durations(&plan, 0).len(), 3);
    }

    #[test]
    fn test_long_timestamps_parse_back() {
        let lyric = parse("[100:00.000]<500>a\n[101:00.000]b\n[102:00.000]");
        let ksc = generate_ksc(&lyric).unwrap();
        assert!(ksc.contains("karaoke.add('100:00.000', '101:00.000', 'a', '500');"));

        let back = parse_ksc(ksc.as_bytes(), &ParserSettings::default()).unwrap();
        let starts: Vec<u64> = back.lines().iter().map(|l| l.start_time).collect();
        assert_eq!(starts, vec![6_000_000, 6_060_000]);
    }

    #[test]
    fn test_round_trip_through_parser() {
        let mut meta = Metadata::new();
        meta.insert("internalnumber", 42i64);
        meta.insert("videofilename", "a'b.mpg");
        let lyric = Lyric::from_canonical_text(
            meta,
            "[ti:歌]\n[00:01.000]<200>一<300>二\n[00:02.000]<500>三<500>四",
            &ParserSettings::default(),
        );
        let ksc = generate_ksc(&lyric).unwrap();
        let back = parse_ksc(ksc.as_bytes(), &ParserSettings::default()).unwrap();
        assert_eq!(back.metadata().get_text("ti"), Some("歌"));
        assert_eq!(back.metadata().get_number("internalnumber"), Some(42));
        assert_eq!(back.metadata().get_text("videofilename"), Some("a'b.mpg"));
        let durations: Vec<u64> = back.lines()[0].words.iter().map(|w| w.duration).collect();
        assert_eq!(durations, vec![200, 300]);
    }
}
