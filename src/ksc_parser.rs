//! KSC 卡拉 OK 脚本解析。
//!
//! KSC 是一段类 Pascal 的脚本，例如：
//!
//! ```text
//! karaoke.tag('歌名', '某首歌');
//! karaoke.add('01:01.069', '01:02.897', '终于做了这个决定', '229,264,229,...');
//! ```
//!
//! 只识别 `tag`、`rows`、`videofilename`、`audiofilename`、`internalnumber` 和 `add`，
//! 其它语句 (如 `clear`) 忽略。

use std::fmt::{self, Write as FmtWrite};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DecodeError, Result};
use crate::lyric::Lyric;
use crate::settings::ParserSettings;
use crate::types::{MetaValue, Metadata};
use crate::utils::{decode_legacy_text, format_lrc_time_ms, strip_bom};

static KARAOKE_MARKER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)karaoke\s*\.").expect("未能编译 KARAOKE_MARKER_REGEX"));
static TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^karaoke\.tag\(\s*'((?:[^'\\]|\\.)*)'\s*,\s*'((?:[^'\\]|\\.)*)'\s*\)\s*;?$",
    )
    .expect("未能编译 TAG_REGEX")
});
static ROWS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^karaoke\.rows\s*:=\s*(\d+)\s*;?$").expect("未能编译 ROWS_REGEX")
});
static ASSIGN_STR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^karaoke\.(videofilename|audiofilename)\s*:=\s*'((?:[^'\\]|\\.)*)'\s*;?$")
        .expect("未能编译 ASSIGN_STR_REGEX")
});
static ASSIGN_NUM_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^karaoke\.(internalnumber)\s*:=\s*(\d+)\s*;?$")
        .expect("未能编译 ASSIGN_NUM_REGEX")
});
static ADD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^karaoke\.add\(\s*'([^']+)'\s*,\s*'([^']+)'\s*,\s*'((?:[^'\\]|\\.)*)'\s*,\s*'([^']*)'\s*\)\s*;?$",
    )
    .expect("未能编译 ADD_REGEX")
});
/// `mm:ss`、`mm:ss.f` 到 `mm:ss.fff`，小数部分也可用冒号分隔，分钟不限位数
static KSC_TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+):(\d{1,2})(?:[.:](\d{1,3}))?$").expect("未能编译 KSC_TIME_REGEX")
});

/// 解析 KSC 脚本，支持 UTF-8 和 GB18030 编码。
pub fn parse_ksc(bytes: &[u8], settings: &ParserSettings) -> Result<Lyric> {
    let decoded = decode_legacy_text(bytes);
    let text = strip_bom(&decoded);
    if !KARAOKE_MARKER_REGEX.is_match(text) {
        return Err(DecodeError::NotThisFormat("KSC").into());
    }

    let mut metadata = Metadata::new();
    let canonical = ksc_script_to_canonical(text, &mut metadata)?;
    Ok(Lyric::from_canonical_text(metadata, &canonical, settings))
}

/// 去掉引号外的 `//` 行注释。
fn strip_line_comment(line: &str) -> &str {
    let mut in_quote = false;
    let mut escaped = false;
    let mut prev_slash = false;

    for (idx, ch) in line.char_indices() {
        if in_quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '\'' {
                in_quote = false;
            }
            continue;
        }
        match ch {
            '\'' => {
                in_quote = true;
                prev_slash = false;
            }
            '/' if prev_slash => return &line[..idx - 1],
            '/' => prev_slash = true,
            _ => prev_slash = false,
        }
    }
    line
}

fn unescape_quoted(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next @ ('\\' | '\'')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(ch);
        }
    }
    out
}

fn parse_ksc_time(text: &str) -> Option<u64> {
    let caps = KSC_TIME_REGEX.captures(text.trim())?;
    let minutes: u64 = caps[1].parse().ok()?;
    let seconds: u64 = caps[2].parse().ok()?;
    let millis = match caps.get(3) {
        Some(m) => format!("{:0<3}", m.as_str()).parse().ok()?,
        None => 0,
    };
    minutes
        .checked_mul(60_000)?
        .checked_add(seconds * 1_000 + millis)
}

/// 逗号分隔的时长列表，非正数和无法解析的项记为 0。
fn parse_durations(csv: &str) -> Vec<u64> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().ok().filter(|&n| n > 0).unwrap_or(0) as u64)
        .collect()
}

fn number_or_text(raw: &str) -> MetaValue {
    raw.parse::<i64>()
        .map(MetaValue::Number)
        .unwrap_or_else(|_| MetaValue::Text(raw.to_string()))
}

/// 执行 KSC 语句，元数据写入 `metadata`，`add` 语句转为规范文本行。
pub(crate) fn ksc_script_to_canonical(
    text: &str,
    metadata: &mut Metadata,
) -> std::result::Result<String, fmt::Error> {
    let mut out = String::new();

    for raw_line in text.lines() {
        let line = strip_line_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = TAG_REGEX.captures(line) {
            let key = unescape_quoted(&caps[1]).trim().to_string();
            let value = unescape_quoted(&caps[2]).trim().to_string();
            match key.as_str() {
                "歌名" => metadata.insert("ti", value.as_str()),
                "歌手" => metadata.insert("ar", value.as_str()),
                _ => {}
            }
            metadata.insert(key, value);
        } else if let Some(caps) = ROWS_REGEX.captures(line) {
            metadata.insert("rows", number_or_text(&caps[1]));
        } else if let Some(caps) = ASSIGN_STR_REGEX.captures(line) {
            metadata.insert(caps[1].to_lowercase(), unescape_quoted(&caps[2]));
        } else if let Some(caps) = ASSIGN_NUM_REGEX.captures(line) {
            metadata.insert(caps[1].to_lowercase(), number_or_text(&caps[2]));
        } else if let Some(caps) = ADD_REGEX.captures(line) {
            let (Some(start), Some(end)) = (parse_ksc_time(&caps[1]), parse_ksc_time(&caps[2]))
            else {
                log::warn!(target: "[KSC 解析]", "跳过时间无效的语句: {line}");
                continue;
            };
            if end < start {
                log::warn!(target: "[KSC 解析]", "跳过结束早于开始的语句: {line}");
                continue;
            }

            let text = unescape_quoted(&caps[3]);
            let durations = parse_durations(&caps[4]);
            let chars: Vec<char> = text.chars().collect();

            out.push_str(&format_lrc_time_ms(start));
            if !chars.is_empty() && durations.len() == chars.len() {
                for (ch, d) in chars.iter().zip(&durations) {
                    write!(out, "<{d}>{ch}")?;
                }
            } else {
                write!(out, "<{}>{text}", end - start)?;
            }
            out.push('\n');
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "karaoke := CreateKaraokeObject;\n\
karaoke.rows := 2;\n\
karaoke.clear;\n\
karaoke.tag('歌名', '测试歌曲'); // 标题\n\
karaoke.tag('歌手', '某人');\n\
karaoke.tag('作词', 'It\\'s me');\n\
karaoke.videofilename := 'a.mpg';\n\
karaoke.internalnumber := 1798;\n\
karaoke.add('00:01.000', '00:02.000', '你好', '400,600');\n\
karaoke.add('00:02.5', '00:04.000', 'abc', '100,200');\n\
karaoke.add('00:05.000', '00:04.000', '倒序', '1');\n";

    #[test]
    fn test_script_to_canonical() {
        let mut meta = Metadata::new();
        let canonical = ksc_script_to_canonical(SAMPLE, &mut meta).unwrap();
        assert_eq!(
            canonical,
            "[00:01.000]<400>你<600>好\n[00:02.500]<1500>abc\n",
            "字数与时长数不符时整句使用总时长，结束早于开始的语句跳过"
        );
        assert_eq!(meta.get_text("ti"), Some("测试歌曲"));
        assert_eq!(meta.get_text("歌名"), Some("测试歌曲"));
        assert_eq!(meta.get_text("ar"), Some("某人"));
        assert_eq!(meta.get_text("作词"), Some("It's me"));
        assert_eq!(meta.get_number("rows"), Some(2));
        assert_eq!(meta.get_text("videofilename"), Some("a.mpg"));
        assert_eq!(meta.get_number("internalnumber"), Some(1798));
    }

    #[test]
    fn test_comment_inside_quotes_is_kept() {
        assert_eq!(
            strip_line_comment("karaoke.tag('url', 'http://x'); // 注释"),
            "karaoke.tag('url', 'http://x'); "
        );
        assert_eq!(strip_line_comment("// 全部注释"), "");
        assert_eq!(strip_line_comment("karaoke.tag('a\\'//', 'b')"), "karaoke.tag('a\\'//', 'b')");
    }

    #[test]
    fn test_parse_ksc_time() {
        assert_eq!(parse_ksc_time("01:02.5"), Some(62_500));
        assert_eq!(parse_ksc_time("1:02:05"), Some(62_050));
        assert_eq!(parse_ksc_time("01:02"), Some(62_000));
        assert_eq!(parse_ksc_time("1:2:3:4"), None);
        assert_eq!(parse_ksc_time("120:00.000"), Some(7_200_000));
        assert_eq!(parse_ksc_time("999999999999999999:00"), None, "溢出按无效时间处理");
    }

    #[test]
    fn test_empty_text_add() {
        let mut meta = Metadata::new();
        let canonical =
            ksc_script_to_canonical("karaoke.add('00:01.000', '00:01.300', '', '');", &mut meta)
                .unwrap();
        assert_eq!(canonical, "[00:01.000]<300>\n");
    }

    #[test]
    fn test_requires_karaoke_marker() {
        let result = parse_ksc(b"[00:01.00]lrc", &ParserSettings::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_gb18030() {
        let (bytes, _, _) = encoding_rs::GB18030.encode(SAMPLE);
        let lyric = parse_ksc(&bytes, &ParserSettings::default()).unwrap();
        assert_eq!(lyric.metadata().get_text("ti"), Some("测试歌曲"));
        assert_eq!(lyric.lines().len(), 2);
        assert_eq!(lyric.lines()[0].text, "你好");
    }
}
