use std::fmt::{self, Write as FmtWrite};

use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;

use crate::error::{DecodeError, Result};
use crate::lyric::Lyric;
use crate::qrc_codec::decrypt_qrc;
use crate::settings::ParserSettings;
use crate::types::Metadata;
use crate::utils::{ZERO_WIDTH_SPACE, decode_entities, format_lrc_time_ms};

// 内容里可能有未转义的引号，先按 `"/>` 收尾匹配，失败再退到第一个引号
static LYRIC_CONTENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<Lyric_\d+\b[^>]*?LyricContent\s*=\s*"([\s\S]*?)"\s*/>"#)
        .expect("未能编译 LYRIC_CONTENT_REGEX")
});
static LYRIC_CONTENT_LOOSE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<Lyric_\d+\b[^>]*?LyricContent\s*=\s*"([\s\S]*?)""#)
        .expect("未能编译 LYRIC_CONTENT_LOOSE_REGEX")
});
static HEADER_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*\[(ti|ar|al|by|offset|length):[^\]]*\]\s*$")
        .expect("未能编译 HEADER_TAG_REGEX")
});
/// 行时间戳 `[开始,时长]`
static LINE_TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\[(\d+)\s*,\s*(\d+)\]\s*(.*)$").expect("未能编译 LINE_TIMESTAMP_REGEX")
});
/// 字时间戳 `(开始,时长)`，文本在它前面
static WORD_TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\((\d+)\s*,\s*(\d+)\)").expect("未能编译 WORD_TIMESTAMP_REGEX")
});

/// 解析 QRC 文件。
pub fn parse_qrc(bytes: &[u8], settings: &ParserSettings) -> Result<Lyric> {
    let xml = decrypt_qrc(bytes, settings)?;
    let canonical = qrc_xml_to_canonical(&xml)?;
    if canonical.trim().is_empty() {
        return Err(DecodeError::MissingPayload("QRC 转换结果为空".to_string()).into());
    }
    Ok(Lyric::from_canonical_text(
        Metadata::new(),
        &canonical,
        settings,
    ))
}

/// 把解密后的 XML 转为规范文本。
///
/// 优先读取 `Lyric_N` 元素的 `LyricContent` 属性；没有时退回到
/// 带 `BeginTime`/`Duration` 属性的元素结构。
pub fn qrc_xml_to_canonical(xml: &str) -> std::result::Result<String, DecodeError> {
    let content = LYRIC_CONTENT_REGEX
        .captures(xml)
        .or_else(|| LYRIC_CONTENT_LOOSE_REGEX.captures(xml))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty());

    match content {
        Some(raw) => Ok(lyric_content_to_canonical(&decode_entities(raw))?),
        None => {
            log::debug!(target: "[QRC 解析]", "未找到 LyricContent，按元素结构解析");
            timed_elements_to_canonical(xml)
        }
    }
}

fn is_parens_only(text: &str) -> bool {
    text.chars().all(|c| c.is_whitespace() || c == '(' || c == ')')
}

fn lyric_content_to_canonical(
    content: &str,
) -> std::result::Result<String, fmt::Error> {
    let mut out: Vec<String> = Vec::new();

    for line in content.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if HEADER_TAG_REGEX.is_match(line) {
            out.push(line.trim().to_string());
            continue;
        }

        let Some(caps) = LINE_TIMESTAMP_REGEX.captures(line) else {
            if !line.trim().is_empty() {
                out.push(line.to_string());
            }
            continue;
        };

        let start: u64 = caps[1].parse().unwrap_or(0);
        let body = caps.get(3).map_or("", |m| m.as_str());
        let mut converted = format_lrc_time_ms(start);
        let mut last = 0;

        for word_caps in WORD_TIMESTAMP_REGEX.captures_iter(body) {
            let Some(whole) = word_caps.get(0) else {
                continue;
            };
            let text = &body[last..whole.start()];
            last = whole.end();
            // 分组用的括号片段没有实际文本
            if is_parens_only(text) {
                continue;
            }
            let duration: u64 = word_caps[2].parse().unwrap_or(0);
            let text = if text == ZERO_WIDTH_SPACE { "" } else { text };
            write!(converted, "<{duration}>{text}")?;
        }

        let tail = &body[last..];
        if !is_parens_only(tail) {
            converted.push_str(tail);
        }
        out.push(converted);
    }

    Ok(out.join("\n"))
}

/// 读取数字属性，`names` 中任意一个命中即可。
fn numeric_attr(
    e: &BytesStart,
    names: &[&[u8]],
) -> std::result::Result<Option<u64>, DecodeError> {
    for attr in e.attributes() {
        let attr = attr?;
        if names.contains(&attr.key.as_ref()) {
            let value = attr.unescape_value()?;
            return Ok(value.trim().parse().ok());
        }
    }
    Ok(None)
}

struct TimedWord {
    depth: usize,
    duration: u64,
    text: String,
}

struct TimedLine {
    depth: usize,
    begin: u64,
    text: String,
    words: Vec<(u64, String)>,
    current_word: Option<TimedWord>,
}

impl TimedLine {
    fn to_canonical(&self) -> std::result::Result<String, fmt::Error> {
        let mut out = format_lrc_time_ms(self.begin);
        if self.words.is_empty() {
            out.push_str(self.text.trim());
        } else {
            for (duration, text) in &self.words {
                write!(out, "<{duration}>{text}")?;
            }
        }
        Ok(out)
    }
}

/// 元素结构：带 `BeginTime` 和 `Duration` 的元素是一行，
/// 行内带 `Duration`/`Len`/`Length` 的子元素是一个字。自闭合元素忽略。
fn timed_elements_to_canonical(xml: &str) -> std::result::Result<String, DecodeError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut current: Option<TimedLine> = None;
    let mut lines: Vec<String> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                if current.is_none() {
                    let begin = numeric_attr(&e, &[b"BeginTime"])?;
                    let duration = numeric_attr(&e, &[b"Duration"])?;
                    if let (Some(begin), Some(_)) = (begin, duration) {
                        current = Some(TimedLine {
                            depth,
                            begin,
                            text: String::new(),
                            words: Vec::new(),
                            current_word: None,
                        });
                    }
                } else if let Some(line) = current.as_mut() {
                    if line.current_word.is_none() {
                        if let Some(duration) =
                            numeric_attr(&e, &[b"Duration", b"Len", b"Length"])?
                        {
                            line.current_word = Some(TimedWord {
                                depth,
                                duration,
                                text: String::new(),
                            });
                        }
                    }
                }
            }
            Event::Text(e_text) => {
                if let Some(line) = current.as_mut() {
                    let text = e_text.unescape()?;
                    line.text.push_str(&text);
                    if let Some(word) = line.current_word.as_mut() {
                        word.text.push_str(&text);
                    }
                }
            }
            Event::CData(e_cdata) => {
                if let Some(line) = current.as_mut() {
                    let text = String::from_utf8_lossy(&e_cdata);
                    line.text.push_str(&text);
                    if let Some(word) = line.current_word.as_mut() {
                        word.text.push_str(&text);
                    }
                }
            }
            Event::End(_) => {
                let mut line_closed = false;
                if let Some(line) = current.as_mut() {
                    if let Some(word) = line.current_word.take_if(|w| w.depth == depth) {
                        line.words.push((word.duration, word.text.trim().to_string()));
                    } else if line.depth == depth {
                        line_closed = true;
                    }
                }
                if line_closed {
                    if let Some(done) = current.take() {
                        lines.push(done.to_canonical()?);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qrc_codec::encrypt_qrc;

    #[test]
    fn test_lyric_content_conversion() {
        let content = "[ti:歌名]\n[1000,1000]你(1000,400)好(1400,600)\n[2000,500]\u{200b}(2000,500)\n杂项";
        assert_eq!(
            lyric_content_to_canonical(content).unwrap(),
            "[ti:歌名]\n[00:01.000]<400>你<600>好\n[00:02.000]<500>\n杂项"
        );
    }

    #[test]
    fn test_parens_groups_and_tail() {
        let content = "[0,900]a(0,300)((300,0)b(300,600) 尾巴";
        assert_eq!(
            lyric_content_to_canonical(content).unwrap(),
            "[00:00.000]<300>a<600>b 尾巴"
        );
        assert_eq!(
            lyric_content_to_canonical("[0,900]a(0,300) ()").unwrap(),
            "[00:00.000]<300>a"
        );
    }

    #[test]
    fn test_xml_with_unescaped_quote() {
        let xml = r#"<QrcInfos><LyricInfo><Lyric_1 LyricType="1" LyricContent="[0,500]说"你"(0,500)"/></LyricInfo></QrcInfos>"#;
        assert_eq!(
            qrc_xml_to_canonical(xml).unwrap(),
            "[00:00.000]<500>说\"你\""
        );
    }

    #[test]
    fn test_entities_in_lyric_content() {
        let xml = r#"<QrcInfos><Lyric_1 LyricContent="[0,500]&lt;a&amp;b&gt;(0,500)"/></QrcInfos>"#;
        assert_eq!(qrc_xml_to_canonical(xml).unwrap(), "[00:00.000]<500><a&b>");
    }

    #[test]
    fn test_timed_elements_fallback() {
        let xml = r#"<QrcInfos>
  <Line BeginTime="1000" Duration="800"><W Duration="300"> 你 </W><W Len="500">好</W></Line>
  <Line BeginTime="2000" Duration="500">整 行</Line>
  <Line BeginTime="3000" Duration="500"/>
</QrcInfos>"#;
        assert_eq!(
            qrc_xml_to_canonical(xml).unwrap(),
            "[00:01.000]<300>你<500>好\n[00:02.000]整 行"
        );
    }

    #[test]
    fn test_parse_qrc_end_to_end() {
        let xml = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<QrcInfos>\n  <Lyric_1 LyricContent=\"[ti:测试]\n[1000,1000]你(1000,500)好(1500,500)\n[2000,1000]再见(2000,1000)\"/>\n</QrcInfos>";
        let settings = ParserSettings::default();
        let bytes = encrypt_qrc(xml, &settings).unwrap();
        let lyric = parse_qrc(&bytes, &settings).unwrap();
        assert_eq!(lyric.metadata().get_text("ti"), Some("测试"));
        assert_eq!(lyric.lines().len(), 2);
        assert_eq!(lyric.lines()[0].text, "你好");
        assert_eq!(lyric.lines()[0].words.len(), 2);
    }

    #[test]
    fn test_text_input_is_rejected() {
        let result = parse_qrc(b"[00:01.00]plain lrc", &ParserSettings::default());
        assert!(result.is_err());
    }
}
