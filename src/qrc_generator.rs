use std::fmt::{self, Write as FmtWrite};

use crate::error::Result;
use crate::generator_utils::{accept_prefix_words, plan_rows};
use crate::lyric::Lyric;
use crate::qrc_codec::encrypt_qrc;
use crate::settings::ParserSettings;
use crate::types::Line;
use crate::utils::{ZERO_WIDTH_SPACE, encode_entities};

/// 能写进 LyricContent 头部的元数据键
const HEADER_KEYS: [&str; 6] = ["ti", "ar", "al", "by", "offset", "length"];

fn write_line(rows: &mut Vec<String>, line: &Line) -> fmt::Result {
    let start = line.start_time;
    let duration = line.duration_ms();

    for plan in plan_rows(line) {
        let accepted = if plan.words.is_empty() {
            Vec::new()
        } else {
            accept_prefix_words(&plan.words, &plan.content)
        };

        let body = if accepted.is_empty() {
            // 没有逐字时仍输出一个整行记号
            let text = if plan.content.is_empty() {
                ZERO_WIDTH_SPACE
            } else {
                plan.content.as_str()
            };
            format!("{text}({start},{duration})")
        } else {
            let mut word_start = start;
            let mut body = String::new();
            for (text, d) in accepted {
                write!(body, "{text}({word_start},{d})")?;
                word_start = word_start.saturating_add(d);
            }
            body
        };
        rows.push(format!("[{start},{duration}]{body}"));
    }
    Ok(())
}

/// 生成 `LyricContent` 属性的原始文本 (未转义)。
pub fn generate_lyric_content(lyric: &Lyric) -> Result<String> {
    let mut rows = Vec::new();
    for key in HEADER_KEYS {
        if let Some(value) = lyric.metadata().get(key) {
            rows.push(format!("[{key}:{value}]"));
        }
    }
    for line in lyric.lines() {
        write_line(&mut rows, line)?;
    }
    Ok(rows.join("\n"))
}

/// 生成 QRC 的 XML 文档。
pub fn generate_qrc_xml(lyric: &Lyric) -> Result<String> {
    Ok(format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<QrcInfos>\n  <Lyric_1 LyricContent=\"{}\"/>\n</QrcInfos>",
        encode_entities(&generate_lyric_content(lyric)?)
    ))
}

/// 生成加密后的 QRC 文件。
pub fn generate_qrc(lyric: &Lyric, settings: &ParserSettings) -> Result<Vec<u8>> {
    let xml = generate_qrc_xml(lyric)?;
    let bytes = encrypt_qrc(&xml, settings)?;
    log::debug!(target: "[QRC 生成]", "XML {} 字节，输出 {} 字节", xml.len(), bytes.len());
    Ok(bytes)
}
