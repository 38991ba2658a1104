use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DecodeError, Result};
use crate::lyric::Lyric;
use crate::settings::ParserSettings;
use crate::types::{MetaValue, Metadata};
use crate::utils::{ZERO_WIDTH_SPACE, format_lrc_time_ms, inflate_zlib, strip_bom, xor_cyclic};

pub(crate) const KRC_HEADER: &[u8; 4] = b"krc1";

/// KRC 解密用的 16 字节循环异或密钥。
pub(crate) const KRC_XOR_KEY: [u8; 16] = [
    0x40, 0x47, 0x61, 0x77, 0x5E, 0x32, 0x74, 0x47, 0x51, 0x36, 0x31, 0x2D, 0xCE, 0xD2, 0x6E, 0x69,
];

static TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[([a-z#]+):([^\]]*)\]").expect("未能编译 TAG_REGEX"));
/// 行时间戳 `[开始毫秒,持续毫秒]`
static KRC_LINE_TIME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+),(\d+)\]").expect("未能编译 KRC_LINE_TIME_REGEX"));
/// 音节 `<偏移,时长,类型>文本`
static KRC_SYLLABLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(\d+),(\d+),(\d+)>([^<>]*)").expect("未能编译 KRC_SYLLABLE_REGEX")
});

/// 去掉文件头、异或、zlib 解压，得到 KRC 明文。
pub fn decrypt_krc(bytes: &[u8]) -> std::result::Result<String, DecodeError> {
    let Some(payload) = bytes.strip_prefix(KRC_HEADER.as_slice()) else {
        return Err(DecodeError::InvalidHeader("缺少 krc1 文件头".to_string()));
    };
    let zipped = xor_cyclic(payload, &KRC_XOR_KEY);
    let plain = String::from_utf8(inflate_zlib(&zipped)?)?;
    Ok(strip_bom(&plain).to_string())
}

/// 解析 KRC 文件。
pub fn parse_krc(bytes: &[u8], settings: &ParserSettings) -> Result<Lyric> {
    let plain = decrypt_krc(bytes)?;
    let mut metadata = Metadata::new();
    let canonical = krc_text_to_canonical(&plain, &mut metadata);
    Ok(Lyric::from_canonical_text(metadata, &canonical, settings))
}

/// KRC 明文改写为规范文本。`language` 标签直接解码写入元数据。
pub(crate) fn krc_text_to_canonical(plain: &str, metadata: &mut Metadata) -> String {
    let mut out = String::new();
    for line in plain.lines() {
        if let Some(caps) = TAG_REGEX.captures(line) {
            if caps[1].eq_ignore_ascii_case("language") {
                match decode_language_tag(&caps[2]) {
                    Ok(value) => metadata.insert("language", MetaValue::Json(value)),
                    Err(e) => log::warn!(target: "[KRC 解析]", "language 标签解码失败: {e}"),
                }
            } else {
                out.push_str(line);
                out.push('\n');
            }
        } else if KRC_LINE_TIME_REGEX.is_match(line) {
            out.push_str(&rewrite_lyric_line(line));
            out.push('\n');
        }
    }
    out
}

fn decode_language_tag(encoded: &str) -> std::result::Result<serde_json::Value, DecodeError> {
    let raw = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
    let json = String::from_utf8(raw)?;
    Ok(serde_json::from_str(&json)?)
}

/// `[开始,时长]<偏移,时长,0>字` 改写为 `[mm:ss.fff]<时长>字`，行内其它文本丢弃。
fn rewrite_lyric_line(line: &str) -> String {
    let mut result = String::new();
    for caps in KRC_LINE_TIME_REGEX.captures_iter(line) {
        let start: u64 = caps[1].parse().unwrap_or(0);
        result.push_str(&format_lrc_time_ms(start));
    }
    let rest = KRC_LINE_TIME_REGEX.replace_all(line, "");
    for caps in KRC_SYLLABLE_REGEX.captures_iter(&rest) {
        let text = &caps[4];
        let text = if text == ZERO_WIDTH_SPACE { "" } else { text };
        result.push_str(&format!("<{}>{}", &caps[2], text));
    }
    result
}
