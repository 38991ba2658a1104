use std::borrow::Cow;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;

use crate::error::DecodeError;

const BOM: char = '\u{feff}';
pub const ZERO_WIDTH_SPACE: &str = "\u{200b}";

pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix(BOM).unwrap_or(text)
}

/// 去掉空白并把奇数长度的十六进制串左侧补 0。
fn clean_hex(hex_str: &str) -> String {
    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() % 2 == 0 {
        cleaned
    } else {
        format!("0{cleaned}")
    }
}

pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(hex::decode(clean_hex(hex_str))?)
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// 用循环密钥对数据逐字节异或。
pub fn xor_cyclic(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    data.iter()
        .zip(key.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

/// 两个十六进制串按字节异或，密钥循环使用。
pub fn xor_hex_strings(input_hex: &str, key_hex: &str) -> Result<String, DecodeError> {
    let input = hex_to_bytes(input_hex)?;
    let key = hex_to_bytes(key_hex)?;
    Ok(bytes_to_hex(&xor_cyclic(&input, &key)))
}

/// 解码 XML/HTML 实体。遇到无法识别的实体时退回到只替换常见实体。
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    match quick_xml::escape::unescape(text) {
        Ok(decoded) => decoded,
        Err(e) => {
            log::debug!(target: "[实体解码]", "严格解码失败，使用宽松模式: {e}");
            Cow::Owned(
                text.replace("&lt;", "<")
                    .replace("&gt;", ">")
                    .replace("&quot;", "\"")
                    .replace("&#39;", "'")
                    .replace("&apos;", "'")
                    .replace("&amp;", "&"),
            )
        }
    }
}

pub fn encode_entities(text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(text)
}

fn count_replacement_chars(text: &str) -> usize {
    text.chars().filter(|&c| c == char::REPLACEMENT_CHARACTER).count()
}

/// 自动识别 UTF-8 或 GB18030 编码的文本。
///
/// 先严格按 UTF-8 解码；失败时改用 GB18030。
/// 若 UTF-8 结果本身含有替换字符，而 GB18030 的替换字符更少，也采用 GB18030。
pub fn decode_legacy_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let bad = count_replacement_chars(text);
            if bad > 0 {
                let (gb_text, _, _) = encoding_rs::GB18030.decode(bytes);
                if count_replacement_chars(&gb_text) < bad {
                    return gb_text.into_owned();
                }
            }
            text.to_string()
        }
        Err(_) => {
            let (gb_text, _, had_errors) = encoding_rs::GB18030.decode(bytes);
            if had_errors {
                log::warn!(target: "[编码检测]", "GB18030 解码时出现无效字节");
            }
            gb_text.into_owned()
        }
    }
}

/// zlib 解压，失败时再尝试原始 DEFLATE 流。
pub fn inflate_with_fallback(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    match ZlibDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(zlib_err) => {
            log::debug!(target: "[解压]", "zlib 解压失败，尝试原始 DEFLATE: {zlib_err}");
            out.clear();
            DeflateDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(DecodeError::Decompression)?;
            Ok(out)
        }
    }
}

pub fn inflate_zlib(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(DecodeError::Decompression)?;
    Ok(out)
}

pub fn deflate_zlib(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// 将毫秒格式化为 `[mm:ss.fff]`，分钟不封顶。
pub fn format_lrc_time_ms(total_ms: u64) -> String {
    let minutes = total_ms / 60000;
    let seconds = (total_ms % 60000) / 1000;
    let milliseconds = total_ms % 1000;
    format!("[{minutes:02}:{seconds:02}.{milliseconds:03}]")
}

/// 整数均分，余数从前往后每项加 1。
pub fn even_pack(total: u64, count: usize) -> Vec<u64> {
    if count == 0 {
        return Vec::new();
    }
    let base = total / count as u64;
    let remainder = (total % count as u64) as usize;
    (0..count)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// 去掉空白和零宽空格，用于文本比对。
pub fn normalize_for_match(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{200b}')
        .collect()
}
