//! QRC 文件的加解密。
//!
//! 文件结构：可选的 11 字节文件头 + 异或(三重 DES(zlib(XML)))。
//! 异或密钥是一张很长的循环十六进制表，可以通过 [`ParserSettings`] 覆盖。

use crate::des::{self, BLOCK_SIZE, Mode};
use crate::error::{DecodeError, LyricError};
use crate::settings::ParserSettings;
use crate::utils::{
    bytes_to_hex, deflate_zlib, hex_to_bytes, inflate_with_fallback, strip_bom, xor_hex_strings,
};

pub(crate) const QRC_HEADER_HEX: &str = "9825B0ACE3028368E8FC6C";

// DES 只取前 8 字节
const KEY1: &str = "!@#)(NHLiuy*$%^&";
const KEY2: &str = "123ZXC!@#)(*$%^&";
const KEY3: &str = "!@#)(*$%^&abcDEF";

const MAX_PADDING_ATTEMPTS: usize = 128;

/// 前 16 字节中可打印字符超过八成时认为是文本而不是 QRC。
pub fn looks_like_text(bytes: &[u8]) -> bool {
    let probe = &bytes[..bytes.len().min(16)];
    let printable = probe
        .iter()
        .filter(|&&c| c == 9 || c == 10 || c == 13 || (32..=126).contains(&c))
        .count();
    printable as f64 > probe.len() as f64 * 0.8
}

/// 三重 DES 解密 (D-E-D)，输出长度与输入相同。
fn triple_des_decrypt(data: &[u8]) -> Vec<u8> {
    let stage1 = des::des_process(data, &des::key_from_str(KEY1), Mode::Decrypt);
    let stage2 = des::des_process(&stage1, &des::key_from_str(KEY2), Mode::Encrypt);
    des::des_process(&stage2, &des::key_from_str(KEY3), Mode::Decrypt)
}

/// 三重 DES 加密 (E-D-E)，密钥顺序与解密相反，输出总是 8 字节对齐。
fn triple_des_encrypt(data: &[u8]) -> Vec<u8> {
    let stage1 = des::des_process_aligned(data, &des::key_from_str(KEY3), Mode::Encrypt);
    let stage2 = des::des_process_aligned(&stage1, &des::key_from_str(KEY2), Mode::Decrypt);
    des::des_process_aligned(&stage2, &des::key_from_str(KEY1), Mode::Encrypt)
}

/// 解密 QRC 文件，返回其中的 XML 文本。
pub fn decrypt_qrc(bytes: &[u8], settings: &ParserSettings) -> Result<String, DecodeError> {
    if looks_like_text(bytes) {
        return Err(DecodeError::NotThisFormat("QRC"));
    }

    let mut hex = bytes_to_hex(bytes);
    if hex.starts_with(QRC_HEADER_HEX) {
        hex.drain(..QRC_HEADER_HEX.len());
    }
    let xored = hex_to_bytes(&xor_hex_strings(&hex, &settings.qrc_xor_key_hex)?)?;

    let decrypted = triple_des_decrypt(&xored);
    let xml = String::from_utf8(inflate_with_fallback(&decrypted)?)?;
    let xml = strip_bom(&xml);

    if !contains_qrc_infos(xml) {
        return Err(DecodeError::MissingPayload(
            "解密结果中没有 QrcInfos 元素".to_string(),
        ));
    }
    Ok(xml.to_string())
}

fn contains_qrc_infos(xml: &str) -> bool {
    let lower = xml.to_ascii_lowercase();
    lower.match_indices("<qrcinfos").any(|(idx, m)| {
        lower[idx + m.len()..]
            .chars()
            .next()
            .is_some_and(|c| c == '>' || c.is_whitespace())
    })
}

/// 固定种子的 xorshift64 十六进制串，用作填充注释的内容。
///
/// 逐位加长时压缩后的长度大致逐字节增长，会依次经过 8 的各个余数。
fn padding_digits(len: usize) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            HEX[(state & 0xF) as usize] as char
        })
        .collect()
}

/// 压缩后的长度不是 8 的倍数时，在 XML 末尾追加注释重新压缩，直到对齐。
fn compress_aligned(xml: &str) -> std::io::Result<Vec<u8>> {
    let mut zipped = deflate_zlib(xml.as_bytes())?;
    if zipped.len() % BLOCK_SIZE == 0 {
        return Ok(zipped);
    }
    let digits = padding_digits(MAX_PADDING_ATTEMPTS);
    let mut attempt = 0;
    while zipped.len() % BLOCK_SIZE != 0 && attempt < MAX_PADDING_ATTEMPTS {
        let padding = &digits[..=attempt];
        zipped = deflate_zlib(format!("{xml}\n<!--p{padding}-->").as_bytes())?;
        attempt += 1;
    }
    if zipped.len() % BLOCK_SIZE != 0 {
        log::warn!(
            target: "[QRC 生成]",
            "{MAX_PADDING_ATTEMPTS} 次填充后仍未对齐，末尾将补零"
        );
    }
    Ok(zipped)
}

/// 把 XML 加密为 QRC 文件字节。
pub fn encrypt_qrc(xml: &str, settings: &ParserSettings) -> Result<Vec<u8>, LyricError> {
    let zipped =
        compress_aligned(xml).map_err(|e| LyricError::Encode(format!("QRC 压缩失败: {e}")))?;
    let encrypted = triple_des_encrypt(&zipped);
    let file_hex = format!(
        "{QRC_HEADER_HEX}{}",
        xor_hex_strings(&bytes_to_hex(&encrypted), &settings.qrc_xor_key_hex)?
    );
    Ok(hex_to_bytes(&file_hex)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<QrcInfos>\n  <Lyric_1 LyricContent=\"[0,1000]a(0,1000)\"/>\n</QrcInfos>";

    #[test]
    fn test_looks_like_text() {
        assert!(looks_like_text(b"[00:01.00]hello world"));
        assert!(!looks_like_text(&[0x98, 0x25, 0xB0, 0xAC, 0xE3, 0x02, 0x83, 0x68]));
        assert!(!looks_like_text(b""));
    }

    #[test]
    fn test_padding_digits_are_stable_hex() {
        let digits = padding_digits(16);
        assert_eq!(digits, "d664c9fabe53deff");
        assert!(padding_digits(MAX_PADDING_ATTEMPTS).starts_with(&digits));
    }

    #[test]
    fn test_compress_aligned_over_varied_payloads() {
        let chars: Vec<char> = "你好世界歌词abc".chars().collect();
        for i in 0..300usize {
            let rows: Vec<String> = (0..i % 40 + 1)
                .map(|j| {
                    let mut row = format!("[{},1000]", j * 1000);
                    for k in 0..(i * 7 + j) % 9 + 1 {
                        row.push(chars[(i + j + k) % 9]);
                        row.push_str(&format!(
                            "({},{})",
                            j * 1000 + k * 100,
                            (i * 31 + j * 17 + k * 13) % 500 + 50
                        ));
                    }
                    row
                })
                .collect();
            let xml = format!(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<QrcInfos>\n  <Lyric_1 LyricContent=\"{}\"/>\n</QrcInfos>",
                rows.join("\n")
            );
            let zipped = compress_aligned(&xml).unwrap();
            assert_eq!(zipped.len() % BLOCK_SIZE, 0, "第 {i} 个样本压缩后未对齐");
            let restored = inflate_with_fallback(&zipped).unwrap();
            assert!(String::from_utf8(restored).unwrap().starts_with(&xml));
        }
    }

    #[test]
    fn test_triple_des_round_trip() {
        let data: Vec<u8> = (0u8..64).collect();
        assert_eq!(triple_des_decrypt(&triple_des_encrypt(&data)), data);
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let settings = ParserSettings::default();
        let bytes = encrypt_qrc(SAMPLE_XML, &settings).unwrap();
        assert!(bytes_to_hex(&bytes).starts_with(QRC_HEADER_HEX));
        let xml = decrypt_qrc(&bytes, &settings).unwrap();
        assert!(xml.starts_with(SAMPLE_XML));
    }

    #[test]
    fn test_custom_xor_key() {
        let mut settings = ParserSettings::default();
        settings.set_qrc_xor_key_hex("A5");
        let bytes = encrypt_qrc(SAMPLE_XML, &settings).unwrap();
        assert!(decrypt_qrc(&bytes, &settings).is_ok());
        assert!(decrypt_qrc(&bytes, &ParserSettings::default()).is_err());
    }

    #[test]
    fn test_contains_qrc_infos() {
        assert!(contains_qrc_infos("<qrcinfos>"));
        assert!(contains_qrc_infos("<QrcInfos\n>"));
        assert!(!contains_qrc_infos("<QrcInfosX>"));
    }
}
