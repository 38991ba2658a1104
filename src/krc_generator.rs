use std::fmt::{self, Write as FmtWrite};

use base64::Engine;

use crate::error::{LyricError, Result};
use crate::generator_utils::{accept_prefix_words, plan_rows};
use crate::krc_parser::{KRC_HEADER, KRC_XOR_KEY};
use crate::lyric::Lyric;
use crate::types::{Line, MetaValue};
use crate::utils::{ZERO_WIDTH_SPACE, deflate_zlib, xor_cyclic};

fn encode_language(value: &MetaValue) -> String {
    let json = match value {
        MetaValue::Json(v) => v.clone(),
        MetaValue::Text(s) => serde_json::from_str(s).unwrap_or_else(|_| s.clone().into()),
        MetaValue::Number(n) => (*n).into(),
    };
    base64::engine::general_purpose::STANDARD.encode(json.to_string())
}

fn write_line(out: &mut String, line: &Line) -> fmt::Result {
    let start = line.start_time;
    let duration = line.duration_ms();

    for plan in plan_rows(line) {
        let fallback = || {
            let text = if plan.content.is_empty() {
                ZERO_WIDTH_SPACE
            } else {
                plan.content.as_str()
            };
            format!("<0,{duration},0>{text}")
        };

        let body = if plan.words.is_empty() {
            fallback()
        } else {
            let accepted = accept_prefix_words(&plan.words, &plan.content);
            if accepted.is_empty() {
                fallback()
            } else {
                let mut offset = 0u64;
                let mut body = String::new();
                for (text, d) in accepted {
                    write!(body, "<{offset},{d},0>{text}")?;
                    offset = offset.saturating_add(d);
                }
                body
            }
        };
        writeln!(out, "[{start},{duration}]{body}")?;
    }
    Ok(())
}

/// 生成 KRC 明文 (未压缩、未加密)。
pub fn generate_krc_text(lyric: &Lyric) -> Result<String> {
    let mut out = String::new();
    for (key, value) in lyric.metadata().iter() {
        if key.eq_ignore_ascii_case("language") {
            writeln!(out, "[language:{}]", encode_language(value))?;
        } else {
            writeln!(out, "[{key}:{value}]")?;
        }
    }
    for line in lyric.lines() {
        write_line(&mut out, line)?;
    }
    if out.ends_with('\n') {
        out.pop();
    }
    Ok(out)
}

/// 生成 KRC 文件：明文经 zlib 压缩、异或后加上 `krc1` 文件头。
pub fn generate_krc(lyric: &Lyric) -> Result<Vec<u8>> {
    let plain = generate_krc_text(lyric)?;
    let zipped = deflate_zlib(plain.as_bytes())
        .map_err(|e| LyricError::Encode(format!("KRC 压缩失败: {e}")))?;

    let mut out = Vec::with_capacity(KRC_HEADER.len() + zipped.len());
    out.extend_from_slice(KRC_HEADER);
    out.extend_from_slice(&xor_cyclic(&zipped, &KRC_XOR_KEY));
    log::debug!(target: "[KRC 生成]", "明文 {} 字节，输出 {} 字节", plain.len(), out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ParserSettings;
    use crate::types::Metadata;

    fn parse(text: &str) -> Lyric {
        Lyric::from_canonical_text(Metadata::new(), text, &ParserSettings::default())
    }

    #[test]
    fn test_generate_krc_text_per_word_and_fallback() {
        let lyric = parse("[ar:歌手]\n[00:01.000]<500>He<500>llo\n[00:02.000]World\n[00:03.000]");
        let text = generate_krc_text(&lyric).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[ar:歌手]");
        assert_eq!(lines[1], "[1000,1000]<0,500,0>He<500,500,0>llo");
        assert_eq!(lines[2], "[2000,1000]<0,1000,0>World", "伪逐字行输出整行记号");
        assert_eq!(lines[3], "[3000,0]<0,0,0>\u{200b}");
    }

    #[test]
    fn test_bilingual_rows_share_timestamp() {
        let lyric = parse("[00:01.000]<300>你<300>好\n[00:01.000]hello\n[00:02.000]x");
        let text = generate_krc_text(&lyric).unwrap();
        assert!(text.contains("[1000,1000]<0,300,0>你<300,300,0>好\n"));
        assert!(text.contains("[1000,1000]<0,1000,0>hello\n"));
    }

    #[test]
    fn test_language_is_base64_json() {
        let mut meta = Metadata::new();
        meta.insert("language", MetaValue::Json(serde_json::json!({"version": 1})));
        let lyric = Lyric::from_canonical_text(meta, "", &ParserSettings::default());
        let text = generate_krc_text(&lyric).unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode(r#"{"version":1}"#);
        assert_eq!(text, format!("[language:{encoded}]"));
    }

    #[test]
    fn test_huge_word_duration_saturates_offset() {
        let lyric = parse("[00:00.000]<18446744073709551615>a<5>b");
        let text = generate_krc_text(&lyric).unwrap();
        assert!(text.contains("<0,18446744073709551615,0>a<18446744073709551615,5,0>b"));
        assert!(generate_krc(&lyric).is_ok());
    }

    #[test]
    fn test_generate_krc_has_header() {
        let lyric = parse("[00:01.000]a");
        let bytes = generate_krc(&lyric).unwrap();
        assert_eq!(&bytes[..4], b"krc1");
    }
}
