use std::fmt::{self, Write as FmtWrite};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::generator_utils::row_texts;
use crate::lyric::Lyric;
use crate::types::{Line, Metadata};
use crate::utils::format_lrc_time_ms;

static WORD_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\d+>").expect("未能编译 WORD_TAG_REGEX"));

fn write_metadata_lines(out: &mut String, metadata: &Metadata) -> fmt::Result {
    for (key, value) in metadata.iter() {
        writeln!(out, "[{key}:{value}]")?;
    }
    Ok(())
}

/// 某个子行的内容。非伪逐字且该子行有逐字时间时输出 `<时长>文本` 序列。
fn row_content(
    line: &Line,
    row_idx: usize,
    row_text: &str,
) -> std::result::Result<String, fmt::Error> {
    let row_no = row_idx + 1;
    let row_words: Vec<_> = line.words.iter().filter(|w| w.line_no == row_no).collect();
    let has_timing = !line.pseudo_per_word && row_words.iter().any(|w| w.has_timing());
    if !has_timing {
        return Ok(row_text.to_string());
    }
    if let Some(whole) = row_words.iter().find(|w| w.single_line) {
        return Ok(whole.text.clone());
    }
    let mut content = String::new();
    for w in row_words {
        write!(content, "<{}>{}", w.duration, w.text)?;
    }
    Ok(content)
}

/// 生成带逐字标签的 TRC 文本。
pub fn generate_trc(lyric: &Lyric) -> Result<String> {
    let mut out = String::new();
    write_metadata_lines(&mut out, lyric.metadata())?;

    for line in lyric.lines() {
        let time_tag = format_lrc_time_ms(line.start_time);
        for (row_idx, row_text) in row_texts(line).iter().enumerate() {
            let content = row_content(line, row_idx, row_text)?;
            writeln!(out, "{time_tag}{content}")?;
        }
    }

    if out.ends_with('\n') {
        out.pop();
    }
    Ok(out)
}

/// 生成标准 LRC 文本，即去掉逐字标签的 TRC。
pub fn generate_lrc(lyric: &Lyric) -> Result<String> {
    Ok(WORD_TAG_REGEX.replace_all(&generate_trc(lyric)?, "").into_owned())
}
