use std::str::FromStr;

use serde::Serialize;

use crate::error::{LyricError, Result};
use crate::krc_generator::generate_krc;
use crate::krc_parser::parse_krc;
use crate::ksc_generator::generate_ksc;
use crate::ksc_parser::parse_ksc;
use crate::lrc_generator::{generate_lrc, generate_trc};
use crate::lrc_parser::{parse_lrc, parse_lrc_text};
use crate::lyrics_merger::merge_and_sort_lines;
use crate::qrc_generator::generate_qrc;
use crate::qrc_parser::parse_qrc;
use crate::settings::ParserSettings;
use crate::types::{Line, LyricFormat, Metadata};

type ParseFn = fn(&[u8], &ParserSettings) -> Result<Lyric>;

/// 解析器按优先级排列。
const PARSERS: [(LyricFormat, ParseFn); 4] = [
    (LyricFormat::Qrc, parse_qrc),
    (LyricFormat::Krc, parse_krc),
    (LyricFormat::Ksc, parse_ksc),
    (LyricFormat::Lrc, parse_lrc),
];

/// 歌词聚合：元数据加上按开始时间排序的行。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Lyric {
    pub(crate) metadata: Metadata,
    pub(crate) lines: Vec<Line>,
}

impl Lyric {
    /// 从规范文本构建，元数据先于文本中的标签写入。
    pub fn from_canonical_text(
        mut metadata: Metadata,
        text: &str,
        settings: &ParserSettings,
    ) -> Lyric {
        let raw_lines = parse_lrc_text(text, &mut metadata);
        let lines = merge_and_sort_lines(raw_lines, &metadata, settings);
        Lyric { metadata, lines }
    }

    /// 依次尝试 QRC、KRC、KSC、LRC，使用全局设置。
    pub fn from_bytes(buf: &[u8]) -> Result<Lyric> {
        Self::from_bytes_with(buf, &ParserSettings::global())
    }

    pub fn from_bytes_with(buf: &[u8], settings: &ParserSettings) -> Result<Lyric> {
        for (format, parser) in PARSERS {
            match parser(buf, settings) {
                Ok(lyric) if !lyric.is_empty() => {
                    log::info!(
                        target: "[歌词解析]",
                        "识别为 {format} 格式，共 {} 行",
                        lyric.lines.len()
                    );
                    return Ok(lyric);
                }
                Ok(_) => {
                    log::debug!(target: "[歌词解析]", "{format} 解析结果为空，尝试下一个格式");
                }
                Err(e) => {
                    log::debug!(target: "[歌词解析]", "{format} 解析失败: {e}");
                }
            }
        }
        Err(LyricError::Format)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.lines.is_empty()
    }

    /// `offset` 元数据，单位毫秒。
    pub fn offset_ms(&self) -> i64 {
        self.metadata.get_number("offset").unwrap_or(0)
    }

    /// 按指定格式生成，使用全局设置。
    pub fn generate(&self, format: LyricFormat) -> Result<Vec<u8>> {
        self.generate_with(format, &ParserSettings::global())
    }

    pub fn generate_with(&self, format: LyricFormat, settings: &ParserSettings) -> Result<Vec<u8>> {
        let bytes = match format {
            LyricFormat::Lrc => generate_lrc(self)?.into_bytes(),
            LyricFormat::Trc => generate_trc(self)?.into_bytes(),
            LyricFormat::Qrc => generate_qrc(self, settings)?,
            LyricFormat::Krc => generate_krc(self)?,
            LyricFormat::Ksc => generate_ksc(self)?.into_bytes(),
        };
        log::info!(target: "[歌词生成]", "已生成 {format} 格式，{} 字节", bytes.len());
        Ok(bytes)
    }

    /// 按格式名称生成，名称不区分大小写。
    pub fn generate_by_name(&self, name: &str) -> Result<Vec<u8>> {
        let format = LyricFormat::from_str(name.trim())
            .map_err(|_| LyricError::UnsupportedFormat(name.to_string()))?;
        self.generate(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_falls_back_to_lrc() {
        let lyric = Lyric::from_bytes_with(
            "[ar:歌手]\n[00:01.00]第一句".as_bytes(),
            &ParserSettings::default(),
        )
        .unwrap();
        assert_eq!(lyric.lines().len(), 1);
        assert_eq!(lyric.metadata().get_text("ar"), Some("歌手"));
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let garbage: Vec<u8> = (0u8..=255).rev().cycle().take(300).collect();
        let result = Lyric::from_bytes_with(&garbage, &ParserSettings::default());
        assert!(matches!(result, Err(LyricError::Format)));
    }

    #[test]
    fn test_overflowing_timestamp_is_not_a_lyric() {
        let result =
            Lyric::from_bytes_with(b"[99999999999999999:00.000]x", &ParserSettings::default());
        assert!(matches!(result, Err(LyricError::Format)));
    }

    #[test]
    fn test_metadata_only_is_not_empty() {
        let lyric = Lyric::from_bytes_with(b"[ti:only]", &ParserSettings::default()).unwrap();
        assert!(lyric.lines().is_empty());
        assert!(!lyric.is_empty());
    }

    #[test]
    fn test_generate_by_name() {
        let lyric = Lyric::from_canonical_text(
            Metadata::new(),
            "[00:01.000]<200>a",
            &ParserSettings::default(),
        );
        assert!(lyric.generate_by_name("TRC").is_ok());
        assert!(matches!(
            lyric.generate_by_name("ttml"),
            Err(LyricError::UnsupportedFormat(name)) if name == "ttml"
        ));
    }
}
