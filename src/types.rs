use std::fmt;

use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// 支持解析和生成的歌词格式。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, Display, AsRefStr, Default,
)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum LyricFormat {
    /// 标准 LRC，只有行级时间戳。
    #[default]
    Lrc,
    /// 带 `<毫秒>` 逐字标签的 LRC。
    Trc,
    /// QQ 音乐加密 QRC。
    Qrc,
    /// 酷狗加密 KRC。
    Krc,
    /// 卡拉OK 脚本 KSC。
    Ksc,
}

impl LyricFormat {
    pub fn to_extension_str(self) -> &'static str {
        match self {
            LyricFormat::Lrc => "lrc",
            LyricFormat::Trc => "trc",
            LyricFormat::Qrc => "qrc",
            LyricFormat::Krc => "krc",
            LyricFormat::Ksc => "ksc",
        }
    }
}

/// 行或字的播放状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    #[default]
    Future,
    Current,
    Past,
}

/// 一个逐字单元。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub text: String,
    /// 持续时间 (毫秒)
    pub duration: u64,
    /// 为 true 时表示该字代表整行，没有逐字时间
    pub single_line: bool,
    /// 所在子行，从 1 开始
    pub line_no: usize,
    pub state: PlayState,
    pub progress: f64,
}

impl Word {
    pub fn new(text: impl Into<String>, duration: u64) -> Self {
        Word {
            text: text.into(),
            duration,
            single_line: false,
            line_no: 1,
            state: PlayState::Future,
            progress: 0.0,
        }
    }

    /// 构造代表整行的字。
    pub fn whole_line(text: impl Into<String>) -> Self {
        Word {
            single_line: true,
            ..Word::new(text, 0)
        }
    }

    pub fn has_timing(&self) -> bool {
        !self.single_line && self.duration > 0
    }
}

/// 一行歌词，可以包含多个子行 (例如原文和翻译)。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    /// 从 1 开始的序号，空行哨兵为 0
    pub no: usize,
    pub start_time: u64,
    /// 持续时间 (毫秒)，最后一行可以是正无穷
    pub duration: f64,
    pub text: String,
    pub row_texts: Vec<String>,
    pub words: Vec<Word>,
    pub state: PlayState,
    pub progress: f64,
    pub render_progress: f64,
    /// 逐字时间是均分合成的，生成器应当视为没有逐字时间
    pub pseudo_per_word: bool,
}

impl Line {
    pub fn new(start_time: u64, text: impl Into<String>, words: Vec<Word>) -> Self {
        Line {
            no: 0,
            start_time,
            duration: 0.0,
            text: text.into(),
            row_texts: Vec::new(),
            words,
            state: PlayState::Future,
            progress: 0.0,
            render_progress: 0.0,
            pseudo_per_word: false,
        }
    }

    /// 空行哨兵。
    pub fn empty() -> Self {
        Line {
            duration: f64::INFINITY,
            ..Line::new(0, "", Vec::new())
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time as f64 + self.duration
    }

    /// 取整后的持续时间，无穷大记为 0。
    pub fn duration_ms(&self) -> u64 {
        if self.duration.is_finite() && self.duration > 0.0 {
            self.duration.round() as u64
        } else {
            0
        }
    }

    /// 渲染层用：伪逐字也算逐字。
    pub fn has_per_word_timing(&self) -> bool {
        self.pseudo_per_word || self.words.iter().any(Word::has_timing)
    }

    /// 第一个正在播放的字，否则最后一个已播放的字，否则 0；没有字时为 -1。
    pub fn active_word_index(&self) -> isize {
        if self.words.is_empty() {
            return -1;
        }
        if let Some(idx) = self
            .words
            .iter()
            .position(|w| w.state == PlayState::Current)
        {
            return idx as isize;
        }
        if let Some(idx) = self.words.iter().rposition(|w| w.state == PlayState::Past) {
            return idx as isize;
        }
        0
    }
}

/// 元数据的值。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Text(String),
    Number(i64),
    Json(serde_json::Value),
}

impl MetaValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            MetaValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Text(s) => write!(f, "{s}"),
            MetaValue::Number(n) => write!(f, "{n}"),
            MetaValue::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

impl From<i64> for MetaValue {
    fn from(n: i64) -> Self {
        MetaValue::Number(n)
    }
}

/// 保持插入顺序的元数据表。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    entries: Vec<(String, MetaValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或覆盖，覆盖时保留原来的位置。
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetaValue::as_text)
    }

    pub fn get_number(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(MetaValue::as_number)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
