use std::io;

use thiserror::Error;

/// 单个解析器内部的解码失败。
///
/// 这类错误只会导致格式分派跳到下一个解析器，不会直接暴露给 `Lyric::from_bytes` 的调用方。
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("无效的十六进制字符串: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("解压缩失败: {0}")]
    Decompression(#[source] io::Error),
    #[error("UTF-8 转换错误: {0}")]
    FromUtf8(#[from] std::string::FromUtf8Error),
    #[error("Base64 解码错误: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),
    #[error("XML 解析错误: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("无效的文件头: {0}")]
    InvalidHeader(String),
    #[error("缺少有效载荷: {0}")]
    MissingPayload(String),
    #[error("不是 {0} 格式")]
    NotThisFormat(&'static str),
    #[error("文本格式化错误: {0}")]
    Fmt(#[from] std::fmt::Error),
}

impl From<quick_xml::events::attributes::AttrError> for DecodeError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        DecodeError::Xml(quick_xml::Error::InvalidAttr(err))
    }
}

/// 定义歌词解析、生成和播放过程中可能发生的错误。
#[derive(Error, Debug)]
pub enum LyricError {
    /// 所有解析器都无法识别输入。
    #[error("无法识别的歌词格式")]
    Format,
    #[error("解码失败: {0}")]
    Decode(#[from] DecodeError),
    /// 查询时间或参数不合法。
    #[error("参数无效: {0}")]
    Validation(String),
    #[error("不支持的生成格式: {0}")]
    UnsupportedFormat(String),
    /// 生成阶段的压缩或加密失败。
    #[error("编码失败: {0}")]
    Encode(String),
    #[error("文本格式化错误: {0}")]
    Fmt(#[from] std::fmt::Error),
    #[error("IO 错误: {0}")]
    Io(#[from] io::Error),
    #[error("配置文件错误: {0}")]
    Ini(#[from] ini::Error),
}

pub type Result<T> = std::result::Result<T, LyricError>;
