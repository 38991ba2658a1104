//! 卡拉 OK 逐字歌词的解析、转换与播放时间轴。
//!
//! 支持 LRC、TRC、QRC、KRC、KSC 五种格式。所有解析器都先把输入转成
//! 带 `<时长>` 逐字标签的规范文本，再统一合并为 [`Lyric`]。
//!
//! ```no_run
//! use karaoke_lyric::{Lyric, LyricFormat};
//!
//! # fn main() -> karaoke_lyric::Result<()> {
//! let bytes = std::fs::read("song.qrc")?;
//! let mut lyric = Lyric::from_bytes(&bytes)?;
//! let position = lyric.advance(12_345.0)?;
//! println!("当前行 {}，当前字 {}", position.line_index, position.word_index);
//! let krc = lyric.generate(LyricFormat::Krc)?;
//! # let _ = krc;
//! # Ok(())
//! # }
//! ```

pub mod des;
pub mod error;
mod generator_utils;
pub mod krc_generator;
pub mod krc_parser;
pub mod ksc_generator;
pub mod ksc_parser;
pub mod logger;
pub mod lrc_generator;
pub mod lrc_parser;
mod lyric;
mod lyrics_merger;
pub mod qrc_codec;
pub mod qrc_generator;
pub mod qrc_parser;
pub mod settings;
mod timeline;
pub mod types;
pub mod utils;

pub use error::{DecodeError, LyricError, Result};
pub use logger::init_logger;
pub use lyric::Lyric;
pub use settings::{AppSettings, LogSettings, ParserSettings};
pub use timeline::{Placement, TimelinePosition};
pub use types::{Line, LyricFormat, MetaValue, Metadata, PlayState, Word};
