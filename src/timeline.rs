//! 播放时间轴：根据查询时间重新计算每一行、每个字的播放状态。
//!
//! 每次调用都完整重算，不依赖上一次的结果，所以任意跳转都是正确的。

use crate::error::{LyricError, Result};
use crate::lyric::Lyric;
use crate::types::{Line, PlayState};

/// 查询时间相对于歌词的位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// 没有任何歌词行
    Empty,
    BeforeFirst,
    Within,
    /// 最后一行已经结束
    AfterLast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelinePosition {
    /// 限制在 `[0, len-1]` 内的行下标
    pub line_index: usize,
    /// 当前行的活动字下标，没有时为 -1
    pub word_index: isize,
    pub placement: Placement,
}

fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

fn update_current_words(line: &mut Line, t: f64) {
    let line_start = line.start_time as f64;
    let line_end = line.end_time();
    let line_duration = line.duration;
    let mut acc = line_start;

    for word in &mut line.words {
        if word.single_line {
            if t < line_start {
                word.state = PlayState::Future;
                word.progress = 0.0;
            } else if t >= line_end {
                word.state = PlayState::Past;
                word.progress = 1.0;
            } else {
                word.state = PlayState::Current;
                word.progress = if line_duration > 0.0 {
                    clamp_progress((t - line_start) / line_duration)
                } else {
                    0.0
                };
            }
            continue;
        }

        let duration = word.duration as f64;
        let word_start = acc;
        let word_end = acc + duration;
        if duration == 0.0 {
            // 零时长的字是瞬时事件，不会处于播放中
            if t < word_start {
                word.state = PlayState::Future;
                word.progress = 0.0;
            } else {
                word.state = PlayState::Past;
                word.progress = 1.0;
            }
        } else if t < word_start {
            word.state = PlayState::Future;
            word.progress = 0.0;
        } else if t >= word_end {
            word.state = PlayState::Past;
            word.progress = 1.0;
        } else {
            word.state = PlayState::Current;
            word.progress = clamp_progress((t - word_start) / duration);
        }
        acc = word_end;
    }
}

fn mark_words(line: &mut Line, state: PlayState) {
    let progress = if state == PlayState::Past { 1.0 } else { 0.0 };
    for word in &mut line.words {
        word.state = state;
        word.progress = progress;
    }
}

impl Lyric {
    /// 把播放位置推进到 `time_ms` (毫秒)，并返回活动行和活动字。
    pub fn advance(&mut self, time_ms: f64) -> Result<TimelinePosition> {
        if !time_ms.is_finite() || time_ms < 0.0 {
            return Err(LyricError::Validation(format!(
                "播放时间必须是非负有限数，实际为 {time_ms}"
            )));
        }
        let t = time_ms + self.offset_ms() as f64;

        if self.lines.is_empty() {
            return Ok(TimelinePosition {
                line_index: 0,
                word_index: -1,
                placement: Placement::Empty,
            });
        }

        let started = self.lines.partition_point(|l| l.start_time as f64 <= t);
        let placement = match started.checked_sub(1) {
            None => Placement::BeforeFirst,
            Some(idx) if t < self.lines[idx].end_time() => Placement::Within,
            Some(_) => Placement::AfterLast,
        };
        // Within 时 started >= 1
        let current = started.saturating_sub(1);

        for (i, line) in self.lines.iter_mut().enumerate() {
            let per_word = line.has_per_word_timing();
            let state = match placement {
                Placement::BeforeFirst => PlayState::Future,
                Placement::AfterLast => PlayState::Past,
                _ if i < current => PlayState::Past,
                _ if i == current => PlayState::Current,
                _ => PlayState::Future,
            };
            line.state = state;
            match state {
                PlayState::Past => {
                    line.progress = 1.0;
                    line.render_progress = if per_word { 0.0 } else { 1.0 };
                    mark_words(line, PlayState::Past);
                }
                PlayState::Future => {
                    line.progress = 0.0;
                    line.render_progress = 0.0;
                    mark_words(line, PlayState::Future);
                }
                PlayState::Current => {
                    line.progress = if line.duration.is_finite() && line.duration > 0.0 {
                        clamp_progress((t - line.start_time as f64) / line.duration)
                    } else {
                        0.0
                    };
                    line.render_progress = if per_word { 0.0 } else { line.progress };
                    update_current_words(line, t);
                }
            }
        }

        let line_index = match placement {
            Placement::AfterLast => self.lines.len() - 1,
            _ => current,
        };
        let word_index = match placement {
            Placement::Within => self.lines[line_index].active_word_index(),
            _ => -1,
        };

        Ok(TimelinePosition {
            line_index,
            word_index,
            placement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ParserSettings;
    use crate::types::Metadata;

    fn lyric(text: &str) -> Lyric {
        Lyric::from_canonical_text(Metadata::new(), text, &ParserSettings::default())
    }

    #[test]
    fn test_rejects_invalid_time() {
        let mut l = lyric("[00:01.000]a");
        assert!(matches!(l.advance(-1.0), Err(LyricError::Validation(_))));
        assert!(matches!(l.advance(f64::NAN), Err(LyricError::Validation(_))));
        assert!(matches!(l.advance(f64::INFINITY), Err(LyricError::Validation(_))));
    }

    #[test]
    fn test_empty_lyric() {
        let mut l = Lyric::default();
        let pos = l.advance(0.0).unwrap();
        assert_eq!(pos.placement, Placement::Empty);
        assert_eq!(pos.word_index, -1);
    }

    #[test]
    fn test_before_within_after() {
        let mut l = lyric("[length:00:03]\n[00:01.000]<500>He<500>llo\n[00:02.000]World");

        let pos = l.advance(500.0).unwrap();
        assert_eq!(pos.placement, Placement::BeforeFirst);
        assert_eq!(pos.line_index, 0);
        assert_eq!(pos.word_index, -1);
        assert!(l.lines().iter().all(|line| line.state == PlayState::Future));

        let pos = l.advance(1600.0).unwrap();
        assert_eq!(pos.placement, Placement::Within);
        assert_eq!((pos.line_index, pos.word_index), (0, 1));
        let line = &l.lines()[0];
        assert_eq!(line.state, PlayState::Current);
        assert!((line.progress - 0.6).abs() < 1e-9);
        assert_eq!(line.render_progress, 0.0, "逐字行的渲染进度为 0");
        assert_eq!(line.words[0].state, PlayState::Past);
        assert!((line.words[1].progress - 0.2).abs() < 1e-9);

        let pos = l.advance(3500.0).unwrap();
        assert_eq!(pos.placement, Placement::AfterLast);
        assert_eq!(pos.line_index, 1);
        assert!(l.lines().iter().all(|line| line.state == PlayState::Past));
    }

    #[test]
    fn test_line_level_render_progress() {
        let mut l = lyric("[00:01.000]whole");
        l.advance(5000.0).unwrap();
        let line = &l.lines()[0];
        assert_eq!(line.state, PlayState::Current);
        assert_eq!(line.progress, 0.0, "无穷时长的行进度为 0");
        assert_eq!(line.words[0].state, PlayState::Current);
        assert!(!line.has_per_word_timing());
    }

    #[test]
    fn test_zero_duration_word_is_instant() {
        let mut l = lyric("[00:00.000]<0>a<100>b<100>c\n[00:01.000]d");
        assert!(!l.lines()[0].pseudo_per_word);
        let pos = l.advance(0.0).unwrap();
        assert_eq!(l.lines()[0].words[0].state, PlayState::Past);
        assert_eq!(l.lines()[0].words[1].state, PlayState::Current);
        assert_eq!(pos.word_index, 1);
    }

    #[test]
    fn test_offset_metadata_shifts_time() {
        let mut l = lyric("[offset:1000]\n[00:01.000]a\n[00:02.000]b");
        let pos = l.advance(1000.0).unwrap();
        assert_eq!(pos.line_index, 1);
    }

    #[test]
    fn test_idempotent() {
        let mut l = lyric("[00:01.000]<300>ab<300>cd\n[00:02.000]ef");
        let first = l.advance(1400.0).unwrap();
        let snapshot = l.clone();
        let second = l.advance(1400.0).unwrap();
        assert_eq!(first, second);
        assert_eq!(snapshot, l);
    }
}
