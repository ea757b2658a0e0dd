use serde::{Deserialize, Serialize};

use crate::audio::media::SceneAudio;

/// Time after a word's end during which it stays highlighted.
pub const HIGHLIGHT_TAIL_SECS: f64 = 0.1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CueWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// A scene's narration placed on the global timeline.
///
/// `end_time` covers only the spoken part; trailing padding is never subtitled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    pub scene_number: u32,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub words: Vec<CueWord>,
}

impl SubtitleCue {
    pub fn contains(&self, t: f64) -> bool {
        self.start_time <= t && t <= self.end_time
    }

    /// Index of the word to emphasize at `t`.
    ///
    /// A word is current from its start until `tail` after its end. Between words (and past
    /// the last one) the most recently finished word stays highlighted.
    pub fn highlight_index(&self, t: f64, tail: f64) -> Option<usize> {
        let mut index = None;
        for (i, w) in self.words.iter().enumerate() {
            if w.start <= t && t <= w.end + tail {
                return Some(i);
            }
            if t > w.end {
                index = Some(i);
            }
        }
        index
    }
}

/// Lay scene audio end to end. Offsets advance by each padded duration.
pub fn build_subtitle_cues(audios: &[SceneAudio]) -> Vec<SubtitleCue> {
    let mut offset = 0.0;
    audios
        .iter()
        .map(|a| {
            let cue = SubtitleCue {
                scene_number: a.scene_number,
                text: a.text.clone(),
                start_time: offset,
                end_time: offset + a.original_duration,
                words: a
                    .words
                    .iter()
                    .map(|w| CueWord {
                        word: w.word.clone(),
                        start: w.start + offset,
                        end: w.end + offset,
                    })
                    .collect(),
            };
            offset += a.duration;
            cue
        })
        .collect()
}

pub fn cue_at(cues: &[SubtitleCue], t: f64) -> Option<&SubtitleCue> {
    cues.iter().find(|c| c.contains(t))
}

/// What the page's caption should show at one instant.
#[derive(Clone, Debug, PartialEq)]
pub enum SubtitleUpdate<'a> {
    Show { text: &'a str, highlight: Option<usize> },
    Clear,
}

impl SubtitleUpdate<'_> {
    /// Highlight as passed over the controller protocol, `-1` meaning none.
    pub fn highlight_arg(&self) -> i64 {
        match self {
            Self::Show {
                highlight: Some(i), ..
            } => *i as i64,
            _ => -1,
        }
    }
}

pub fn subtitle_at(cues: &[SubtitleCue], t: f64, tail: f64) -> SubtitleUpdate<'_> {
    match cue_at(cues, t) {
        Some(cue) => SubtitleUpdate::Show {
            text: &cue.text,
            highlight: cue.highlight_index(t, tail),
        },
        None => SubtitleUpdate::Clear,
    }
}
