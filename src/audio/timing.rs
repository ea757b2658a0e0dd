use serde::{Deserialize, Serialize};

/// Estimated spoken length of one word: `max(MIN_WORD_SECS, PER_CHAR_SECS * len + BASE_WORD_SECS)`.
pub const MIN_WORD_SECS: f64 = 0.2;
pub const PER_CHAR_SECS: f64 = 0.05;
pub const BASE_WORD_SECS: f64 = 0.15;
/// Silence the estimator leaves between consecutive words.
pub const WORD_GAP_SECS: f64 = 0.1;

/// A spoken word with offsets (seconds) from the start of its scene's unpadded audio.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// Character-level alignment as returned by the speech source.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CharAlignment {
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default, rename = "character_start_times_seconds")]
    pub starts: Vec<f64>,
    #[serde(default, rename = "character_end_times_seconds")]
    pub ends: Vec<f64>,
}

impl CharAlignment {
    /// Non-empty with one start and one end per character.
    pub fn is_usable(&self) -> bool {
        !self.characters.is_empty()
            && self.characters.len() == self.starts.len()
            && self.characters.len() == self.ends.len()
    }
}

/// Rebuild word timings from per-character timestamps.
///
/// Whitespace separates words. A word starts at its first character's start and ends at its
/// last character's end; a word running into the end of the text is flushed as the final word.
pub fn reconstruct_word_timings(alignment: &CharAlignment) -> Vec<WordTiming> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut start = 0.0;
    let mut end = 0.0;

    let chars = alignment
        .characters
        .iter()
        .zip(alignment.starts.iter().zip(alignment.ends.iter()));
    for (ch, (&s, &e)) in chars {
        if ch.chars().all(char::is_whitespace) {
            flush(&mut words, &mut current, start, end);
            continue;
        }
        if current.is_empty() {
            start = s;
        }
        current.push_str(ch);
        end = e.max(start);
    }
    flush(&mut words, &mut current, start, end);
    words
}

fn flush(words: &mut Vec<WordTiming>, current: &mut String, start: f64, end: f64) {
    if current.is_empty() {
        return;
    }
    words.push(WordTiming {
        word: std::mem::take(current),
        start,
        end,
    });
}

/// Sequential estimate used when no alignment is available.
pub fn estimate_word_timings(text: &str, offset: f64) -> Vec<WordTiming> {
    let mut t = offset;
    text.split_whitespace()
        .map(|word| {
            let len = word.chars().count() as f64;
            let dur = (PER_CHAR_SECS * len + BASE_WORD_SECS).max(MIN_WORD_SECS);
            let timing = WordTiming {
                word: word.to_owned(),
                start: t,
                end: t + dur,
            };
            t += dur + WORD_GAP_SECS;
            timing
        })
        .collect()
}
