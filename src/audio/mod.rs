//! Narration: speech synthesis, word timing, padding/merging and subtitle cues.

pub mod media;
pub mod speech;
pub mod subtitle;
pub mod timing;
