//! Turning a captured frame sequence plus a narration track into an MP4.

pub mod ffmpeg;
