//! Duration probing, silence padding and concatenation of narration tracks through the system
//! `ffprobe`/`ffmpeg` binaries.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use tokio::process::Command;

use crate::audio::timing::WordTiming;
use crate::foundation::error::{ReelError, ReelResult};

/// Bytes per second of a 128 kbps MP3, used when probing fails.
pub const FALLBACK_BYTES_PER_SEC: f64 = 16_000.0;

/// One scene's narration track after padding.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneAudio {
    pub scene_number: u32,
    /// Padded track.
    pub path: PathBuf,
    /// `original_duration + padding`.
    pub duration: f64,
    pub original_duration: f64,
    /// Silence actually appended (0 when padding failed).
    pub padding: f64,
    pub text: String,
    pub words: Vec<WordTiming>,
}

/// How [`merge_all`] produced its output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeKind {
    Copied,
    Concatenated,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOut {
    format: ProbeFormat,
}

/// Container duration in seconds as reported by `ffprobe`.
pub async fn probe_duration(path: &Path) -> ReelResult<f64> {
    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_format"])
        .arg(path)
        .output()
        .await
        .map_err(|e| ReelError::audio(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ReelError::audio(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| ReelError::audio(format!("ffprobe json parse failed: {e}")))?;
    let secs: f64 = parsed
        .format
        .duration
        .as_deref()
        .ok_or_else(|| ReelError::audio("ffprobe reported no duration"))?
        .trim()
        .parse()
        .map_err(|e| ReelError::audio(format!("ffprobe duration is not a number: {e}")))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(ReelError::audio(format!("ffprobe duration out of range: {secs}")));
    }
    Ok(secs)
}

/// [`probe_duration`], falling back to a byte-size estimate.
pub async fn measure_duration(path: &Path) -> ReelResult<f64> {
    match probe_duration(path).await {
        Ok(secs) => Ok(secs),
        Err(err) => {
            let len = tokio::fs::metadata(path)
                .await
                .with_context(|| format!("failed to stat '{}'", path.display()))?
                .len();
            let secs = size_estimate_secs(len);
            tracing::warn!(path = %path.display(), %err, secs, "probe failed, estimating duration from size");
            Ok(secs)
        }
    }
}

pub fn size_estimate_secs(bytes: u64) -> f64 {
    bytes as f64 / FALLBACK_BYTES_PER_SEC
}

/// Write a silent MP3 clip of `secs` seconds.
pub async fn generate_silence(out: &Path, secs: f64) -> ReelResult<()> {
    let output = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-f", "lavfi", "-i", "anullsrc=r=44100:cl=stereo"])
        .args(["-t", &format!("{secs:.3}"), "-q:a", "9", "-acodec", "libmp3lame"])
        .arg(out)
        .output()
        .await
        .map_err(|e| ReelError::audio(format!("failed to spawn ffmpeg: {e}")))?;
    if !output.status.success() {
        return Err(ReelError::audio(format!(
            "silence generation failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Line for the ffmpeg concat demuxer, quoting the absolute path.
pub(crate) fn concat_entry(path: &Path) -> ReelResult<String> {
    let abs = std::path::absolute(path)
        .with_context(|| format!("failed to resolve '{}'", path.display()))?;
    let quoted = abs.to_string_lossy().replace('\'', r"'\''");
    Ok(format!("file '{quoted}'\n"))
}

/// Stream-copy `inputs` in order into `out` with the concat demuxer. `list` is scratch.
pub async fn concat_copy(inputs: &[PathBuf], list: &Path, out: &Path) -> ReelResult<()> {
    let mut body = String::new();
    for input in inputs {
        body.push_str(&concat_entry(input)?);
    }
    tokio::fs::write(list, body)
        .await
        .with_context(|| format!("failed to write concat list '{}'", list.display()))?;

    let result = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
        .arg(list)
        .args(["-c", "copy"])
        .arg(out)
        .output()
        .await;
    let _ = tokio::fs::remove_file(list).await;

    let output = result.map_err(|e| ReelError::audio(format!("failed to spawn ffmpeg: {e}")))?;
    if !output.status.success() {
        return Err(ReelError::audio(format!(
            "concat failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Store raw narration for `scene_number` under `dir`, measure it, and append `padding` seconds
/// of silence.
///
/// A padding failure is not fatal: the unpadded track is used and the scene's duration equals
/// its spoken duration.
#[tracing::instrument(skip(audio, text, words, dir), fields(bytes = audio.len()))]
pub async fn pad_and_measure(
    scene_number: u32,
    text: &str,
    words: Vec<WordTiming>,
    audio: &[u8],
    dir: &Path,
    padding: f64,
) -> ReelResult<SceneAudio> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create '{}'", dir.display()))?;

    let raw = dir.join(format!("raw_scene_{scene_number}.mp3"));
    let padded = dir.join(format!("scene_{scene_number}.mp3"));
    tokio::fs::write(&raw, audio)
        .await
        .with_context(|| format!("failed to write '{}'", raw.display()))?;

    let original_duration = measure_duration(&raw).await?;

    let applied = if padding > 0.0 {
        match append_silence(&raw, &padded, dir, scene_number, padding).await {
            Ok(()) => padding,
            Err(err) => {
                tracing::warn!(scene = scene_number, %err, "could not add silence padding, using unpadded audio");
                tokio::fs::copy(&raw, &padded)
                    .await
                    .with_context(|| format!("failed to copy '{}'", raw.display()))?;
                0.0
            }
        }
    } else {
        tokio::fs::copy(&raw, &padded)
            .await
            .with_context(|| format!("failed to copy '{}'", raw.display()))?;
        0.0
    };
    let _ = tokio::fs::remove_file(&raw).await;

    Ok(SceneAudio {
        scene_number,
        path: padded,
        duration: original_duration + applied,
        original_duration,
        padding: applied,
        text: text.to_owned(),
        words,
    })
}

async fn append_silence(
    raw: &Path,
    out: &Path,
    dir: &Path,
    scene_number: u32,
    padding: f64,
) -> ReelResult<()> {
    let silence = dir.join(format!("silence_{scene_number}.mp3"));
    let list = dir.join(format!("pad_{scene_number}.txt"));
    let result = async {
        generate_silence(&silence, padding).await?;
        concat_copy(&[raw.to_path_buf(), silence.clone()], &list, out).await
    }
    .await;
    let _ = tokio::fs::remove_file(&silence).await;
    result
}

/// Join all scene tracks in scene order into `out`.
#[tracing::instrument(skip(audios), fields(scenes = audios.len()))]
pub async fn merge_all(audios: &[SceneAudio], out: &Path) -> ReelResult<MergeKind> {
    match audios {
        [] => Err(ReelError::audio("no scene audio to merge")),
        [only] => {
            tokio::fs::copy(&only.path, out)
                .await
                .with_context(|| format!("failed to copy '{}'", only.path.display()))?;
            Ok(MergeKind::Copied)
        }
        many => {
            let inputs: Vec<PathBuf> = many.iter().map(|a| a.path.clone()).collect();
            let list = out.with_extension("txt");
            concat_copy(&inputs, &list, out).await?;
            Ok(MergeKind::Concatenated)
        }
    }
}
