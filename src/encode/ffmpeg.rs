use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::Context as _;
use tokio::process::Command;

use crate::foundation::core::{Canvas, Fps, FrameIndex};
use crate::foundation::error::{ReelError, ReelResult};

/// printf-style pattern handed to the image2 demuxer.
pub const FRAME_FILE_PATTERN: &str = "frame_%06d.png";

pub fn frame_file_name(f: FrameIndex) -> String {
    format!("frame_{:06}.png", f.0)
}

#[derive(Clone, Debug)]
pub struct CompileConfig {
    pub canvas: Canvas,
    pub fps: Fps,
    /// x264 constant rate factor, 0..=51.
    pub crf: u8,
    pub preset: String,
    pub audio_bitrate: String,
    pub out_path: PathBuf,
    pub overwrite: bool,
}

impl CompileConfig {
    pub fn new(canvas: Canvas, fps: Fps, out_path: impl Into<PathBuf>) -> Self {
        Self {
            canvas,
            fps,
            crf: 23,
            preset: "medium".to_owned(),
            audio_bitrate: "192k".to_owned(),
            out_path: out_path.into(),
            overwrite: true,
        }
    }

    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    pub fn validate(&self) -> ReelResult<()> {
        let Canvas { width, height } = self.canvas;
        if width == 0 || height == 0 {
            return Err(ReelError::validation("compile width/height must be non-zero"));
        }
        if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
            return Err(ReelError::validation(
                "compile width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        if self.crf > 51 {
            return Err(ReelError::validation(format!(
                "crf must be within 0..=51, got {}",
                self.crf
            )));
        }
        if self.preset.trim().is_empty() {
            return Err(ReelError::validation("x264 preset must not be empty"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompileOutcome {
    pub out_path: PathBuf,
    pub bytes: u64,
    pub frames_removed: bool,
}

fn is_tool_on_path(tool: &str) -> bool {
    std::process::Command::new(tool)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn is_ffmpeg_on_path() -> bool {
    is_tool_on_path("ffmpeg")
}

pub fn is_ffprobe_on_path() -> bool {
    is_tool_on_path("ffprobe")
}

pub async fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Encoder arguments: the frame sequence at `fps`, one audio track, H.264/AAC, trimmed to the
/// shorter stream, with the moov atom up front.
pub fn build_compile_args(frames_dir: &Path, audio: &Path, cfg: &CompileConfig) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let mut push = |s: &str| args.push(OsString::from(s));
    push(if cfg.overwrite { "-y" } else { "-n" });
    push("-loglevel");
    push("error");
    push("-framerate");
    push(&cfg.fps.ffmpeg_rate());
    push("-i");
    args.push(frames_dir.join(FRAME_FILE_PATTERN).into_os_string());
    args.push("-i".into());
    args.push(audio.as_os_str().to_owned());
    let crf = cfg.crf.to_string();
    for s in [
        "-c:v",
        "libx264",
        "-preset",
        cfg.preset.as_str(),
        "-crf",
        crf.as_str(),
        "-pix_fmt",
        "yuv420p",
        "-c:a",
        "aac",
        "-b:a",
        cfg.audio_bitrate.as_str(),
        "-shortest",
        "-movflags",
        "+faststart",
    ] {
        args.push(s.into());
    }
    args.push(cfg.out_path.as_os_str().to_owned());
    args
}

/// Encode `frames_dir/frame_%06d.png` with `audio` into `cfg.out_path`, then delete the frames.
#[tracing::instrument(skip(cfg), fields(out = %cfg.out_path.display()))]
pub async fn compile(
    frames_dir: &Path,
    audio: &Path,
    cfg: &CompileConfig,
) -> ReelResult<CompileOutcome> {
    cfg.validate()?;
    ensure_parent_dir(&cfg.out_path).await?;

    if !cfg.overwrite && tokio::fs::try_exists(&cfg.out_path).await.unwrap_or(false) {
        return Err(ReelError::validation(format!(
            "output file '{}' already exists",
            cfg.out_path.display()
        )));
    }

    let output = Command::new("ffmpeg")
        .args(build_compile_args(frames_dir, audio, cfg))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            ReelError::encode(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ReelError::encode(format!(
            "ffmpeg exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let bytes = match tokio::fs::metadata(&cfg.out_path).await {
        Ok(m) if m.len() > 0 => m.len(),
        Ok(_) => {
            return Err(ReelError::encode(format!(
                "ffmpeg produced an empty file at '{}'",
                cfg.out_path.display()
            )));
        }
        Err(e) => {
            return Err(ReelError::encode(format!(
                "ffmpeg reported success but '{}' is missing: {e}",
                cfg.out_path.display()
            )));
        }
    };

    let frames_removed = match tokio::fs::remove_dir_all(frames_dir).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(dir = %frames_dir.display(), err = %e, "failed to remove frame directory");
            false
        }
    };

    tracing::info!(bytes, "video compiled");
    Ok(CompileOutcome {
        out_path: cfg.out_path.clone(),
        bytes,
        frames_removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CompileConfig {
        CompileConfig::new(
            Canvas {
                width: 1080,
                height: 1920,
            },
            Fps::integer(30).unwrap(),
            "videos/out.mp4",
        )
    }

    fn args(cfg: &CompileConfig) -> Vec<String> {
        build_compile_args(Path::new("tmp/frames"), Path::new("tmp/merged.mp3"), cfg)
            .into_iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    fn after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let i = args.iter().position(|a| a == flag).unwrap();
        &args[i + 1]
    }

    #[test]
    fn args_describe_a_compatible_mp4() {
        let a = args(&cfg());
        assert_eq!(a[0], "-y");
        assert_eq!(after(&a, "-framerate"), "30");
        assert_eq!(after(&a, "-c:v"), "libx264");
        assert_eq!(after(&a, "-crf"), "23");
        assert_eq!(after(&a, "-pix_fmt"), "yuv420p");
        assert_eq!(after(&a, "-c:a"), "aac");
        assert_eq!(after(&a, "-movflags"), "+faststart");
        assert!(a.iter().any(|s| s == "-shortest"));
        assert_eq!(a.last().unwrap(), "videos/out.mp4");
    }

    #[test]
    fn frames_come_before_audio() {
        let a = args(&cfg());
        let inputs: Vec<&String> = a
            .iter()
            .enumerate()
            .filter(|(i, _)| *i > 0 && a[i - 1] == "-i")
            .map(|(_, s)| s)
            .collect();
        assert_eq!(inputs.len(), 2);
        assert!(inputs[0].ends_with(FRAME_FILE_PATTERN));
        assert!(inputs[1].ends_with("merged.mp3"));
    }

    #[test]
    fn rational_rates_and_custom_quality() {
        let mut c = cfg().with_crf(18);
        c.fps = Fps::new(30000, 1001).unwrap();
        c.overwrite = false;
        let a = args(&c);
        assert_eq!(a[0], "-n");
        assert_eq!(after(&a, "-framerate"), "30000/1001");
        assert_eq!(after(&a, "-crf"), "18");
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut odd = cfg();
        odd.canvas.width = 1081;
        assert!(odd.validate().is_err());
        assert!(cfg().with_crf(52).validate().is_err());
        let mut empty = cfg();
        empty.preset = " ".to_owned();
        assert!(empty.validate().is_err());
        assert!(cfg().validate().is_ok());
    }

    #[test]
    fn frame_names_match_the_pattern() {
        assert_eq!(frame_file_name(FrameIndex(0)), "frame_000000.png");
        assert_eq!(frame_file_name(FrameIndex(359)), "frame_000359.png");
    }

    #[tokio::test]
    async fn encoder_failure_carries_diagnostics() {
        if !is_ffmpeg_on_path() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut c = cfg();
        c.out_path = dir.path().join("out.mp4");
        let err = compile(&dir.path().join("missing"), &dir.path().join("none.mp3"), &c)
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::Encode(_)));
        assert!(err.to_string().contains("ffmpeg exited"));
    }
}
