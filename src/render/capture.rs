//! Frame capture: drive the render document through its controller one frame at a time and
//! photograph each seeked state into `frame_%06d.png`.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::audio::subtitle::{HIGHLIGHT_TAIL_SECS, SubtitleCue, subtitle_at};
use crate::encode::ffmpeg::frame_file_name;
use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::{ReelError, ReelResult};
use crate::job::progress::{Phase, ProgressReporter};
use crate::page::controller::{Controller, PageDriver, ReadinessPolicy};
use crate::timeline::SceneTimeline;

/// Where a render job is. `Failed` is reachable from every state before `Done`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapturePhase {
    Init,
    AwaitReady,
    InjectTiming,
    Rebuild,
    Start,
    Capturing,
    Compiling,
    Done,
    Failed,
}

impl CapturePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub(crate) fn advance(&mut self, next: CapturePhase) {
        tracing::debug!(from = ?*self, to = ?next, "capture phase");
        *self = next;
    }
}

#[derive(Clone, Debug)]
pub struct CaptureOpts {
    /// Settle delay after seeking frame 0.
    pub settle_first: Duration,
    pub settle: Duration,
    /// A smaller first frame is probably blank.
    pub min_first_frame_bytes: u64,
    /// Below this captured/expected ratio the report carries a warning.
    pub min_success_ratio: f64,
    pub highlight_tail: f64,
    pub readiness: ReadinessPolicy,
    /// Seconds of video between progress updates.
    pub progress_every_secs: u32,
}

impl Default for CaptureOpts {
    fn default() -> Self {
        Self {
            settle_first: Duration::from_millis(50),
            settle: Duration::from_millis(16),
            min_first_frame_bytes: 10_000,
            min_success_ratio: 0.9,
            highlight_tail: HIGHLIGHT_TAIL_SECS,
            readiness: ReadinessPolicy::default(),
            progress_every_secs: 5,
        }
    }
}

pub struct CaptureRequest<'a> {
    pub html: &'a Path,
    pub frames_dir: &'a Path,
    pub timeline: &'a SceneTimeline,
    pub cues: &'a [SubtitleCue],
    pub fps: Fps,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureReport {
    pub expected: u64,
    pub captured: u64,
    pub failed_frames: Vec<u64>,
    pub first_frame_bytes: Option<u64>,
    pub warnings: Vec<String>,
}

impl CaptureReport {
    pub fn success_ratio(&self) -> f64 {
        if self.expected == 0 {
            0.0
        } else {
            self.captured as f64 / self.expected as f64
        }
    }
}

/// Load `req.html` into `page` and capture every frame of `req.timeline`.
///
/// Individual frame failures are logged and skipped; their slots are filled with the nearest
/// captured frame so the sequence stays contiguous for the encoder. Zero captured frames, a
/// controller that never initializes, or a failing setup call are fatal.
///
/// `phase` is left at `Capturing` on success, ready for the caller to move on to
/// `Compiling`, and at `Failed` otherwise.
#[tracing::instrument(skip_all, fields(html = %req.html.display(), fps = req.fps.as_f64()))]
pub async fn capture_frames(
    page: &mut dyn PageDriver,
    req: &CaptureRequest<'_>,
    opts: &CaptureOpts,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
    phase: &mut CapturePhase,
) -> ReelResult<CaptureReport> {
    let result = run(phase, page, req, opts, progress, cancel).await;
    match result {
        Ok(report) => Ok(report),
        Err(err) => {
            tracing::error!(failed_in = ?*phase, %err, "frame capture failed");
            phase.advance(CapturePhase::Failed);
            Err(err)
        }
    }
}

async fn run(
    phase: &mut CapturePhase,
    page: &mut dyn PageDriver,
    req: &CaptureRequest<'_>,
    opts: &CaptureOpts,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> ReelResult<CaptureReport> {
    let mut report = CaptureReport {
        expected: req.timeline.total_frames(req.fps),
        ..Default::default()
    };
    if report.expected == 0 {
        return Err(ReelError::capture(format!(
            "timeline of {:.3}s is shorter than one frame",
            req.timeline.total()
        )));
    }

    tokio::fs::create_dir_all(req.frames_dir)
        .await
        .with_context(|| format!("failed to create '{}'", req.frames_dir.display()))?;
    page.open(req.html).await?;

    let mut c = Controller::new(page, opts.readiness);
    phase.advance(CapturePhase::AwaitReady);
    c.await_ready().await?;
    let load_errors = c.page_errors().await;
    if !load_errors.is_empty() {
        tracing::warn!(errors = ?load_errors, "render document reported errors while loading");
        report
            .warnings
            .push(format!("page errors during load: {}", load_errors.join("; ")));
    }

    if let Err(e) = c.fonts_ready().await {
        tracing::warn!(err = %e, "web fonts did not finish loading");
        report.warnings.push(format!("web fonts not ready: {e}"));
    }

    phase.advance(CapturePhase::InjectTiming);
    c.set_timing(req.timeline.durations(), req.cues).await?;
    phase.advance(CapturePhase::Rebuild);
    c.rebuild().await?;
    let (page_total, page_cues) = c.timing().await?;
    if (page_total - req.timeline.total()).abs() > 1e-6 || page_cues != req.cues.len() {
        return Err(ReelError::protocol(
            "setTiming",
            format!(
                "page holds {page_total:.3}s and {page_cues} cues, expected {:.3}s and {}",
                req.timeline.total(),
                req.cues.len()
            ),
        ));
    }
    phase.advance(CapturePhase::Start);
    c.start().await?;

    phase.advance(CapturePhase::Capturing);
    let total = report.expected;
    let every = (req.fps.as_f64() * f64::from(opts.progress_every_secs))
        .round()
        .max(1.0) as u64;
    tracing::info!(total, duration = req.timeline.total(), "capturing frames");

    for f in 0..total {
        if cancel.is_cancelled() {
            return Err(ReelError::Cancelled);
        }
        let t = req.fps.frame_time_secs(FrameIndex(f));
        let subtitle = subtitle_at(req.cues, t, opts.highlight_tail);
        let settle = if f == 0 {
            opts.settle_first
        } else {
            opts.settle
        };
        let path = req.frames_dir.join(frame_file_name(FrameIndex(f)));

        let shot: ReelResult<u64> = async {
            c.frame(t, &subtitle).await?;
            tokio::time::sleep(settle).await;
            let png = c.page().screenshot_png().await?;
            tokio::fs::write(&path, &png)
                .await
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            Ok(png.len() as u64)
        }
        .await;

        match shot {
            Ok(bytes) => {
                report.captured += 1;
                if f == 0 {
                    report.first_frame_bytes = Some(bytes);
                    if bytes < opts.min_first_frame_bytes {
                        tracing::warn!(bytes, "first frame is suspiciously small, render may be blank");
                        report.warnings.push(format!(
                            "first frame is only {bytes} bytes; the render may be blank"
                        ));
                    }
                }
            }
            Err(err) => {
                tracing::warn!(frame = f, time = t, %err, "frame capture failed, skipping");
                report.failed_frames.push(f);
            }
        }

        if (f + 1) % every == 0 {
            let fraction = (f + 1) as f64 / total as f64;
            progress.report(
                Phase::Render.at(fraction),
                &format!("Rendering frames... {}%", (fraction * 100.0).round() as u32),
            );
        }
    }

    if report.captured == 0 {
        return Err(ReelError::capture(format!(
            "no frames were captured out of {total}"
        )));
    }
    if report.success_ratio() < opts.min_success_ratio {
        tracing::warn!(
            captured = report.captured,
            expected = total,
            "capture success ratio below threshold"
        );
        report.warnings.push(format!(
            "only {} of {} frames captured",
            report.captured, total
        ));
    }

    fill_gaps(req.frames_dir, total, &report.failed_frames).await?;
    progress.report(Phase::Render.at(1.0), "Rendering frames... 100%");
    tracing::info!(
        captured = report.captured,
        failed = report.failed_frames.len(),
        "capture finished"
    );
    Ok(report)
}

/// Give every failed slot the image of the closest earlier captured frame, or the first
/// captured frame when none precedes it.
async fn fill_gaps(dir: &Path, total: u64, failed: &[u64]) -> ReelResult<()> {
    if failed.is_empty() {
        return Ok(());
    }
    let failed: BTreeSet<u64> = failed.iter().copied().collect();
    let Some(first_ok) = (0..total).find(|f| !failed.contains(f)) else {
        return Ok(());
    };
    let mut last_ok = first_ok;
    for f in 0..total {
        if !failed.contains(&f) {
            last_ok = f;
            continue;
        }
        let source = if f < first_ok { first_ok } else { last_ok };
        let from: PathBuf = dir.join(frame_file_name(FrameIndex(source)));
        let to = dir.join(frame_file_name(FrameIndex(f)));
        tokio::fs::copy(&from, &to)
            .await
            .with_context(|| format!("failed to fill frame {f} from {source}"))?;
    }
    Ok(())
}
