use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::encode::ffmpeg::{CompileConfig, CompileOutcome, compile};
use crate::foundation::error::{ReelError, ReelResult};
use crate::job::progress::ProgressReporter;
use crate::render::browser::BrowserLauncher;
use crate::render::capture::{CaptureOpts, CapturePhase, CaptureReport, CaptureRequest, capture_frames};

#[derive(Clone, Debug, PartialEq)]
pub struct RenderOutcome {
    pub report: CaptureReport,
    pub compiled: CompileOutcome,
}

/// Launch a page, capture every frame of `req`, release the browser, then encode the frames
/// with `audio`. The browser is closed on every path out of capture.
#[tracing::instrument(skip_all, fields(out = %compile_cfg.out_path.display()))]
pub async fn render_video(
    launcher: &dyn BrowserLauncher,
    req: &CaptureRequest<'_>,
    audio: &Path,
    compile_cfg: &CompileConfig,
    opts: &CaptureOpts,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> ReelResult<RenderOutcome> {
    let mut phase = CapturePhase::Init;
    let mut page = match launcher.launch(compile_cfg.canvas).await {
        Ok(page) => page,
        Err(e) => {
            phase.advance(CapturePhase::Failed);
            return Err(e);
        }
    };
    let captured = capture_frames(page.as_mut(), req, opts, progress, cancel, &mut phase).await;
    if let Err(e) = page.close().await {
        tracing::warn!(err = %e, "failed to close browser session");
    }
    let report = captured?;

    if cancel.is_cancelled() {
        phase.advance(CapturePhase::Failed);
        return Err(ReelError::Cancelled);
    }

    phase.advance(CapturePhase::Compiling);
    let compiled = match compile(req.frames_dir, audio, compile_cfg).await {
        Ok(c) => c,
        Err(e) => {
            phase.advance(CapturePhase::Failed);
            return Err(e);
        }
    };
    phase.advance(CapturePhase::Done);
    Ok(RenderOutcome { report, compiled })
}
