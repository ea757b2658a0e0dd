//! End-to-end generation: text post → script → presets → narration → render document →
//! frames → MP4 → published reference, with job progress published along the way.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audio::media::{SceneAudio, merge_all, pad_and_measure};
use crate::audio::speech::{ElevenLabsSpeech, SpeechSource, synthesize};
use crate::audio::subtitle::build_subtitle_cues;
use crate::config::{Config, RuntimeConfig};
use crate::encode::ffmpeg::CompileConfig;
use crate::foundation::core::{AspectRatio, Fps, VideoId};
use crate::foundation::error::{ReelError, ReelResult};
use crate::job::pool::{JobRunner, WorkerPool};
use crate::job::state::{JobHandle, JobStore, VideoResult};
use crate::page::template::PageDocument;
use crate::render::browser::{BrowserLauncher, WebDriverLauncher};
use crate::render::capture::{CaptureOpts, CaptureRequest};
use crate::render::session::render_video;
use crate::script::chat::ChatClient;
use crate::script::selector::{AnimationSelector, LlmSelector, select_all};
use crate::script::source::{LlmScriptSource, ScriptSource};
use crate::store::{ArtifactStore, HttpStore, publish};
use crate::timeline::SceneTimeline;

pub const MAX_TEXT_CHARS: usize = 1500;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub text: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    /// Overrides the configured frame rate.
    #[serde(default)]
    pub fps: Option<u32>,
}

impl GenerateRequest {
    pub fn new(text: impl Into<String>, aspect_ratio: AspectRatio) -> Self {
        Self {
            text: text.into(),
            aspect_ratio,
            fps: None,
        }
    }

    pub fn validate(&self) -> ReelResult<()> {
        if self.text.trim().is_empty() {
            return Err(ReelError::validation("text must not be empty"));
        }
        let chars = self.text.chars().count();
        if chars > MAX_TEXT_CHARS {
            return Err(ReelError::validation(format!(
                "text is {chars} characters, the limit is {MAX_TEXT_CHARS}"
            )));
        }
        if let Some(fps) = self.fps {
            Fps::integer(fps)?;
        }
        Ok(())
    }
}

/// The external services one generation talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub script: Arc<dyn ScriptSource>,
    pub selector: Arc<dyn AnimationSelector>,
    pub speech: Arc<dyn SpeechSource>,
    pub browser: Arc<dyn BrowserLauncher>,
    pub store: Option<Arc<dyn ArtifactStore>>,
}

impl Collaborators {
    pub fn from_config(cfg: &Config) -> ReelResult<Self> {
        let store: Option<Arc<dyn ArtifactStore>> = match HttpStore::from_config(&cfg.store)? {
            Some(s) => Some(Arc::new(s)),
            None => None,
        };
        Ok(Self {
            script: Arc::new(LlmScriptSource::new(ChatClient::new(
                &cfg.llm,
                "script source",
            )?)),
            selector: Arc::new(LlmSelector::new(ChatClient::new(
                &cfg.llm,
                "animation selector",
            )?)),
            speech: Arc::new(ElevenLabsSpeech::new(&cfg.tts)?),
            browser: Arc::new(WebDriverLauncher::new(cfg.webdriver.clone())),
            store,
        })
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    pub fps: Fps,
    pub crf: u8,
    pub padding_secs: f64,
    pub capture: CaptureOpts,
}

impl PipelineConfig {
    pub fn from_runtime(rt: &RuntimeConfig) -> Self {
        Self {
            temp_dir: rt.temp_dir.clone(),
            output_dir: rt.output_dir.clone(),
            fps: rt.fps,
            crf: rt.crf,
            padding_secs: rt.padding_secs,
            capture: CaptureOpts::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_runtime(&RuntimeConfig::default())
    }
}

/// Per-job scratch directory. `cleanup` removes it without blocking a runtime thread; a
/// workspace dropped without it (the job future was dropped mid-run) is removed synchronously.
struct TempWorkspace {
    root: PathBuf,
    removed: bool,
}

impl TempWorkspace {
    async fn create(root: PathBuf) -> ReelResult<Self> {
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create temp dir '{}'", root.display()))?;
        Ok(Self {
            root,
            removed: false,
        })
    }

    fn path(&self) -> &Path {
        &self.root
    }

    async fn cleanup(mut self) {
        self.removed = true;
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => tracing::debug!(dir = %self.root.display(), "temp dir removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(dir = %self.root.display(), err = %e, "failed to remove temp dir"),
        }
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => tracing::debug!(dir = %self.root.display(), "temp dir removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(dir = %self.root.display(), err = %e, "failed to remove temp dir"),
        }
    }
}

fn checkpoint(job: &JobHandle) -> ReelResult<()> {
    if job.is_cancelled() {
        Err(ReelError::Cancelled)
    } else {
        Ok(())
    }
}

pub struct Pipeline {
    collab: Collaborators,
    cfg: PipelineConfig,
}

impl Pipeline {
    pub fn new(collab: Collaborators, cfg: PipelineConfig) -> Self {
        Self { collab, cfg }
    }

    /// Run `req` to completion and record the outcome on `job`.
    #[tracing::instrument(skip_all, fields(job = %job.id()))]
    pub async fn run_job(&self, job: &JobHandle, req: &GenerateRequest) {
        match self.run(job, req).await {
            Ok(result) => {
                tracing::info!(url = %result.video_url, "job complete");
                job.complete(result);
            }
            Err(err) => {
                tracing::error!(%err, "job failed");
                job.fail(err.to_string());
            }
        }
    }

    pub async fn run(&self, job: &JobHandle, req: &GenerateRequest) -> ReelResult<VideoResult> {
        req.validate()?;
        checkpoint(job)?;
        let fps = match req.fps {
            Some(n) => Fps::integer(n)?,
            None => self.cfg.fps,
        };
        let video_id = VideoId::generate();
        let ws = TempWorkspace::create(self.cfg.temp_dir.join(video_id.as_str())).await?;
        let result = self.generate(job, req, fps, video_id, &ws).await;
        ws.cleanup().await;
        result
    }

    async fn generate(
        &self,
        job: &JobHandle,
        req: &GenerateRequest,
        fps: Fps,
        video_id: VideoId,
        ws: &TempWorkspace,
    ) -> ReelResult<VideoResult> {
        let aspect = req.aspect_ratio;
        tracing::info!(%video_id, aspect = aspect.as_str(), "generation started");

        job.progress(1, "Starting video generation...");
        job.progress(5, "Generating video script...");
        let script = self.collab.script.generate(&req.text, aspect).await?;
        script.validate()?;
        let n = script.scenes.len();
        job.progress(15, format!("Script generated with {n} scenes"));

        checkpoint(job)?;
        job.progress(20, "Creating animations...");
        let presets = select_all(self.collab.selector.as_ref(), &script, |i, n| {
            tracing::debug!(scene = i + 1, of = n, "selecting preset");
        })
        .await?;
        let doc = PageDocument::new(&script, aspect, presets)?;
        job.progress(25, "Animations selected");

        job.progress(30, "Generating voiceover audio...");
        let mut audios: Vec<SceneAudio> = Vec::with_capacity(n);
        for (i, scene) in script.scenes.iter().enumerate() {
            checkpoint(job)?;
            job.progress(
                30 + (i * 20 / n) as u8,
                format!("Generating audio for scene {}/{n}...", i + 1),
            );
            let synth = synthesize(self.collab.speech.as_ref(), &scene.voiceover_text).await?;
            if synth.estimated {
                tracing::info!(scene = scene.scene_number, "word timings estimated");
            }
            audios.push(
                pad_and_measure(
                    scene.scene_number,
                    &scene.voiceover_text,
                    synth.words,
                    &synth.audio,
                    ws.path(),
                    self.cfg.padding_secs,
                )
                .await?,
            );
        }
        job.progress(50, "Audio generation complete");

        let durations: Vec<f64> = audios.iter().map(|a| a.duration).collect();
        let timeline = SceneTimeline::new(durations.clone())?;
        let cues = build_subtitle_cues(&audios);
        job.progress(52, "Synchronizing timing data...");
        let doc = doc.bind_timing(durations, cues)?;
        let html = ws.path().join("page.html");
        doc.write_to(&html).await?;

        let merged = ws.path().join("merged.mp3");
        merge_all(&audios, &merged).await?;
        job.progress(55, "Audio merged");

        checkpoint(job)?;
        job.progress(60, "Rendering video frames...");
        let file_name = format!("{video_id}.mp4");
        let out_path = self.cfg.output_dir.join(&file_name);
        let compile_cfg = CompileConfig::new(doc.canvas(), fps, &out_path).with_crf(self.cfg.crf);
        let frames_dir = ws.path().join("frames");
        let capture_req = CaptureRequest {
            html: &html,
            frames_dir: &frames_dir,
            timeline: &timeline,
            cues: doc.cues(),
            fps,
        };
        let outcome = match render_video(
            self.collab.browser.as_ref(),
            &capture_req,
            &merged,
            &compile_cfg,
            &self.cfg.capture,
            job,
            job.cancel_token(),
        )
        .await
        {
            Ok(o) => o,
            Err(err) => {
                if tokio::fs::remove_file(&out_path).await.is_ok() {
                    tracing::debug!(path = %out_path.display(), "removed partial output");
                }
                return Err(err);
            }
        };
        for w in &outcome.report.warnings {
            tracing::warn!(warning = %w, "capture");
        }
        job.progress(95, "Video rendering complete");

        let video_url = match self.collab.store.as_deref() {
            Some(store) => {
                job.progress(97, "Uploading to cloud storage...");
                let url = publish(Some(store), &out_path, &file_name).await;
                job.progress(99, "Upload complete");
                url
            }
            None => out_path.display().to_string(),
        };

        Ok(VideoResult {
            video_id,
            video_url,
            local_path: out_path.display().to_string(),
            title: script.title.clone(),
            duration_secs: timeline.total(),
            scene_count: n,
            aspect_ratio: aspect,
            frames_captured: outcome.report.captured,
            frames_expected: outcome.report.expected,
        })
    }
}

struct QueuedJob {
    handle: JobHandle,
    request: GenerateRequest,
}

struct PipelineRunner {
    pipeline: Arc<Pipeline>,
}

#[async_trait]
impl JobRunner<QueuedJob> for PipelineRunner {
    async fn run(&self, worker_id: usize, item: QueuedJob) {
        tracing::info!(worker_id, job = %item.handle.id(), "job picked up");
        self.pipeline.run_job(&item.handle, &item.request).await;
    }
}

/// Job store plus the worker pool that executes submitted generations.
pub struct RenderService {
    jobs: Arc<JobStore>,
    pool: WorkerPool<QueuedJob>,
}

impl RenderService {
    pub fn start(pipeline: Pipeline, workers: usize) -> ReelResult<Self> {
        let runner = Arc::new(PipelineRunner {
            pipeline: Arc::new(pipeline),
        });
        Ok(Self {
            jobs: Arc::new(JobStore::new()),
            pool: WorkerPool::start(workers, workers * 4, runner)?,
        })
    }

    /// Wire the configured collaborators into a pipeline and run it on
    /// `cfg.runtime.workers` workers.
    pub fn from_config(cfg: &Config) -> ReelResult<Self> {
        let pipeline = Pipeline::new(
            Collaborators::from_config(cfg)?,
            PipelineConfig::from_runtime(&cfg.runtime),
        );
        Self::start(pipeline, cfg.runtime.workers)
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    /// Validate and enqueue. Invalid requests never create a job.
    pub async fn submit(&self, request: GenerateRequest) -> ReelResult<JobHandle> {
        request.validate()?;
        let handle = self.jobs.create();
        self.pool
            .submit(QueuedJob {
                handle: handle.clone(),
                request,
            })
            .await?;
        Ok(handle)
    }

    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_validated() {
        assert!(GenerateRequest::new("  \n", AspectRatio::Square).validate().is_err());
        assert!(
            GenerateRequest::new("x".repeat(MAX_TEXT_CHARS + 1), AspectRatio::Square)
                .validate()
                .is_err()
        );
        assert!(
            GenerateRequest::new("é".repeat(MAX_TEXT_CHARS), AspectRatio::Square)
                .validate()
                .is_ok()
        );
        let mut bad_fps = GenerateRequest::new("hi", AspectRatio::Portrait);
        bad_fps.fps = Some(0);
        assert!(bad_fps.validate().is_err());
    }

    #[test]
    fn requests_default_to_landscape() {
        let req: GenerateRequest = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(req.aspect_ratio, AspectRatio::Landscape);
        let req: GenerateRequest =
            serde_json::from_str(r#"{"text":"hello","aspect_ratio":"9:16"}"#).unwrap();
        assert_eq!(req.aspect_ratio, AspectRatio::Portrait);
    }

    #[tokio::test]
    async fn service_runs_the_configured_number_of_workers() {
        let cfg = Config::from_lookup(|key| match key {
            "LLM_API_KEY" | "TTS_API_KEY" => Some("test-key".to_owned()),
            "REEL_WORKERS" => Some("3".to_owned()),
            _ => None,
        })
        .unwrap();
        let service = RenderService::from_config(&cfg).unwrap();
        assert_eq!(service.workers(), 3);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn workspace_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("reel_x");
        let ws = TempWorkspace::create(root.clone()).await.unwrap();
        tokio::fs::write(ws.path().join("page.html"), "x").await.unwrap();
        drop(ws);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn cleanup_removes_the_workspace_and_disarms_drop() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("reel_y");
        let ws = TempWorkspace::create(root.clone()).await.unwrap();
        tokio::fs::create_dir_all(ws.path().join("frames")).await.unwrap();
        tokio::fs::write(ws.path().join("frames/frame_000000.png"), "x")
            .await
            .unwrap();
        ws.cleanup().await;
        assert!(!root.exists());
    }
}
