//! reelcast turns a short text post into a narrated explainer video.
//!
//! A job runs strictly in sequence:
//!
//! - a [`ScriptSource`] writes an ordered scene script
//! - an [`AnimationSelector`] picks one animation preset per scene
//! - a [`SpeechSource`] narrates each scene, with word timings for subtitles
//! - the scenes are bound into a [`PageDocument`] and driven frame by frame in headless Chrome
//! - ffmpeg muxes the captured frames with the merged narration into an MP4
//!
//! [`RenderService`] runs jobs on a bounded [`WorkerPool`] and publishes progress through a
//! [`JobStore`].
#![forbid(unsafe_code)]

pub mod audio;
pub mod config;
pub mod encode;
pub(crate) mod foundation;
pub mod job;
pub mod page;
pub mod pipeline;
pub mod render;
pub mod script;
pub mod store;
pub mod timeline;

pub use audio::{
    media::{MergeKind, SceneAudio, merge_all, pad_and_measure, probe_duration},
    speech::{ElevenLabsSpeech, SpeechOutput, SpeechSource, Synthesis, synthesize},
    subtitle::{CueWord, SubtitleCue, SubtitleUpdate, build_subtitle_cues, subtitle_at},
    timing::{CharAlignment, WordTiming, estimate_word_timings, reconstruct_word_timings},
};
pub use config::{Config, LlmConfig, RuntimeConfig, StoreConfig, TtsConfig, WebDriverConfig};
pub use encode::ffmpeg::{
    CompileConfig, CompileOutcome, FRAME_FILE_PATTERN, build_compile_args, compile, frame_file_name,
    is_ffmpeg_on_path, is_ffprobe_on_path,
};
pub use foundation::core::{AspectRatio, Canvas, Fps, FrameIndex, JobId, VideoId};
pub use foundation::error::{ReelError, ReelResult};
pub use job::{
    pool::{JobRunner, WorkerPool},
    progress::{Phase, ProgressReporter, Silent},
    state::{JobHandle, JobSnapshot, JobStatus, JobStore, VideoResult, progress_stream},
};
pub use page::{
    controller::{Controller, PageDriver, ReadinessPolicy},
    template::PageDocument,
};
pub use pipeline::{
    Collaborators, GenerateRequest, MAX_TEXT_CHARS, Pipeline, PipelineConfig, RenderService,
};
pub use render::{
    browser::{BrowserLauncher, WebDriverLauncher},
    capture::{CaptureOpts, CapturePhase, CaptureReport, CaptureRequest, capture_frames},
    session::{RenderOutcome, render_video},
};
pub use script::{
    chat::ChatClient,
    model::{Scene, SceneAnimation, SceneVisual, VideoScript},
    preset::{PresetCall, PresetName, fallback_preset},
    selector::{AnimationSelector, FallbackSelector, LlmSelector},
    source::{LlmScriptSource, ScriptSource},
};
pub use store::{ArtifactStore, HttpStore, LocalStore, publish};
pub use timeline::SceneTimeline;
