#![allow(dead_code)]

use std::{
    collections::HashSet,
    io::Cursor,
    path::Path,
    process::{Command, Stdio},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use reelcast::{
    AspectRatio, BrowserLauncher, Canvas, PageDriver, ReelError, ReelResult, ScriptSource,
    SpeechOutput, SpeechSource, VideoScript,
};
use serde_json::{Value, json};

pub fn ffmpeg_tools_available() -> bool {
    reelcast::is_ffmpeg_on_path() && reelcast::is_ffprobe_on_path()
}

/// Write `secs` of a 440 Hz tone as MP3.
pub fn tone_mp3(path: &Path, secs: f64) -> anyhow::Result<()> {
    let status = Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-f", "lavfi", "-i"])
        .arg(format!("sine=frequency=440:sample_rate=44100:duration={secs}"))
        .args(["-ac", "2", "-c:a", "libmp3lame", "-b:a", "128k"])
        .arg(path)
        .stdout(Stdio::null())
        .status()?;
    anyhow::ensure!(status.success(), "ffmpeg failed creating {}", path.display());
    Ok(())
}

pub fn solid_png(canvas: Canvas, rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(canvas.width, canvas.height, image::Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// What a [`FakePage`] saw and how it should misbehave.
#[derive(Default)]
pub struct PageLog {
    pub opened: Vec<String>,
    pub scripts: Vec<(String, Vec<Value>)>,
    pub shots: u64,
    pub closed: bool,
    /// What the last `setSceneDurations`/`setSubtitleData` call handed the page.
    pub durations: Vec<f64>,
    pub cue_count: usize,
}

pub struct FakePage {
    pub log: Arc<Mutex<PageLog>>,
    pub canvas: Canvas,
    pub ready: bool,
    pub fail_shots: HashSet<u64>,
    /// Scripts containing this text throw.
    pub fail_call: Option<&'static str>,
    /// Accept timing calls without storing them.
    pub ignore_timing: bool,
}

impl FakePage {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            log: Arc::new(Mutex::new(PageLog::default())),
            canvas,
            ready: true,
            fail_shots: HashSet::new(),
            fail_call: None,
            ignore_timing: false,
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn open(&mut self, path: &Path) -> ReelResult<()> {
        self.log
            .lock()
            .unwrap()
            .opened
            .push(path.display().to_string());
        Ok(())
    }

    async fn evaluate(&mut self, script: &str, args: Vec<Value>) -> ReelResult<Value> {
        let mut log = self.log.lock().unwrap();
        log.scripts.push((script.to_owned(), args.clone()));
        if let Some(needle) = self.fail_call.filter(|n| script.contains(n)) {
            return Err(ReelError::capture(format!("javascript error: {needle} threw")));
        }
        if script.contains("typeof window.reelController") {
            return Ok(Value::Bool(self.ready));
        }
        if script.contains("__reelErrors") {
            return Ok(if self.ready {
                json!([])
            } else {
                json!(["SyntaxError: Unexpected token"])
            });
        }
        if script.contains("setSceneDurations") && !self.ignore_timing {
            log.durations = args[0]
                .as_array()
                .map(|a| a.iter().filter_map(Value::as_f64).collect())
                .unwrap_or_default();
            log.cue_count = args[1].as_array().map_or(0, Vec::len);
        }
        if script.contains("getDuration") {
            let total: f64 = log.durations.iter().sum();
            return Ok(json!([total, log.cue_count]));
        }
        Ok(Value::Null)
    }

    async fn screenshot_png(&mut self) -> ReelResult<Vec<u8>> {
        let n = {
            let mut log = self.log.lock().unwrap();
            let n = log.shots;
            log.shots += 1;
            n
        };
        if self.fail_shots.contains(&n) {
            return Err(ReelError::capture(format!("screenshot {n} failed")));
        }
        let shade = (n % 200) as u8;
        Ok(solid_png(self.canvas, [shade, 40, 90]))
    }

    async fn close(self: Box<Self>) -> ReelResult<()> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Hands out [`FakePage`]s sharing one log.
#[derive(Default)]
pub struct FakeLauncher {
    pub log: Arc<Mutex<PageLog>>,
    pub never_ready: bool,
    pub fail_call: Option<&'static str>,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, canvas: Canvas) -> ReelResult<Box<dyn PageDriver>> {
        let mut page = FakePage::new(canvas);
        page.log = Arc::clone(&self.log);
        page.ready = !self.never_ready;
        page.fail_call = self.fail_call;
        Ok(Box::new(page))
    }
}

pub fn script_json(voiceovers: &[&str]) -> String {
    let scenes: Vec<Value> = voiceovers
        .iter()
        .enumerate()
        .map(|(i, v)| {
            json!({
                "scene_number": i + 1,
                "scene_title": format!("Scene {}", i + 1),
                "duration_suggestion": 3.0,
                "voiceover_text": v,
                "visual_description": "bold headline on a dark background",
            })
        })
        .collect();
    json!({
        "title": "Small teams ship faster",
        "theme": "tech",
        "primary_color": "#3B82F6",
        "secondary_color": "#10B981",
        "font_style": "modern",
        "scenes": scenes,
    })
    .to_string()
}

pub struct FixedScript(pub Vec<&'static str>);

#[async_trait]
impl ScriptSource for FixedScript {
    async fn generate(&self, _text: &str, _aspect: AspectRatio) -> ReelResult<VideoScript> {
        VideoScript::from_json(&script_json(&self.0))
    }
}

pub struct FailingScript;

#[async_trait]
impl ScriptSource for FailingScript {
    async fn generate(&self, _text: &str, _aspect: AspectRatio) -> ReelResult<VideoScript> {
        Err(ReelError::upstream("script source", "429 - rate limited"))
    }
}

/// Serves the same MP3 for every request, without alignment data.
pub struct CannedSpeech(pub Vec<u8>);

#[async_trait]
impl SpeechSource for CannedSpeech {
    async fn speak(&self, _text: &str) -> ReelResult<SpeechOutput> {
        Ok(SpeechOutput {
            audio: self.0.clone(),
            alignment: None,
        })
    }
}
