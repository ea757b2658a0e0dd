//! The render document: scene containers, the preset runtime and the timeline controller, with
//! scene timing bound as a typed JSON payload before the page is ever loaded.

use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;

use crate::audio::subtitle::SubtitleCue;
use crate::foundation::core::{AspectRatio, Canvas};
use crate::foundation::error::{ReelError, ReelResult};
use crate::script::model::VideoScript;
use crate::script::preset::PresetCall;

const PAGE_CSS: &str = include_str!("assets/page.css");
const PRESETS_JS: &str = include_str!("assets/presets.js");
const CONTROLLER_JS: &str = include_str!("assets/controller.js");

const FONT_LINKS: &str = "<link href=\"https://fonts.googleapis.com/css2?family=Inter:wght@400;600;800;900&family=Poppins:wght@400;600;800&display=swap\" rel=\"stylesheet\">\n\
<link href=\"https://cdn.jsdelivr.net/npm/remixicon@4.0.0/fonts/remixicon.css\" rel=\"stylesheet\">";

/// Id of the `<script type="application/json">` element holding [`PageData`].
pub const DATA_ELEMENT_ID: &str = "reel-data";

#[derive(Clone, Debug, PartialEq)]
pub struct PageScene {
    pub number: u32,
    pub title: String,
    pub preset: PresetCall,
}

#[derive(Clone, Debug)]
pub struct PageDocument {
    title: String,
    canvas: Canvas,
    scenes: Vec<PageScene>,
    durations: Vec<f64>,
    cues: Vec<SubtitleCue>,
}

#[derive(Serialize)]
struct PageData<'a> {
    width: u32,
    height: u32,
    durations: &'a [f64],
    subtitles: &'a [SubtitleCue],
    scenes: Vec<SceneData<'a>>,
}

#[derive(Serialize)]
struct SceneData<'a> {
    number: u32,
    title: &'a str,
    preset: &'a PresetCall,
}

impl PageDocument {
    /// One preset call per scene, in scene order. Durations start as the script's suggestions.
    pub fn new(
        script: &VideoScript,
        aspect: AspectRatio,
        presets: Vec<PresetCall>,
    ) -> ReelResult<Self> {
        if presets.len() != script.scenes.len() {
            return Err(ReelError::validation(format!(
                "{} preset calls for {} scenes",
                presets.len(),
                script.scenes.len()
            )));
        }
        let scenes = script
            .scenes
            .iter()
            .zip(presets)
            .map(|(s, preset)| PageScene {
                number: s.scene_number,
                title: s.scene_title.clone(),
                preset,
            })
            .collect();
        Ok(Self {
            title: script.title.clone(),
            canvas: aspect.canvas(),
            scenes,
            durations: script.scenes.iter().map(|s| s.duration_suggestion).collect(),
            cues: Vec::new(),
        })
    }

    /// Replace advisory durations with measured ones and attach subtitle cues.
    pub fn bind_timing(mut self, durations: Vec<f64>, cues: Vec<SubtitleCue>) -> ReelResult<Self> {
        if durations.len() != self.scenes.len() {
            return Err(ReelError::validation(format!(
                "{} durations for {} scenes",
                durations.len(),
                self.scenes.len()
            )));
        }
        self.durations = durations;
        self.cues = cues;
        Ok(self)
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn scenes(&self) -> &[PageScene] {
        &self.scenes
    }

    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    pub fn cues(&self) -> &[SubtitleCue] {
        &self.cues
    }

    pub fn render(&self) -> ReelResult<String> {
        let data = PageData {
            width: self.canvas.width,
            height: self.canvas.height,
            durations: &self.durations,
            subtitles: &self.cues,
            scenes: self
                .scenes
                .iter()
                .map(|s| SceneData {
                    number: s.number,
                    title: &s.title,
                    preset: &s.preset,
                })
                .collect(),
        };
        let payload = script_safe_json(&serde_json::to_string(&data)?);

        let Canvas { width, height } = self.canvas;
        let subtitle_bottom = (f64::from(height) * 0.06) as u32;
        let subtitle_size = ((f64::from(height) * 0.026) as u32).max(26);

        let mut containers = String::new();
        for s in &self.scenes {
            containers.push_str(&format!(
                "    <div class=\"scene\" id=\"scene-{}\" data-title=\"{}\"></div>\n",
                s.number,
                escape_html(&s.title)
            ));
        }

        let mut html = String::with_capacity(
            PAGE_CSS.len() + PRESETS_JS.len() + CONTROLLER_JS.len() + payload.len() + 2048,
        );
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\" style=\"");
        html.push_str(&format!(
            "--reel-width:{width}px;--reel-height:{height}px;\
             --reel-subtitle-bottom:{subtitle_bottom}px;--reel-subtitle-size:{subtitle_size}px\">\n"
        ));
        html.push_str("<head>\n<meta charset=\"UTF-8\">\n");
        html.push_str(&format!("<title>{}</title>\n", escape_html(&self.title)));
        html.push_str(FONT_LINKS);
        html.push_str("\n<style>\n");
        html.push_str(PAGE_CSS);
        html.push_str("</style>\n</head>\n<body>\n<div id=\"video-container\">\n");
        html.push_str(&containers);
        html.push_str(
            "    <div id=\"subtitle-container\"><div id=\"subtitle-text\"></div></div>\n</div>\n",
        );
        html.push_str(&format!(
            "<script type=\"application/json\" id=\"{DATA_ELEMENT_ID}\">{payload}</script>\n"
        ));
        html.push_str("<script>\n");
        html.push_str(PRESETS_JS);
        html.push_str("</script>\n<script>\n");
        html.push_str(CONTROLLER_JS);
        html.push_str("</script>\n</body>\n</html>\n");
        Ok(html)
    }

    pub async fn write_to(&self, path: &Path) -> ReelResult<()> {
        let html = self.render()?;
        tokio::fs::write(path, html)
            .await
            .with_context(|| format!("failed to write render document '{}'", path.display()))?;
        Ok(())
    }
}

/// JSON is inert inside a data block as long as no `<` can open a tag or comment.
fn script_safe_json(json: &str) -> String {
    json.replace('<', "\\u003c")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
