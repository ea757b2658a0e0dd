use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::foundation::error::ReelResult;
use crate::script::chat::{ChatClient, ChatRequest, strip_code_fence};
use crate::script::model::{Scene, VideoScript};
use crate::script::preset::{PresetCall, PresetName, background_for, fallback_preset, recent};

/// Picks one preset invocation per scene.
#[async_trait]
pub trait AnimationSelector: Send + Sync {
    /// `used` lists presets already chosen for earlier scenes, oldest first.
    async fn select(
        &self,
        scene: &Scene,
        script: &VideoScript,
        used: &[PresetName],
    ) -> ReelResult<PresetCall>;
}

/// Always answers with [`fallback_preset`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FallbackSelector;

#[async_trait]
impl AnimationSelector for FallbackSelector {
    async fn select(
        &self,
        scene: &Scene,
        script: &VideoScript,
        used: &[PresetName],
    ) -> ReelResult<PresetCall> {
        Ok(fallback_preset(scene, script, used))
    }
}

/// Asks a chat model for `{ "name": ..., "params": {...} }`.
///
/// Transport and non-success responses are errors. A successful answer that cannot be used
/// (unparseable, unknown preset, or one of the recent presets) falls back deterministically.
pub struct LlmSelector {
    chat: ChatClient,
}

impl LlmSelector {
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }
}

#[derive(Debug, Deserialize)]
struct RawSelection {
    name: String,
    #[serde(default)]
    params: Map<String, Value>,
}

#[async_trait]
impl AnimationSelector for LlmSelector {
    #[tracing::instrument(skip_all, fields(scene = scene.scene_number))]
    async fn select(
        &self,
        scene: &Scene,
        script: &VideoScript,
        used: &[PresetName],
    ) -> ReelResult<PresetCall> {
        let system = system_prompt(scene, used);
        let user = user_prompt(scene, script);
        let answer = self
            .chat
            .complete(ChatRequest {
                system: &system,
                user: &user,
                temperature: 0.3,
                max_tokens: 500,
                json_schema: None,
            })
            .await?;

        match interpret(&answer, used) {
            Ok(call) => Ok(call.with_background(scene.scene_number)),
            Err(reason) => {
                tracing::warn!(scene = scene.scene_number, %reason, "using fallback preset");
                Ok(fallback_preset(scene, script, used))
            }
        }
    }
}

fn interpret(answer: &str, used: &[PresetName]) -> Result<PresetCall, String> {
    let raw: RawSelection =
        serde_json::from_str(strip_code_fence(answer)).map_err(|e| format!("unparseable: {e}"))?;
    let name: PresetName = raw.name.parse().map_err(|e| format!("{e}"))?;
    if recent(used).contains(&name) {
        return Err(format!("'{name}' was used recently"));
    }
    Ok(PresetCall {
        name,
        params: raw.params,
    })
}

fn system_prompt(scene: &Scene, used: &[PresetName]) -> String {
    let mut out = String::from(
        "You pick an animation preset for one video scene. Reply with ONLY a JSON object \
         {\"name\": <preset>, \"params\": {...}}.\n\n\
         Text colours must be light. Create an icon for each key concept in the voiceover.\n\n\
         PRESETS:\n",
    );
    for p in PresetName::ALL {
        out.push_str(&format!("- {}: {}\n", p.as_str(), p.signature()));
    }
    out.push_str(
        "\nICONS: ri-lock-fill, ri-shield-fill, ri-key-fill, ri-database-2-fill, ri-server-fill, \
         ri-code-s-slash-fill, ri-rocket-fill, ri-speed-fill, ri-check-double-fill, \
         ri-trophy-fill, ri-lightbulb-flash-fill, ri-bar-chart-box-fill, ri-user-fill, \
         ri-message-3-fill, ri-smartphone-fill, ri-money-dollar-circle-fill, ri-time-fill, \
         ri-settings-fill, ri-star-fill, ri-heart-fill\n",
    );
    out.push_str(&format!(
        "\nUse bgColor \"{}\".",
        background_for(scene.scene_number)
    ));
    let recent = recent(used);
    if !recent.is_empty() {
        let names: Vec<&str> = recent.iter().map(|p| p.as_str()).collect();
        out.push_str(&format!(
            "\nDo NOT use these (used in previous scenes): {}",
            names.join(", ")
        ));
    }
    out
}

fn user_prompt(scene: &Scene, script: &VideoScript) -> String {
    format!(
        "Scene {} of {}:\n\nTitle: {}\nVoiceover: \"{}\"\nVisual: {}\nColors: primary={}, secondary={}",
        scene.scene_number,
        script.scenes.len(),
        scene.scene_title,
        scene.voiceover_text,
        scene.visual.visual_description,
        script.primary_color,
        script.secondary_color,
    )
}

/// Run `selector` over every scene in order, feeding back the running list of used presets.
pub async fn select_all(
    selector: &dyn AnimationSelector,
    script: &VideoScript,
    mut on_scene: impl FnMut(usize, usize),
) -> ReelResult<Vec<PresetCall>> {
    let mut used = Vec::with_capacity(script.scenes.len());
    let mut calls = Vec::with_capacity(script.scenes.len());
    for (i, scene) in script.scenes.iter().enumerate() {
        on_scene(i, script.scenes.len());
        let call = selector.select(scene, script, &used).await?;
        used.push(call.name);
        calls.push(call);
    }
    Ok(calls)
}
