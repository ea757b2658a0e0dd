use async_trait::async_trait;
use serde_json::{Value, json};

use crate::foundation::core::AspectRatio;
use crate::foundation::error::{ReelError, ReelResult};
use crate::script::chat::{ChatClient, ChatRequest, strip_code_fence};
use crate::script::model::VideoScript;

/// Turns a text post into an ordered scene script.
#[async_trait]
pub trait ScriptSource: Send + Sync {
    async fn generate(&self, text: &str, aspect: AspectRatio) -> ReelResult<VideoScript>;
}

pub struct LlmScriptSource {
    chat: ChatClient,
}

impl LlmScriptSource {
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl ScriptSource for LlmScriptSource {
    #[tracing::instrument(skip(self, text), fields(chars = text.chars().count()))]
    async fn generate(&self, text: &str, aspect: AspectRatio) -> ReelResult<VideoScript> {
        let system = system_prompt(aspect);
        let user = user_prompt(text);
        let content = self
            .chat
            .complete(ChatRequest {
                system: &system,
                user: &user,
                temperature: 0.7,
                max_tokens: 4096,
                json_schema: Some(("video_script", script_schema())),
            })
            .await?;

        let script = VideoScript::from_json(strip_code_fence(&content)).map_err(|e| {
            ReelError::upstream(self.chat.provider(), format!("unusable script: {e}"))
        })?;
        tracing::info!(scenes = script.scenes.len(), title = %script.title, "script ready");
        Ok(script)
    }
}

fn system_prompt(aspect: AspectRatio) -> String {
    let canvas = aspect.canvas();
    format!(
        "You are a motion-graphics video writer. Turn short posts into animated explainer \
         video scripts.\n\n\
         FORMAT:\n{context}\nDimensions: {w}x{h} pixels\n\n\
         RULES:\n\
         1. Create 3-6 scenes depending on content length, numbered from 1.\n\
         2. Every scene has 3-5 animated elements; nothing is static.\n\
         3. Voiceover is conversational and takes 5-15 seconds to speak per scene.\n\
         4. Every key concept mentioned in a voiceover gets its own icon or visual.\n\
         5. Use modern colour schemes with high contrast.\n",
        context = aspect.layout_context(),
        w = canvas.width,
        h = canvas.height,
    )
}

fn user_prompt(text: &str) -> String {
    format!(
        "Transform this post into an engaging animated video script:\n\n---\n{text}\n---\n\n\
         Write compelling voiceover (do not just read the post), specific animated visuals per \
         scene, and transitions between scenes."
    )
}

fn script_schema() -> Value {
    let animation = json!({
        "type": "object",
        "properties": {
            "element_type": { "type": "string" },
            "description": { "type": "string" },
            "animation_type": { "type": "string" },
            "animation_direction": {
                "type": "string",
                "enum": ["left", "right", "top", "bottom", "center"]
            },
            "color_scheme": { "type": "string" },
            "position": { "type": "string" },
            "size": { "type": "string", "enum": ["small", "medium", "large", "full"] }
        },
        "required": ["element_type", "description", "animation_type", "position"]
    });
    json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "total_scenes": { "type": "integer" },
            "theme": {
                "type": "string",
                "enum": ["professional", "creative", "minimal", "bold", "tech", "corporate"]
            },
            "primary_color": { "type": "string" },
            "secondary_color": { "type": "string" },
            "font_style": {
                "type": "string",
                "enum": ["modern", "classic", "playful", "tech", "elegant"]
            },
            "scenes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "scene_number": { "type": "integer" },
                        "scene_title": { "type": "string" },
                        "duration_suggestion": { "type": "number" },
                        "voiceover_text": { "type": "string" },
                        "visual_description": { "type": "string" },
                        "background_style": {
                            "type": "string",
                            "enum": ["gradient", "solid", "pattern", "animated"]
                        },
                        "background_colors": { "type": "string" },
                        "animations": { "type": "array", "items": animation },
                        "transition_in": {
                            "type": "string",
                            "enum": ["fade", "slide", "zoom", "wipe"]
                        },
                        "transition_out": {
                            "type": "string",
                            "enum": ["fade", "slide", "zoom", "wipe", "none"]
                        }
                    },
                    "required": [
                        "scene_number", "scene_title", "duration_suggestion", "voiceover_text",
                        "visual_description", "background_style", "background_colors", "animations"
                    ]
                }
            }
        },
        "required": [
            "title", "total_scenes", "theme", "primary_color", "secondary_color", "font_style",
            "scenes"
        ]
    })
}
