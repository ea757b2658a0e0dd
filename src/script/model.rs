use serde::{Deserialize, Serialize};

use crate::foundation::error::{ReelError, ReelResult};

/// One animated element the script asks for inside a scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneAnimation {
    pub element_type: String,
    pub description: String,
    pub animation_type: String,
    #[serde(default, rename = "animation_direction")]
    pub direction: Option<String>,
    #[serde(default)]
    pub color_scheme: Option<String>,
    pub position: String,
    #[serde(default = "default_size")]
    pub size: String,
}

fn default_size() -> String {
    "medium".to_owned()
}

fn default_transition() -> String {
    "fade".to_owned()
}

/// Visual intent of a scene. Opaque to timing and capture; consumed by preset selection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneVisual {
    #[serde(default)]
    pub visual_description: String,
    #[serde(default)]
    pub background_style: String,
    #[serde(default)]
    pub background_colors: String,
    #[serde(default)]
    pub animations: Vec<SceneAnimation>,
    #[serde(default = "default_transition")]
    pub transition_in: String,
    #[serde(default = "default_transition")]
    pub transition_out: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub scene_number: u32,
    pub scene_title: String,
    /// Advisory only; replaced by the measured audio duration.
    pub duration_suggestion: f64,
    pub voiceover_text: String,
    #[serde(flatten)]
    pub visual: SceneVisual,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoScript {
    pub title: String,
    pub theme: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub font_style: String,
    pub scenes: Vec<Scene>,
}

impl VideoScript {
    pub fn from_json(text: &str) -> ReelResult<Self> {
        let script: Self = serde_json::from_str(text)?;
        script.validate()?;
        Ok(script)
    }

    /// Scenes must be numbered 1..=n in order and every scene must have something to say.
    pub fn validate(&self) -> ReelResult<()> {
        if self.scenes.is_empty() {
            return Err(ReelError::validation("script has no scenes"));
        }
        for (i, scene) in self.scenes.iter().enumerate() {
            let expected = i as u32 + 1;
            if scene.scene_number != expected {
                return Err(ReelError::validation(format!(
                    "scene numbers must be contiguous from 1: position {} has number {}",
                    expected, scene.scene_number
                )));
            }
            if scene.voiceover_text.trim().is_empty() {
                return Err(ReelError::validation(format!(
                    "scene {expected} has empty voiceover text"
                )));
            }
            if !scene.duration_suggestion.is_finite() || scene.duration_suggestion < 0.0 {
                return Err(ReelError::validation(format!(
                    "scene {expected} has an invalid duration suggestion"
                )));
            }
        }
        Ok(())
    }

    pub fn is_last(&self, scene: &Scene) -> bool {
        scene.scene_number as usize == self.scenes.len()
    }
}
