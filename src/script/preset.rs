//! The fixed library of parameterized animation presets and deterministic fallback selection.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::foundation::error::ReelError;
use crate::script::model::{Scene, VideoScript};

/// Dark scene backgrounds, indexed by `scene_number % 8`.
pub const DARK_BACKGROUNDS: [&str; 8] = [
    "#0f0f1a", "#1a1a2e", "#16213e", "#0d1b2a", "#1b2838", "#2d132c", "#0a192f", "#1f1f2e",
];

/// How many of the most recent presets a new selection must avoid.
pub const RECENT_WINDOW: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PresetName {
    HeroTitleReveal,
    ConceptShowcase,
    IconGridReveal,
    BulletPointList,
    StatisticShowcase,
    BeforeAfterComparison,
    MultiStatReveal,
    ImpactMetrics,
    ProcessFlow,
    CallToAction,
    KeyTakeaway,
    QuoteReveal,
    CelebrationFinale,
}

impl PresetName {
    pub const ALL: [PresetName; 13] = [
        Self::HeroTitleReveal,
        Self::ConceptShowcase,
        Self::IconGridReveal,
        Self::BulletPointList,
        Self::StatisticShowcase,
        Self::BeforeAfterComparison,
        Self::MultiStatReveal,
        Self::ImpactMetrics,
        Self::ProcessFlow,
        Self::CallToAction,
        Self::KeyTakeaway,
        Self::QuoteReveal,
        Self::CelebrationFinale,
    ];

    /// Order in which fallback selection tries presets for middle scenes.
    pub const FALLBACK_ORDER: [PresetName; 10] = [
        Self::HeroTitleReveal,
        Self::ConceptShowcase,
        Self::StatisticShowcase,
        Self::BulletPointList,
        Self::IconGridReveal,
        Self::KeyTakeaway,
        Self::ImpactMetrics,
        Self::ProcessFlow,
        Self::CallToAction,
        Self::QuoteReveal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeroTitleReveal => "heroTitleReveal",
            Self::ConceptShowcase => "conceptShowcase",
            Self::IconGridReveal => "iconGridReveal",
            Self::BulletPointList => "bulletPointList",
            Self::StatisticShowcase => "statisticShowcase",
            Self::BeforeAfterComparison => "beforeAfterComparison",
            Self::MultiStatReveal => "multiStatReveal",
            Self::ImpactMetrics => "impactMetrics",
            Self::ProcessFlow => "processFlow",
            Self::CallToAction => "callToAction",
            Self::KeyTakeaway => "keyTakeaway",
            Self::QuoteReveal => "quoteReveal",
            Self::CelebrationFinale => "celebrationFinale",
        }
    }

    /// Parameter signature shown to the selector.
    pub fn signature(self) -> &'static str {
        match self {
            Self::HeroTitleReveal => "{ title, subtitle, icon, primaryColor, secondaryColor } - opening scenes, big announcements",
            Self::ConceptShowcase => "{ concepts: [{ icon, label, description }], title, primaryColor, secondaryColor } - 2-5 key concepts",
            Self::IconGridReveal => "{ items: [{ icon, label }], columns, title, primaryColor, secondaryColor } - grid of concept icons",
            Self::BulletPointList => "{ title, items: [string], icons: [string], primaryColor, secondaryColor } - list with icons",
            Self::StatisticShowcase => "{ number, suffix, label, icon, color } - single big statistic",
            Self::BeforeAfterComparison => "{ beforeValue, afterValue, unit, label, beforeColor, afterColor } - compare two values",
            Self::MultiStatReveal => "{ stats: [{ value, suffix, label, icon }], title, primaryColor, secondaryColor } - several stats",
            Self::ImpactMetrics => "{ metrics: [{ icon, value, suffix, label }], title, primaryColor, secondaryColor } - three impact metrics",
            Self::ProcessFlow => "{ steps: [string], primaryColor, secondaryColor } - sequential steps",
            Self::CallToAction => "{ question, subtext, icon, primaryColor, secondaryColor } - closing engagement prompt",
            Self::KeyTakeaway => "{ takeaway, icon, primaryColor, secondaryColor } - single important message",
            Self::QuoteReveal => "{ quote, author, primaryColor, secondaryColor } - key statement",
            Self::CelebrationFinale => "{ title, subtitle, primaryColor, secondaryColor } - final celebration",
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresetName {
    type Err = ReelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ReelError::validation(format!("unknown preset '{s}'")))
    }
}

/// One preset invocation bound to a scene container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresetCall {
    pub name: PresetName,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl PresetCall {
    pub fn new(name: PresetName, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { name, params }
    }

    /// Force the scene's palette background onto the call.
    pub fn with_background(mut self, scene_number: u32) -> Self {
        self.params.insert(
            "bgColor".to_owned(),
            Value::String(background_for(scene_number).to_owned()),
        );
        self
    }
}

pub fn background_for(scene_number: u32) -> &'static str {
    DARK_BACKGROUNDS[scene_number as usize % DARK_BACKGROUNDS.len()]
}

/// The last [`RECENT_WINDOW`] entries of `used`.
pub fn recent(used: &[PresetName]) -> &[PresetName] {
    &used[used.len().saturating_sub(RECENT_WINDOW)..]
}

/// Deterministic choice: opener for scene 1, call to action for the last scene, otherwise the
/// first preset in [`PresetName::FALLBACK_ORDER`] not among the recent ones.
pub fn fallback_preset(scene: &Scene, script: &VideoScript, used: &[PresetName]) -> PresetCall {
    let name = if scene.scene_number == 1 {
        PresetName::HeroTitleReveal
    } else if script.is_last(scene) {
        PresetName::CallToAction
    } else {
        let recent = recent(used);
        PresetName::FALLBACK_ORDER
            .into_iter()
            .find(|p| !recent.contains(p))
            .unwrap_or(
                PresetName::FALLBACK_ORDER
                    [scene.scene_number as usize % PresetName::FALLBACK_ORDER.len()],
            )
    };
    PresetCall::new(name, fallback_params(name, &scene.scene_title, script))
        .with_background(scene.scene_number)
}

fn fallback_params(name: PresetName, title: &str, script: &VideoScript) -> Value {
    let pc = script.primary_color.as_str();
    let sc = script.secondary_color.as_str();
    match name {
        PresetName::HeroTitleReveal => json!({
            "title": title, "subtitle": "Let's explore", "icon": "ri-rocket-fill",
            "primaryColor": pc, "secondaryColor": sc,
        }),
        PresetName::ConceptShowcase => json!({
            "title": title,
            "concepts": [
                { "icon": "ri-lightbulb-flash-fill", "label": "Key Idea" },
                { "icon": "ri-settings-fill", "label": "Method" },
                { "icon": "ri-code-s-slash-fill", "label": "Result" },
            ],
            "primaryColor": pc, "secondaryColor": sc,
        }),
        PresetName::StatisticShowcase => json!({
            "number": 73, "suffix": "%", "label": "Improvement", "icon": "ri-speed-fill",
            "color": pc,
        }),
        PresetName::BulletPointList => json!({
            "title": title,
            "items": ["First key point", "Second key point", "Third key point"],
            "icons": ["ri-check-double-fill", "ri-star-fill", "ri-trophy-fill"],
            "primaryColor": pc, "secondaryColor": sc,
        }),
        PresetName::IconGridReveal => json!({
            "title": title,
            "items": [
                { "icon": "ri-shield-fill", "label": "Security" },
                { "icon": "ri-speed-fill", "label": "Speed" },
                { "icon": "ri-database-2-fill", "label": "Data" },
                { "icon": "ri-code-s-slash-fill", "label": "Code" },
            ],
            "columns": 2, "primaryColor": pc, "secondaryColor": sc,
        }),
        PresetName::KeyTakeaway => json!({
            "takeaway": title, "icon": "ri-lightbulb-flash-fill",
            "primaryColor": pc, "secondaryColor": sc,
        }),
        PresetName::ImpactMetrics | PresetName::MultiStatReveal => json!({
            "title": title,
            "metrics": [
                { "icon": "ri-user-fill", "value": 95, "suffix": "%", "label": "Users" },
                { "icon": "ri-speed-fill", "value": 73, "suffix": "%", "label": "Faster" },
                { "icon": "ri-money-dollar-circle-fill", "value": 40, "suffix": "%", "label": "Savings" },
            ],
            "primaryColor": pc, "secondaryColor": sc,
        }),
        PresetName::ProcessFlow => json!({
            "steps": ["Step 1", "Step 2", "Step 3"], "primaryColor": pc, "secondaryColor": sc,
        }),
        PresetName::CallToAction => json!({
            "question": title, "subtext": "Share your thoughts!", "icon": "ri-chat-smile-3-fill",
            "primaryColor": pc, "secondaryColor": sc,
        }),
        PresetName::QuoteReveal => json!({
            "quote": title, "author": "The Key Insight", "primaryColor": pc, "secondaryColor": sc,
        }),
        PresetName::BeforeAfterComparison => json!({
            "beforeValue": 100, "afterValue": 27, "unit": "ms", "label": title,
            "beforeColor": sc, "afterColor": pc,
        }),
        PresetName::CelebrationFinale => json!({
            "title": title, "subtitle": "Thanks for watching", "primaryColor": pc, "secondaryColor": sc,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::model::fixtures::script;

    #[test]
    fn names_round_trip_through_serde_and_from_str() {
        for p in PresetName::ALL {
            let json = serde_json::to_string(&p).unwrap();
            assert_eq!(json, format!("\"{}\"", p.as_str()));
            assert_eq!(p.as_str().parse::<PresetName>().unwrap(), p);
        }
        assert!("spinningCube".parse::<PresetName>().is_err());
    }

    #[test]
    fn first_and_last_scenes_are_fixed() {
        let s = script(&["a", "b", "c"]);
        assert_eq!(
            fallback_preset(&s.scenes[0], &s, &[]).name,
            PresetName::HeroTitleReveal
        );
        assert_eq!(
            fallback_preset(&s.scenes[2], &s, &[PresetName::CallToAction]).name,
            PresetName::CallToAction
        );
    }

    #[test]
    fn middle_scenes_skip_the_last_three_used() {
        let s = script(&["a", "b", "c", "d"]);
        let used = [
            PresetName::HeroTitleReveal,
            PresetName::ConceptShowcase,
            PresetName::StatisticShowcase,
        ];
        let call = fallback_preset(&s.scenes[1], &s, &used);
        assert_eq!(call.name, PresetName::BulletPointList);

        // Only the trailing window counts.
        let used = [
            PresetName::ConceptShowcase,
            PresetName::HeroTitleReveal,
            PresetName::StatisticShowcase,
            PresetName::BulletPointList,
        ];
        let call = fallback_preset(&s.scenes[2], &s, &used);
        assert_eq!(call.name, PresetName::ConceptShowcase);
    }

    #[test]
    fn every_call_gets_the_palette_background() {
        let s = script(&["a", "b", "c"]);
        let call = fallback_preset(&s.scenes[1], &s, &[]);
        assert_eq!(call.params["bgColor"], DARK_BACKGROUNDS[2]);
        assert_eq!(call.params["primaryColor"], "#3B82F6");
    }
}
