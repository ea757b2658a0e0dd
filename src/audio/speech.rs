use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;

use crate::audio::timing::{
    CharAlignment, WordTiming, estimate_word_timings, reconstruct_word_timings,
};
use crate::config::TtsConfig;
use crate::foundation::error::{ReelError, ReelResult};

const PROVIDER: &str = "speech source";

/// Raw answer of a speech source.
#[derive(Clone, Debug, Default)]
pub struct SpeechOutput {
    /// Encoded audio (MP3).
    pub audio: Vec<u8>,
    pub alignment: Option<CharAlignment>,
}

#[async_trait]
pub trait SpeechSource: Send + Sync {
    async fn speak(&self, text: &str) -> ReelResult<SpeechOutput>;
}

/// Synthesized narration with word timings.
#[derive(Clone, Debug)]
pub struct Synthesis {
    pub audio: Vec<u8>,
    pub words: Vec<WordTiming>,
    /// `true` when timings came from the length heuristic rather than the provider.
    pub estimated: bool,
}

/// Speak `text` and derive word timings, estimating them when alignment is missing.
#[tracing::instrument(skip(source, text), fields(chars = text.chars().count()))]
pub async fn synthesize(source: &dyn SpeechSource, text: &str) -> ReelResult<Synthesis> {
    let out = source.speak(text).await?;
    if out.audio.is_empty() {
        return Err(ReelError::upstream(PROVIDER, "returned empty audio"));
    }

    let (words, estimated) = match out.alignment {
        Some(ref a) if a.is_usable() => (reconstruct_word_timings(a), false),
        Some(_) => {
            tracing::warn!("alignment data malformed, estimating word timings");
            (estimate_word_timings(text, 0.0), true)
        }
        None => {
            tracing::debug!("no alignment data, estimating word timings");
            (estimate_word_timings(text, 0.0), true)
        }
    };

    Ok(Synthesis {
        audio: out.audio,
        words,
        estimated,
    })
}

/// ElevenLabs-style `text-to-speech/{voice}/with-timestamps` client.
#[derive(Clone, Debug)]
pub struct ElevenLabsSpeech {
    http: reqwest::Client,
    api_key: String,
    voice_id: String,
    model_id: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct WithTimestamps {
    #[serde(default)]
    audio_base64: String,
    #[serde(default)]
    alignment: Option<CharAlignment>,
}

impl ElevenLabsSpeech {
    pub fn new(cfg: &TtsConfig) -> ReelResult<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| ReelError::validation("TTS_API_KEY is not set"))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ReelError::upstream(PROVIDER, format!("http client: {e}")))?;
        Ok(Self {
            http,
            api_key,
            voice_id: cfg.voice_id.clone(),
            model_id: cfg.model_id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl SpeechSource for ElevenLabsSpeech {
    async fn speak(&self, text: &str) -> ReelResult<SpeechOutput> {
        let url = format!(
            "{}/text-to-speech/{}/with-timestamps",
            self.base_url, self.voice_id
        );
        let payload = json!({
            "text": text,
            "model_id": self.model_id,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.75,
                "style": 0.0,
                "use_speaker_boost": true,
            },
        });

        let response = self
            .http
            .post(url)
            .header("xi-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ReelError::upstream(PROVIDER, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReelError::upstream(
                PROVIDER,
                format!("{} - {}", status.as_u16(), body.trim()),
            ));
        }

        let parsed: WithTimestamps = response
            .json()
            .await
            .map_err(|e| ReelError::upstream(PROVIDER, format!("bad response body: {e}")))?;
        decode_payload(parsed)
    }
}

fn decode_payload(parsed: WithTimestamps) -> ReelResult<SpeechOutput> {
    let audio = base64::engine::general_purpose::STANDARD
        .decode(parsed.audio_base64.as_bytes())
        .map_err(|e| ReelError::upstream(PROVIDER, format!("audio is not base64: {e}")))?;
    Ok(SpeechOutput {
        audio,
        alignment: parsed.alignment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(Option<CharAlignment>);

    #[async_trait]
    impl SpeechSource for Canned {
        async fn speak(&self, _text: &str) -> ReelResult<SpeechOutput> {
            Ok(SpeechOutput {
                audio: vec![0xFF, 0xFB, 0x90, 0x00],
                alignment: self.0.clone(),
            })
        }
    }

    #[tokio::test]
    async fn missing_alignment_falls_back_to_estimates() {
        let s = synthesize(&Canned(None), "Hello world").await.unwrap();
        assert!(s.estimated);
        assert_eq!(s.words.len(), 2);
        assert!((s.words[1].start - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn usable_alignment_is_reconstructed() {
        let alignment = CharAlignment {
            characters: vec!["o".into(), "k".into()],
            starts: vec![0.0, 0.1],
            ends: vec![0.1, 0.25],
        };
        let s = synthesize(&Canned(Some(alignment)), "ok").await.unwrap();
        assert!(!s.estimated);
        assert_eq!(s.words[0].word, "ok");
        assert!((s.words[0].end - 0.25).abs() < 1e-9);
    }

    #[test]
    fn payload_decodes_base64_and_alignment() {
        let parsed: WithTimestamps = serde_json::from_str(
            r#"{"audio_base64":"AAEC","alignment":{"characters":["a"],
                "character_start_times_seconds":[0.0],"character_end_times_seconds":[0.2]}}"#,
        )
        .unwrap();
        let out = decode_payload(parsed).unwrap();
        assert_eq!(out.audio, vec![0, 1, 2]);
        assert!(out.alignment.unwrap().is_usable());
    }
}
