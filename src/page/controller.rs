//! Client side of the timeline controller protocol exposed by the render document as
//! `window.reelController`.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::audio::subtitle::{SubtitleCue, SubtitleUpdate};
use crate::foundation::error::{ReelError, ReelResult};

/// A loaded browser page the controller can script and photograph.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate to a local document.
    async fn open(&mut self, path: &Path) -> ReelResult<()>;

    /// Run `script` as a function body; `arguments[i]` refers to `args[i]`.
    async fn evaluate(&mut self, script: &str, args: Vec<Value>) -> ReelResult<Value>;

    /// PNG of the viewport.
    async fn screenshot_png(&mut self) -> ReelResult<Vec<u8>>;

    async fn close(self: Box<Self>) -> ReelResult<()>;
}

/// Bounded polling for the controller handle to appear.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReadinessPolicy {
    pub attempts: u32,
    pub interval: Duration,
    /// Upper bound on each protocol call.
    pub call_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(500),
            call_timeout: Duration::from_secs(10),
        }
    }
}

const READY_CHECK: &str = "return typeof window.reelController !== 'undefined';";
const PAGE_ERRORS: &str = "return window.__reelErrors || [];";
const TIMING_QUERY: &str = "const c = window.reelController; return [c.getDuration(), c.subtitleCount()];";
const FONTS_READY: &str =
    "return document.fonts ? document.fonts.ready.then(() => document.fonts.status) : 'loaded';";

pub struct Controller<'a> {
    page: &'a mut dyn PageDriver,
    policy: ReadinessPolicy,
}

impl<'a> Controller<'a> {
    pub fn new(page: &'a mut dyn PageDriver, policy: ReadinessPolicy) -> Self {
        Self { page, policy }
    }

    pub fn page(&mut self) -> &mut dyn PageDriver {
        &mut *self.page
    }

    async fn call(&mut self, name: &str, script: &str, args: Vec<Value>) -> ReelResult<Value> {
        let limit = self.policy.call_timeout;
        match tokio::time::timeout(limit, self.page.evaluate(script, args)).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(ReelError::protocol(name, e.to_string())),
            Err(_) => Err(ReelError::protocol(
                name,
                format!("timed out after {}s", limit.as_secs_f64()),
            )),
        }
    }

    /// Errors the page recorded while loading or running presets.
    pub async fn page_errors(&mut self) -> Vec<String> {
        match self.call("pageErrors", PAGE_ERRORS, Vec::new()).await {
            Ok(Value::Array(items)) => items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Poll until `window.reelController` exists.
    pub async fn await_ready(&mut self) -> ReelResult<()> {
        let mut last_err = None;
        for attempt in 1..=self.policy.attempts {
            match self.call("awaitReady", READY_CHECK, Vec::new()).await {
                Ok(Value::Bool(true)) => {
                    tracing::debug!(attempt, "controller ready");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => last_err = Some(e.to_string()),
            }
            tracing::debug!(attempt, attempts = self.policy.attempts, "waiting for controller");
            tokio::time::sleep(self.policy.interval).await;
        }
        let errors = self.page_errors().await;
        let mut msg = format!(
            "controller did not initialize after {} attempts; page errors: {:?}",
            self.policy.attempts, errors
        );
        if let Some(e) = last_err {
            msg.push_str(&format!("; last check error: {e}"));
        }
        Err(ReelError::protocol("awaitReady", msg))
    }

    pub async fn set_timing(&mut self, durations: &[f64], cues: &[SubtitleCue]) -> ReelResult<()> {
        let cues = serde_json::to_value(cues)?;
        self.call(
            "setTiming",
            "window.reelController.setSceneDurations(arguments[0]);\
             window.reelController.setSubtitleData(arguments[1]);",
            vec![json!(durations), cues],
        )
        .await?;
        Ok(())
    }

    pub async fn rebuild(&mut self) -> ReelResult<()> {
        self.call("rebuild", "return window.reelController.rebuild();", Vec::new())
            .await?;
        Ok(())
    }

    pub async fn start(&mut self) -> ReelResult<()> {
        self.call("start", "return window.reelController.start();", Vec::new())
            .await?;
        Ok(())
    }

    /// Seek and set the caption in a single round trip.
    pub async fn frame(&mut self, t: f64, subtitle: &SubtitleUpdate<'_>) -> ReelResult<()> {
        let text = match subtitle {
            SubtitleUpdate::Show { text, .. } => json!(text),
            SubtitleUpdate::Clear => Value::Null,
        };
        self.call(
            "seek",
            "return window.reelController.frame(arguments[0], arguments[1], arguments[2]);",
            vec![json!(t), text, json!(subtitle.highlight_arg())],
        )
        .await?;
        Ok(())
    }

    /// Read back the total duration and cue count the page holds.
    pub async fn timing(&mut self) -> ReelResult<(f64, usize)> {
        let v = self.call("getTiming", TIMING_QUERY, Vec::new()).await?;
        match v.as_array().map(|a| a.as_slice()) {
            Some([d, n]) => match (d.as_f64(), n.as_u64()) {
                (Some(d), Some(n)) => Ok((d, n as usize)),
                _ => Err(ReelError::protocol("getTiming", format!("unexpected reply: {v}"))),
            },
            _ => Err(ReelError::protocol("getTiming", format!("unexpected reply: {v}"))),
        }
    }

    /// Wait until the web fonts the document links have loaded, bounded by the call timeout.
    pub async fn fonts_ready(&mut self) -> ReelResult<()> {
        self.call("fontsReady", FONTS_READY, Vec::new()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Script {
        ready_after: u32,
        checks: u32,
        hang_on: Option<&'static str>,
        calls: Vec<(String, Vec<Value>)>,
    }

    struct FakePage(Arc<Mutex<Script>>);

    #[async_trait]
    impl PageDriver for FakePage {
        async fn open(&mut self, _path: &Path) -> ReelResult<()> {
            Ok(())
        }

        async fn evaluate(&mut self, script: &str, args: Vec<Value>) -> ReelResult<Value> {
            let hang = {
                let mut s = self.0.lock().unwrap();
                s.calls.push((script.to_owned(), args));
                if script == READY_CHECK {
                    s.checks += 1;
                    return Ok(Value::Bool(s.checks > s.ready_after));
                }
                if script == PAGE_ERRORS {
                    return Ok(json!(["ReferenceError: anime is not defined"]));
                }
                if script == TIMING_QUERY {
                    return Ok(json!([12.0, 3]));
                }
                s.hang_on.is_some_and(|h| script.contains(h))
            };
            if hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(Value::Bool(true))
        }

        async fn screenshot_png(&mut self) -> ReelResult<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn close(self: Box<Self>) -> ReelResult<()> {
            Ok(())
        }
    }

    fn fast() -> ReadinessPolicy {
        ReadinessPolicy {
            attempts: 10,
            interval: Duration::from_millis(1),
            call_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn ready_after_a_few_probes() {
        let state = Arc::new(Mutex::new(Script {
            ready_after: 3,
            ..Default::default()
        }));
        let mut page = FakePage(state.clone());
        Controller::new(&mut page, fast()).await_ready().await.unwrap();
        assert_eq!(state.lock().unwrap().checks, 4);
    }

    #[tokio::test]
    async fn readiness_failure_carries_page_errors() {
        let state = Arc::new(Mutex::new(Script {
            ready_after: u32::MAX,
            ..Default::default()
        }));
        let mut page = FakePage(state.clone());
        let err = Controller::new(&mut page, fast())
            .await_ready()
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("awaitReady"));
        assert!(err.contains("anime is not defined"));
        assert_eq!(state.lock().unwrap().checks, 10);
    }

    #[tokio::test]
    async fn hung_call_times_out_naming_the_call() {
        let state = Arc::new(Mutex::new(Script {
            hang_on: Some("rebuild"),
            ..Default::default()
        }));
        let mut page = FakePage(state);
        let err = Controller::new(&mut page, fast()).rebuild().await.unwrap_err();
        match err {
            ReelError::Protocol { call, message } => {
                assert_eq!(call, "rebuild");
                assert!(message.contains("timed out"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn frame_sends_null_text_to_clear() {
        let state = Arc::new(Mutex::new(Script::default()));
        let mut page = FakePage(state.clone());
        let mut c = Controller::new(&mut page, fast());
        c.frame(1.5, &SubtitleUpdate::Clear).await.unwrap();
        c.frame(
            2.0,
            &SubtitleUpdate::Show {
                text: "hi there",
                highlight: Some(1),
            },
        )
        .await
        .unwrap();
        let s = state.lock().unwrap();
        assert_eq!(s.calls[0].1, vec![json!(1.5), Value::Null, json!(-1)]);
        assert_eq!(s.calls[1].1, vec![json!(2.0), json!("hi there"), json!(1)]);
    }

    #[tokio::test]
    async fn timing_reads_back_duration_and_cue_count() {
        let state = Arc::new(Mutex::new(Script::default()));
        let mut page = FakePage(state);
        let timing = Controller::new(&mut page, fast()).timing().await.unwrap();
        assert_eq!(timing, (12.0, 3));
    }

    #[tokio::test]
    async fn stalled_font_loading_is_bounded() {
        let state = Arc::new(Mutex::new(Script {
            hang_on: Some("document.fonts"),
            ..Default::default()
        }));
        let mut page = FakePage(state);
        let err = Controller::new(&mut page, fast()).fonts_ready().await.unwrap_err();
        assert!(matches!(err, ReelError::Protocol { ref call, .. } if call == "fontsReady"), "{err}");
    }
}
