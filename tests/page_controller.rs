//! Drives the generated render document in headless Chrome. Skipped when chromedriver or
//! Chrome is unavailable.

mod common;

use std::process::{Command, Stdio};

use reelcast::{
    AspectRatio, BrowserLauncher, Controller, PageDocument, PageDriver, ReadinessPolicy,
    VideoScript, WebDriverConfig, WebDriverLauncher, fallback_preset,
};
use serde_json::{Value, json};

const DURATIONS: [f64; 3] = [4.0, 3.0, 5.0];

const SEEK_AND_READ: &str = "window.reelController.seek(arguments[0]);\
     const active = document.querySelectorAll('.scene.active');\
     return [Array.from(active).map((el) => el.id), active.length ? active[0].innerHTML : null];";

fn chromedriver_available() -> bool {
    Command::new("chromedriver")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Scene index the cumulative-duration rule assigns to `t`.
fn owning_scene(t: f64) -> usize {
    let mut start = 0.0;
    for (i, d) in DURATIONS.iter().enumerate() {
        if t < start + d {
            return i;
        }
        start += d;
    }
    DURATIONS.len() - 1
}

async fn state_at(page: &mut dyn PageDriver, t: f64) -> (Vec<String>, String) {
    let v = page.evaluate(SEEK_AND_READ, vec![json!(t)]).await.unwrap();
    let ids: Vec<String> = v[0]
        .as_array()
        .unwrap()
        .iter()
        .map(|id| id.as_str().unwrap().to_owned())
        .collect();
    let html = match &v[1] {
        Value::String(s) => s.clone(),
        other => panic!("no active scene at t={t}: {other}"),
    };
    (ids, html)
}

#[tokio::test]
async fn seek_is_a_pure_function_of_time() {
    if !chromedriver_available() {
        eprintln!("skipping: chromedriver not on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let script =
        VideoScript::from_json(&common::script_json(&["One.", "Two.", "Three."])).unwrap();
    let presets = script
        .scenes
        .iter()
        .map(|sc| fallback_preset(sc, &script, &[]))
        .collect();
    let doc = PageDocument::new(&script, AspectRatio::Landscape, presets)
        .unwrap()
        .bind_timing(DURATIONS.to_vec(), Vec::new())
        .unwrap();
    let html = dir.path().join("page.html");
    doc.write_to(&html).await.unwrap();

    let launcher = WebDriverLauncher::new(WebDriverConfig::default());
    let mut page = match launcher.launch(doc.canvas()).await {
        Ok(page) => page,
        Err(e) => {
            eprintln!("skipping: no browser session available: {e}");
            return;
        }
    };
    page.open(&html).await.unwrap();

    let mut c = Controller::new(page.as_mut(), ReadinessPolicy::default());
    c.await_ready().await.unwrap();
    c.set_timing(&DURATIONS, &[]).await.unwrap();
    c.rebuild().await.unwrap();
    c.rebuild().await.unwrap();
    assert_eq!(c.timing().await.unwrap(), (12.0, 0));
    c.start().await.unwrap();
    assert!(c.page_errors().await.is_empty());

    let times = [0.0, 1.25, 3.99, 4.0, 6.5, 7.0, 9.5, 11.9, 12.0, 20.0];
    let mut forward = Vec::new();
    for t in times {
        let (ids, html) = state_at(c.page(), t).await;
        assert_eq!(ids, vec![format!("scene-{}", owning_scene(t) + 1)], "t={t}");
        forward.push(html);
    }

    for (i, t) in times.iter().enumerate().rev() {
        let (_, html) = state_at(c.page(), *t).await;
        assert_eq!(html, forward[i], "reverse seek to {t} changed the frame");
    }
    for i in [8, 0, 5, 2, 9, 3, 7, 1, 6, 4] {
        let (_, html) = state_at(c.page(), times[i]).await;
        assert_eq!(html, forward[i], "shuffled seek to {} changed the frame", times[i]);
    }

    // At or past the end: the last scene at local time zero, the same frame as its start.
    let last_start = state_at(c.page(), 7.0).await;
    assert_eq!(state_at(c.page(), 12.0).await, last_start);
    assert_eq!(state_at(c.page(), 20.0).await, last_start);

    page.close().await.unwrap();
}
