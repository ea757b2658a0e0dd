mod common;

use common::{ffmpeg_tools_available, tone_mp3};
use reelcast::{
    MergeKind, build_subtitle_cues, estimate_word_timings, merge_all, pad_and_measure,
    probe_duration,
};

#[tokio::test]
async fn padding_extends_the_track_by_exactly_the_requested_silence() {
    if !ffmpeg_tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("tone.mp3");
    tone_mp3(&src, 2.0).unwrap();
    let bytes = std::fs::read(&src).unwrap();

    let work = dir.path().join("job");
    let words = estimate_word_timings("Hello world", 0.0);
    let audio = pad_and_measure(1, "Hello world", words, &bytes, &work, 1.0)
        .await
        .unwrap();

    assert_eq!(audio.padding, 1.0);
    assert_eq!(audio.duration, audio.original_duration + 1.0);
    assert!((audio.original_duration - 2.0).abs() < 0.15, "{}", audio.original_duration);
    assert!(!work.join("raw_scene_1.mp3").exists());

    let probed = probe_duration(&audio.path).await.unwrap();
    assert!((probed - audio.duration).abs() < 0.3, "{probed} vs {}", audio.duration);
}

#[tokio::test]
async fn single_scene_merge_is_a_plain_copy() {
    if !ffmpeg_tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("tone.mp3");
    tone_mp3(&src, 1.0).unwrap();
    let bytes = std::fs::read(&src).unwrap();
    let audio = pad_and_measure(1, "Only scene", Vec::new(), &bytes, dir.path(), 0.0)
        .await
        .unwrap();
    assert_eq!(audio.padding, 0.0);

    let merged = dir.path().join("merged.mp3");
    assert_eq!(merge_all(&[audio.clone()], &merged).await.unwrap(), MergeKind::Copied);
    assert_eq!(std::fs::read(&merged).unwrap(), std::fs::read(&audio.path).unwrap());
}

#[tokio::test]
async fn merged_scenes_line_up_with_their_cues() {
    if !ffmpeg_tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut audios = Vec::new();
    for (n, secs, text) in [(1u32, 1.5, "First scene"), (2, 1.0, "Second scene")] {
        let src = dir.path().join(format!("tone_{n}.mp3"));
        tone_mp3(&src, secs).unwrap();
        let bytes = std::fs::read(&src).unwrap();
        let words = estimate_word_timings(text, 0.0);
        audios.push(
            pad_and_measure(n, text, words, &bytes, dir.path(), 0.5)
                .await
                .unwrap(),
        );
    }

    let merged = dir.path().join("merged.mp3");
    assert_eq!(
        merge_all(&audios, &merged).await.unwrap(),
        MergeKind::Concatenated
    );
    let total: f64 = audios.iter().map(|a| a.duration).sum();
    let probed = probe_duration(&merged).await.unwrap();
    assert!((probed - total).abs() < 0.4, "{probed} vs {total}");

    let cues = build_subtitle_cues(&audios);
    assert_eq!(cues.len(), 2);
    assert_eq!(cues[0].start_time, 0.0);
    assert_eq!(cues[0].end_time, audios[0].original_duration);
    assert_eq!(cues[1].start_time, audios[0].duration);
    assert!(cues[0].end_time < cues[1].start_time);
    assert_eq!(cues[1].words[0].start, audios[0].duration);
}
