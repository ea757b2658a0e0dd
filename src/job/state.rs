//! Per-job state records. Each job owns a `watch` channel: the worker is the only writer and any
//! number of pollers or stream subscribers read the latest snapshot without blocking it.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::foundation::core::{AspectRatio, JobId, VideoId};
use crate::job::progress::ProgressReporter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// What a completed job produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoResult {
    pub video_id: VideoId,
    /// Public reference when uploaded, otherwise the local path.
    pub video_url: String,
    pub local_path: String,
    pub title: String,
    pub duration_secs: f64,
    pub scene_count: usize,
    pub aspect_ratio: AspectRatio,
    pub frames_captured: u64,
    pub frames_expected: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub result: Option<VideoResult>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    fn pending(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            message: "Queued".to_owned(),
            result: None,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Writer side of one job record.
#[derive(Clone, Debug)]
pub struct JobHandle {
    id: JobId,
    tx: Arc<watch::Sender<JobSnapshot>>,
    cancel: CancellationToken,
}

impl JobHandle {
    pub fn new(id: JobId) -> Self {
        let (tx, _rx) = watch::channel(JobSnapshot::pending(id));
        Self {
            id,
            tx: Arc::new(tx),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.tx.subscribe()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move to `processing` and raise progress. Lower values keep the current percentage;
    /// terminal jobs ignore the call.
    pub fn progress(&self, progress: u8, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_if_modified(|s| {
            if s.status.is_terminal() {
                return false;
            }
            s.status = JobStatus::Processing;
            s.progress = s.progress.max(progress.min(99));
            s.message = message;
            s.updated_at = Utc::now();
            true
        });
    }

    pub fn complete(&self, result: VideoResult) {
        self.tx.send_if_modified(|s| {
            if s.status.is_terminal() {
                return false;
            }
            s.status = JobStatus::Complete;
            s.progress = 100;
            s.message = "Video generated successfully!".to_owned();
            s.result = Some(result);
            s.updated_at = Utc::now();
            true
        });
    }

    /// Terminal failure: progress resets to 0 and the message is kept for callers.
    pub fn fail(&self, error: impl Into<String>) {
        let error = error.into();
        self.tx.send_if_modified(|s| {
            if s.status.is_terminal() {
                return false;
            }
            s.status = JobStatus::Error;
            s.progress = 0;
            s.message = "Video generation failed".to_owned();
            s.error = Some(error);
            s.updated_at = Utc::now();
            true
        });
    }
}

impl ProgressReporter for JobHandle {
    fn report(&self, progress: u8, message: &str) {
        self.progress(progress, message);
    }
}

/// Keyed job records shared by the service, its workers and status readers.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, JobHandle>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> JobHandle {
        let handle = JobHandle::new(JobId::new());
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(handle.id(), handle.clone());
        handle
    }

    pub fn get(&self, id: JobId) -> Option<JobHandle> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        self.get(id).map(|h| h.snapshot())
    }

    pub fn watch(&self, id: JobId) -> Option<watch::Receiver<JobSnapshot>> {
        self.get(id).map(|h| h.subscribe())
    }

    /// Request cooperative cancellation. Returns false for unknown or finished jobs.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.get(id) {
            Some(h) if !h.snapshot().status.is_terminal() => {
                h.cancel_token().cancel();
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, id: JobId) -> Option<JobHandle> {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }

    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut out: Vec<JobSnapshot> = self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|h| h.snapshot())
            .collect();
        out.sort_by_key(|s| s.updated_at);
        out
    }
}

/// Snapshots whenever status or progress changes, starting with the current one and ending
/// after the first terminal snapshot.
pub fn progress_stream(rx: watch::Receiver<JobSnapshot>) -> impl Stream<Item = JobSnapshot> {
    futures::stream::unfold(
        (rx, None::<(JobStatus, u8)>, false),
        |(mut rx, last, done)| async move {
            if done {
                return None;
            }
            loop {
                let snap = rx.borrow_and_update().clone();
                let key = (snap.status, snap.progress);
                if last != Some(key) {
                    let terminal = snap.status.is_terminal();
                    return Some((snap, (rx, Some(key), terminal)));
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use futures::StreamExt as _;

    use super::*;

    fn result() -> VideoResult {
        VideoResult {
            video_id: VideoId::generate(),
            video_url: "videos/x.mp4".to_owned(),
            local_path: "videos/x.mp4".to_owned(),
            title: "t".to_owned(),
            duration_secs: 12.0,
            scene_count: 3,
            aspect_ratio: AspectRatio::Landscape,
            frames_captured: 360,
            frames_expected: 360,
        }
    }

    #[test]
    fn progress_never_goes_backwards() {
        let h = JobHandle::new(JobId::new());
        h.progress(30, "a");
        h.progress(20, "b");
        let s = h.snapshot();
        assert_eq!(s.status, JobStatus::Processing);
        assert_eq!(s.progress, 30);
        assert_eq!(s.message, "b");
    }

    #[test]
    fn failure_resets_progress_and_is_final() {
        let h = JobHandle::new(JobId::new());
        h.progress(70, "rendering");
        h.fail("ffmpeg exited");
        h.progress(80, "late update");
        h.complete(result());
        let s = h.snapshot();
        assert_eq!(s.status, JobStatus::Error);
        assert_eq!(s.progress, 0);
        assert_eq!(s.error.as_deref(), Some("ffmpeg exited"));
        assert!(s.result.is_none());
    }

    #[test]
    fn completion_sets_full_progress() {
        let h = JobHandle::new(JobId::new());
        h.progress(99, "uploading");
        h.complete(result());
        let s = h.snapshot();
        assert_eq!(s.status, JobStatus::Complete);
        assert_eq!(s.progress, 100);
        assert!(s.result.is_some());
    }

    #[test]
    fn store_cancels_only_live_jobs() {
        let store = JobStore::new();
        let a = store.create();
        let b = store.create();
        b.fail("boom");
        assert!(store.cancel(a.id()));
        assert!(a.is_cancelled());
        assert!(!store.cancel(b.id()));
        assert!(!store.cancel(JobId::new()));
        assert_eq!(store.list().len(), 2);
        assert!(store.remove(a.id()).is_some());
        assert!(store.snapshot(a.id()).is_none());
    }

    #[tokio::test]
    async fn stream_emits_changes_and_ends_at_terminal() {
        let h = JobHandle::new(JobId::new());
        let stream = progress_stream(h.subscribe());
        let writer = h.clone();
        let task = tokio::spawn(async move {
            for p in [5, 5, 15, 30] {
                writer.progress(p, "step");
                tokio::task::yield_now().await;
            }
            writer.complete(result());
        });
        let seen: Vec<JobSnapshot> = stream.collect().await;
        task.await.unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last.status, JobStatus::Complete);
        assert_eq!(last.progress, 100);
        assert!(seen.windows(2).all(|w| w[0].progress != w[1].progress
            || w[0].status != w[1].status));
    }
}
