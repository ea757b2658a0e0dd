//! Scene durations making up one video and the frame count they span.

use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};

/// Ordered scene durations (seconds, padded) making up one video.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneTimeline {
    durations: Vec<f64>,
    total: f64,
}

impl SceneTimeline {
    pub fn new(durations: Vec<f64>) -> ReelResult<Self> {
        if durations.is_empty() {
            return Err(ReelError::validation("timeline needs at least one scene"));
        }
        if let Some((i, d)) = durations
            .iter()
            .enumerate()
            .find(|(_, d)| !d.is_finite() || **d <= 0.0)
        {
            return Err(ReelError::validation(format!(
                "scene {} has invalid duration {d}",
                i + 1
            )));
        }
        let total = durations.iter().sum();
        Ok(Self { durations, total })
    }

    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn total_frames(&self, fps: Fps) -> u64 {
        fps.secs_to_frames_floor(self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_scene_video_has_360_frames_at_30fps() {
        let tl = SceneTimeline::new(vec![4.0, 3.0, 5.0]).unwrap();
        assert_eq!(tl.total(), 12.0);
        assert_eq!(tl.total_frames(Fps::integer(30).unwrap()), 360);
    }

    #[test]
    fn rejects_empty_or_non_positive_durations() {
        assert!(SceneTimeline::new(vec![]).is_err());
        assert!(SceneTimeline::new(vec![1.0, 0.0]).is_err());
        assert!(SceneTimeline::new(vec![f64::NAN]).is_err());
    }
}
