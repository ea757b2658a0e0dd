use std::{fmt, str::FromStr};

use crate::foundation::error::{ReelError, ReelResult};

/// Absolute 0-based output frame index.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    pub num: u32,
    pub den: u32, // must be > 0
}

impl Fps {
    pub fn new(num: u32, den: u32) -> ReelResult<Self> {
        if den == 0 {
            return Err(ReelError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ReelError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    pub fn integer(fps: u32) -> ReelResult<Self> {
        Self::new(fps, 1)
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Timeline time of frame `f`, computed as `f / fps` without accumulating error.
    pub fn frame_time_secs(self, f: FrameIndex) -> f64 {
        (f.0 as f64) * f64::from(self.den) / f64::from(self.num)
    }

    /// Convert seconds to a frame count using floor semantics.
    pub fn secs_to_frames_floor(self, secs: f64) -> u64 {
        // Sums of f64 durations land a hair under exact multiples (e.g. 11.999999999998).
        const EPS: f64 = 1e-9;
        (secs * self.as_f64() + EPS).floor().max(0.0) as u64
    }

    /// The `-framerate` argument understood by ffmpeg.
    pub fn ffmpeg_rate(self) -> String {
        if self.den == 1 {
            self.num.to_string()
        } else {
            format!("{}/{}", self.num, self.den)
        }
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

/// The three supported output shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "16:9")]
    Landscape,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 3] = [Self::Square, Self::Portrait, Self::Landscape];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait => "9:16",
            Self::Landscape => "16:9",
        }
    }

    pub fn canvas(self) -> Canvas {
        match self {
            Self::Square => Canvas {
                width: 1080,
                height: 1080,
            },
            Self::Portrait => Canvas {
                width: 1080,
                height: 1920,
            },
            Self::Landscape => Canvas {
                width: 1920,
                height: 1080,
            },
        }
    }

    /// Layout guidance handed to the script source alongside the post.
    pub fn layout_context(self) -> &'static str {
        match self {
            Self::Square => {
                "Square format (1080x1080), ideal for feed posts. Keep content centered and \
                 balanced; use larger text and elements since space is compact."
            }
            Self::Portrait => {
                "Vertical format (1080x1920), ideal for short-form mobile video. Stack elements \
                 vertically and use the full height."
            }
            Self::Landscape => {
                "Horizontal format (1920x1080), ideal for presentation-style video. The wide \
                 frame allows side-by-side elements."
            }
        }
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::Landscape
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = ReelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == s.trim())
            .ok_or_else(|| {
                ReelError::validation(format!(
                    "invalid aspect ratio '{s}', must be one of: 1:1, 9:16, 16:9"
                ))
            })
    }
}

/// Opaque key of a job record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct JobId(pub uuid::Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = ReelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ReelError::validation(format!("invalid job id '{s}': {e}")))
    }
}

/// File-system friendly name for one generated video: `reel_<8 hex>_<YYYYmmdd_HHMMSS>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn generate() -> Self {
        let unique = uuid::Uuid::new_v4().simple().to_string();
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        Self(format!("reel_{}_{stamp}", &unique[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
