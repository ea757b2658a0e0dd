/// Coarse pipeline phases and the slice of 0..=100 each one owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Script,
    Selection,
    Audio,
    Timing,
    Render,
    Upload,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Self::Script,
        Self::Selection,
        Self::Audio,
        Self::Timing,
        Self::Render,
        Self::Upload,
    ];

    /// Inclusive `(start, end)` percentages.
    pub fn band(self) -> (u8, u8) {
        match self {
            Self::Script => (1, 15),
            Self::Selection => (15, 25),
            Self::Audio => (25, 50),
            Self::Timing => (50, 55),
            Self::Render => (55, 95),
            Self::Upload => (95, 100),
        }
    }

    /// Position `fraction` of the way through the band, rounded and clamped.
    pub fn at(self, fraction: f64) -> u8 {
        let (lo, hi) = self.band();
        let f = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let span = f64::from(hi - lo);
        (f64::from(lo) + (f * span).round()).min(f64::from(hi)) as u8
    }
}

/// Sink for `(percent, message)` updates.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: u8, message: &str);
}

/// Discards updates.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl ProgressReporter for Silent {
    fn report(&self, _progress: u8, _message: &str) {}
}

impl<F> ProgressReporter for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, progress: u8, message: &str) {
        self(progress, message)
    }
}
