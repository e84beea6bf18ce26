#![forbid(unsafe_code)]

//! Byte offset <-> media time.
//!
//! The renderer works in bytes (it reads a byte stream), callers work in
//! time. Once both the asset duration and its total length are known the
//! mapping is `total / duration` bytes per second; before that a nominal
//! rate stands in.

use std::time::Duration;

use derivative::Derivative;

/// 128 kbit/s, a common constant bitrate for compressed audio.
pub const DEFAULT_NOMINAL_BYTE_RATE: u64 = 16_000;

#[derive(Clone, Copy, Debug, Derivative, PartialEq)]
#[derivative(Default)]
pub struct ByteTimeline {
    #[derivative(Default(value = "DEFAULT_NOMINAL_BYTE_RATE"))]
    nominal_byte_rate: u64,
    total: Option<u64>,
    duration: Option<Duration>,
}

impl ByteTimeline {
    #[must_use]
    pub fn new(nominal_byte_rate: u64) -> Self {
        Self {
            nominal_byte_rate: nominal_byte_rate.max(1),
            ..Self::default()
        }
    }

    pub fn set_total(&mut self, total: u64) {
        self.total = Some(total);
    }

    /// Zero durations are treated as unknown.
    pub fn set_duration(&mut self, duration: Option<Duration>) {
        self.duration = duration.filter(|d| !d.is_zero());
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Reported duration, or one estimated from the total at the nominal rate.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
            .or_else(|| self.total.map(|total| self.to_duration(total)))
    }

    #[expect(clippy::cast_precision_loss)]
    pub fn bytes_per_second(&self) -> f64 {
        match (self.total, self.duration) {
            (Some(total), Some(duration)) if total > 0 => total as f64 / duration.as_secs_f64(),
            _ => self.nominal_byte_rate as f64,
        }
    }

    /// Saturates at [`Duration::MAX`] when a reported duration makes the
    /// rate vanishingly small.
    #[expect(clippy::cast_precision_loss)]
    pub fn to_duration(&self, bytes: u64) -> Duration {
        Duration::try_from_secs_f64(bytes as f64 / self.bytes_per_second())
            .unwrap_or(Duration::MAX)
    }

    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_bytes(&self, time: Duration) -> u64 {
        let bytes = (time.as_secs_f64() * self.bytes_per_second()).round() as u64;
        match self.total {
            Some(total) => bytes.min(total),
            None => bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn nominal_rate_before_duration_is_known() {
        let timeline = ByteTimeline::default();
        assert_eq!(timeline.to_duration(200_000), Duration::from_millis(12_500));
        assert_eq!(timeline.to_bytes(Duration::from_secs(2)), 32_000);
        assert_eq!(timeline.duration(), None);
    }

    #[test]
    fn reported_duration_defines_rate() {
        let mut timeline = ByteTimeline::new(16_000);
        timeline.set_total(1_000_000);
        timeline.set_duration(Some(Duration::from_secs(100)));

        assert!((timeline.bytes_per_second() - 10_000.0).abs() < f64::EPSILON);
        assert_eq!(timeline.to_duration(250_000), Duration::from_secs(25));
        assert_eq!(timeline.duration(), Some(Duration::from_secs(100)));
    }

    #[rstest]
    #[case(Duration::from_secs(1), 10_000)]
    #[case(Duration::from_secs(500), 100_000)]
    fn to_bytes_is_clamped_to_total(#[case] time: Duration, #[case] expected: u64) {
        let mut timeline = ByteTimeline::new(10_000);
        timeline.set_total(100_000);
        assert_eq!(timeline.to_bytes(time), expected);
    }

    #[test]
    fn absurd_duration_saturates() {
        let mut timeline = ByteTimeline::new(16_000);
        timeline.set_total(1);
        timeline.set_duration(Some(Duration::MAX));

        assert_eq!(timeline.to_duration(u64::MAX), Duration::MAX);
        assert_eq!(timeline.to_bytes(Duration::from_secs(60)), 0);
    }

    #[test]
    fn zero_duration_is_ignored() {
        let mut timeline = ByteTimeline::new(8_000);
        timeline.set_total(80_000);
        timeline.set_duration(Some(Duration::ZERO));
        assert_eq!(timeline.duration(), Some(Duration::from_secs(10)));
    }
}
