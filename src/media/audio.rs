// SPDX-License-Identifier: GPL-3.0-only

//! Interleaved PCM audio buffers

use std::sync::Arc;
use std::time::Duration;

/// A chunk of interleaved signed 16-bit PCM samples
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Arc<[i16]>,
    sample_rate: u32,
    channels: u16,
    timestamp: Duration,
}

impl AudioBuffer {
    pub fn new(samples: impl Into<Arc<[i16]>>, sample_rate: u32, channels: u16, timestamp: Duration) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: channels.max(1),
            timestamp,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Presentation timestamp of the first sample
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Playback length of the buffer
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() / self.channels as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_counts_interleaved_frames() {
        let buf = AudioBuffer::new(vec![0i16; 48_000 * 2], 48_000, 2, Duration::ZERO);
        assert_eq!(buf.duration(), Duration::from_secs(1));
    }
}
