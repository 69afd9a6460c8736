use crate::state::{Persist, StateError, StateReader, StateWriter};
use std::fmt;

/// Samples per channel in one audio block.
pub const AUDIO_SAMPLE_LEN: usize = 512;
pub const MAX_CHANNELS: usize = 2;

const CYCLE_TIME: u32 = 64;
const BIG_GOOM_SPEED_LIMIT: f32 = 0.10;
const BIG_GOOM_FACTOR: f32 = 1.0 + 10.0 / 500.0;
const BIG_GOOM_DEBOUNCE: u32 = 100;
const ACCELERATION_MULTIPLIER: f32 = 0.95;
const SPEED_MULTIPLIER: f32 = 0.99;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundError {
    BadChannelCount(usize),
    BadBlockLength { expected: usize, got: usize },
}

impl fmt::Display for SoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadChannelCount(n) => write!(f, "audio block must have 1 or 2 channels, got {n}"),
            Self::BadBlockLength { expected, got } => {
                write!(f, "audio channel must hold {expected} samples, got {got}")
            }
        }
    }
}

impl std::error::Error for SoundError {}

/// One block of 16-bit audio, [`AUDIO_SAMPLE_LEN`] samples per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundSample {
    channels: Vec<Vec<i16>>,
}

impl SoundSample {
    pub fn new(channels: Vec<Vec<i16>>) -> Result<Self, SoundError> {
        if channels.is_empty() || channels.len() > MAX_CHANNELS {
            return Err(SoundError::BadChannelCount(channels.len()));
        }
        for ch in &channels {
            if ch.len() != AUDIO_SAMPLE_LEN {
                return Err(SoundError::BadBlockLength {
                    expected: AUDIO_SAMPLE_LEN,
                    got: ch.len(),
                });
            }
        }
        Ok(Self { channels })
    }

    /// Splits an interleaved block (`L R L R ...` for stereo).
    pub fn from_interleaved(data: &[i16], num_channels: usize) -> Result<Self, SoundError> {
        if num_channels == 0 || num_channels > MAX_CHANNELS {
            return Err(SoundError::BadChannelCount(num_channels));
        }
        let expected = AUDIO_SAMPLE_LEN * num_channels;
        if data.len() != expected {
            return Err(SoundError::BadBlockLength {
                expected,
                got: data.len(),
            });
        }
        let channels = (0..num_channels)
            .map(|c| data.iter().skip(c).step_by(num_channels).copied().collect())
            .collect();
        Self::new(channels)
    }

    pub fn silence(num_channels: usize) -> Result<Self, SoundError> {
        Self::new(vec![vec![0; AUDIO_SAMPLE_LEN]; num_channels])
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Channel `i`; a mono block answers every index with its only channel.
    pub fn channel(&self, i: usize) -> &[i16] {
        let idx = i.min(self.channels.len() - 1);
        &self.channels[idx]
    }
}

/// Running loudness analysis fed one [`SoundSample`] per video frame.
///
/// Volume only looks at the positive half of the waveform against an all-time positive
/// maximum. The signed min/max are tracked as well but do not feed the volume.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundEnvelope {
    volume: f32,
    acceleration: f32,
    speed: f32,
    goom_power: f32,
    goom_limit: f32,
    big_goom_limit: f32,
    max_accel_since_reset: f32,
    all_times_max: i16,
    all_times_min: i16,
    all_times_positive_max: i16,
    time_since_last_goom: u32,
    time_since_last_big_goom: u32,
    total_goom: u32,
    cycle: u32,
    goom: bool,
    big_goom: bool,
}

impl Default for SoundEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundEnvelope {
    pub fn new() -> Self {
        Self {
            volume: 0.0,
            acceleration: 0.0,
            speed: 0.0,
            goom_power: 0.0,
            goom_limit: 1.0,
            big_goom_limit: 1.0,
            max_accel_since_reset: 0.0,
            all_times_max: i16::MIN,
            all_times_min: i16::MAX,
            all_times_positive_max: 1,
            time_since_last_goom: 0,
            time_since_last_big_goom: 0,
            total_goom: 0,
            cycle: 0,
            goom: false,
            big_goom: false,
        }
    }

    pub fn process_sample(&mut self, sample: &SoundSample) {
        self.update_extrema(sample);
        let inc_var = sample.channel(0).iter().copied().max().unwrap_or(0).max(0);

        let prev_accel = self.acceleration;
        let prev_speed = self.speed;

        self.volume = (f32::from(inc_var) / f32::from(self.all_times_positive_max)).clamp(0.0, 1.0);

        let damping = if self.speed < 0.1 {
            1.0 - self.speed
        } else if self.speed < 0.3 {
            0.9 - (self.speed - 0.1) / 2.0
        } else {
            0.8 - (self.speed - 0.3) / 4.0
        };
        self.acceleration = (self.volume * damping * ACCELERATION_MULTIPLIER).clamp(0.0, 1.0);

        let dif_accel = (self.acceleration - prev_accel).abs();
        let raw_speed = (self.speed + dif_accel * 0.5) / 2.0 * SPEED_MULTIPLIER;
        self.speed = ((raw_speed + 3.0 * prev_speed) / 4.0).clamp(0.0, 1.0);

        self.time_since_last_goom = self.time_since_last_goom.saturating_add(1);
        self.time_since_last_big_goom = self.time_since_last_big_goom.saturating_add(1);
        self.cycle = self.cycle.wrapping_add(1);
        self.goom = false;
        self.big_goom = false;

        if self.speed > BIG_GOOM_SPEED_LIMIT
            && self.acceleration > self.big_goom_limit
            && self.time_since_last_big_goom > BIG_GOOM_DEBOUNCE
        {
            self.big_goom = true;
            self.time_since_last_big_goom = 0;
        }

        if self.acceleration > self.goom_limit {
            self.goom = true;
            self.total_goom += 1;
            self.time_since_last_goom = 0;
            self.goom_power = self.acceleration - self.goom_limit;
        }

        if self.acceleration > self.max_accel_since_reset {
            self.max_accel_since_reset = self.acceleration;
        }

        if self.cycle % CYCLE_TIME == 0 {
            self.retune_goom_limit();
        }
    }

    fn update_extrema(&mut self, sample: &SoundSample) {
        // Only the first channel feeds volume, so the extrema track it alone.
        for &v in sample.channel(0) {
            self.all_times_min = self.all_times_min.min(v);
            self.all_times_max = self.all_times_max.max(v);
            if v > self.all_times_positive_max {
                self.all_times_positive_max = v;
            }
        }
    }

    fn retune_goom_limit(&mut self) {
        if self.speed < 0.01 {
            self.goom_limit *= 0.91;
        }
        if self.total_goom > 4 {
            self.goom_limit += 0.02;
        }
        if self.total_goom > 7 {
            self.goom_limit *= 1.03;
            self.goom_limit += 0.03;
        }
        if self.total_goom > 16 {
            self.goom_limit *= 1.05;
            self.goom_limit += 0.04;
        }
        if self.total_goom == 0 {
            self.goom_limit = self.max_accel_since_reset - 0.02;
        }
        if self.total_goom == 1 && self.goom_limit > 0.02 {
            self.goom_limit -= 0.01;
        }
        self.goom_limit = self.goom_limit.clamp(0.0, 1.0);
        log::trace!(
            "goom limit retuned to {:.3} after {} gooms",
            self.goom_limit,
            self.total_goom
        );
        self.total_goom = 0;
        self.big_goom_limit = self.goom_limit * BIG_GOOM_FACTOR;
        self.max_accel_since_reset = 0.0;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn acceleration(&self) -> f32 {
        self.acceleration
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn goom_power(&self) -> f32 {
        self.goom_power
    }

    pub fn goom_limit(&self) -> f32 {
        self.goom_limit
    }

    pub fn big_goom_limit(&self) -> f32 {
        self.big_goom_limit
    }

    pub fn all_times_max(&self) -> i16 {
        self.all_times_max
    }

    pub fn all_times_min(&self) -> i16 {
        self.all_times_min
    }

    pub fn all_times_positive_max(&self) -> i16 {
        self.all_times_positive_max
    }

    pub fn time_since_last_goom(&self) -> u32 {
        self.time_since_last_goom
    }

    pub fn time_since_last_big_goom(&self) -> u32 {
        self.time_since_last_big_goom
    }

    pub fn total_goom(&self) -> u32 {
        self.total_goom
    }

    /// True if the last `process_sample` fired a goom.
    pub fn is_goom(&self) -> bool {
        self.goom
    }

    pub fn is_big_goom(&self) -> bool {
        self.big_goom
    }
}

impl Persist for SoundEnvelope {
    fn save(&self, w: &mut StateWriter) {
        w.section("sound");
        w.put("volume", self.volume);
        w.put("acceleration", self.acceleration);
        w.put("speed", self.speed);
        w.put("goom_power", self.goom_power);
        w.put("goom_limit", self.goom_limit);
        w.put("big_goom_limit", self.big_goom_limit);
        w.put("max_accel_since_reset", self.max_accel_since_reset);
        w.put("all_times_max", self.all_times_max);
        w.put("all_times_min", self.all_times_min);
        w.put("all_times_positive_max", self.all_times_positive_max);
        w.put("time_since_last_goom", self.time_since_last_goom);
        w.put("time_since_last_big_goom", self.time_since_last_big_goom);
        w.put("total_goom", self.total_goom);
        w.put("cycle", self.cycle);
        w.put("goom", self.goom);
        w.put("big_goom", self.big_goom);
    }

    fn restore(&mut self, r: &StateReader) -> Result<(), StateError> {
        let r = r.scoped("sound");
        self.volume = r.get("volume")?;
        self.acceleration = r.get("acceleration")?;
        self.speed = r.get("speed")?;
        self.goom_power = r.get("goom_power")?;
        self.goom_limit = r.get("goom_limit")?;
        self.big_goom_limit = r.get("big_goom_limit")?;
        self.max_accel_since_reset = r.get("max_accel_since_reset")?;
        self.all_times_max = r.get("all_times_max")?;
        self.all_times_min = r.get("all_times_min")?;
        self.all_times_positive_max = r.get("all_times_positive_max")?;
        self.time_since_last_goom = r.get("time_since_last_goom")?;
        self.time_since_last_big_goom = r.get("time_since_last_big_goom")?;
        self.total_goom = r.get("total_goom")?;
        self.cycle = r.get("cycle")?;
        self.goom = r.get_bool("goom")?;
        self.big_goom = r.get_bool("big_goom")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(value: i16) -> SoundSample {
        SoundSample::new(vec![vec![value; AUDIO_SAMPLE_LEN]; 2]).expect("valid block")
    }

    #[test]
    fn mono_block_answers_both_channels() {
        let s = SoundSample::new(vec![vec![3; AUDIO_SAMPLE_LEN]]).expect("mono");
        assert_eq!(s.channel(1)[0], 3);
    }

    #[test]
    fn interleaved_split_keeps_channel_order() {
        let mut data = Vec::with_capacity(AUDIO_SAMPLE_LEN * 2);
        for _ in 0..AUDIO_SAMPLE_LEN {
            data.push(1);
            data.push(-1);
        }
        let s = SoundSample::from_interleaved(&data, 2).expect("stereo");
        assert!(s.channel(0).iter().all(|&v| v == 1));
        assert!(s.channel(1).iter().all(|&v| v == -1));
    }

    #[test]
    fn retune_after_silent_cycle_parks_limit_at_zero() {
        let mut env = SoundEnvelope::new();
        let silent = block(0);
        for _ in 0..CYCLE_TIME {
            env.process_sample(&silent);
        }
        assert_eq!(env.goom_limit(), 0.0);
        assert_eq!(env.big_goom_limit(), 0.0);
    }
}
