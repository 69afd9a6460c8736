/// The one random source every effect draws from.
///
/// Effects never own a generator of their own: the pipeline threads a single `GoomRand`
/// through every call so that a fixed seed replays the exact same frame sequence.
#[derive(Debug, Clone)]
pub struct GoomRand {
    seed: u64,
    rng: fastrand::Rng,
}

impl GoomRand {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    /// Seed this generator was created (or last reseeded) with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng.seed(seed);
    }

    /// Internal generator state, suitable for `restore_state`.
    pub fn state(&self) -> u64 {
        self.rng.get_seed()
    }

    pub fn restore_state(&mut self, state: u64) {
        self.rng.seed(state);
    }

    pub fn next_u32(&mut self) -> u32 {
        self.rng.u32(..)
    }

    /// Uniform on `[0, n)`. Returns 0 for `n == 0`.
    pub fn next_u32_in_range(&mut self, n: u32) -> u32 {
        if n == 0 {
            return 0;
        }
        self.rng.u32(0..n)
    }

    pub fn range_i32(&mut self, lo: i32, hi: i32) -> i32 {
        if hi <= lo {
            return lo;
        }
        self.rng.i32(lo..hi)
    }

    /// Uniform on `[lo, hi]`.
    pub fn range_f32(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.unit_f32()
    }

    /// Uniform on `[0, 1]`, built from the integer stream so it replays exactly.
    pub fn unit_f32(&mut self) -> f32 {
        const STEPS: u32 = 1 << 24;
        self.next_u32_in_range(STEPS + 1) as f32 / STEPS as f32
    }

    /// True with probability `m / n`.
    pub fn probability_of_m_in_n(&mut self, m: u32, n: u32) -> bool {
        if n == 0 {
            return false;
        }
        self.next_u32_in_range(n) < m
    }

    pub fn coin(&mut self) -> bool {
        self.next_u32_in_range(2) == 1
    }
}

impl Default for GoomRand {
    fn default() -> Self {
        Self::new(0x6007_F00D)
    }
}

#[cfg(test)]
mod tests {
    use super::GoomRand;

    #[test]
    fn same_seed_same_stream() {
        let mut a = GoomRand::new(42);
        let mut b = GoomRand::new(42);
        for _ in 0..64 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn ranges_stay_in_bounds() {
        let mut r = GoomRand::new(7);
        for _ in 0..1000 {
            assert!(r.next_u32_in_range(5) < 5);
            let f = r.range_f32(-2.0, 3.0);
            assert!((-2.0..=3.0).contains(&f));
            let i = r.range_i32(-4, 4);
            assert!((-4..4).contains(&i));
        }
        assert_eq!(r.next_u32_in_range(0), 0);
    }

    #[test]
    fn restored_state_replays() {
        let mut r = GoomRand::new(99);
        r.next_u32();
        let saved = r.state();
        let expected: Vec<u32> = (0..8).map(|_| r.next_u32()).collect();
        r.restore_state(saved);
        let replay: Vec<u32> = (0..8).map(|_| r.next_u32()).collect();
        assert_eq!(expected, replay);
    }
}
