use goom_fx::rand::GoomRand;
use goom_fx::sound::{SoundEnvelope, SoundSample, AUDIO_SAMPLE_LEN};
use goom_fx::state::{StateReader, StateWriter};
use goom_fx::visual::tentacles::{
    blend_angle, ChangeTracker, PrettyMove, SineOscillator, TentacleFx, Trend,
};
use goom_fx::visual::{FxCtx, VisualFx};
use std::f32::consts::{PI, TAU};

const W: usize = 320;
const H: usize = 240;

fn angular_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(TAU);
    d.min(TAU - d)
}

#[test]
fn camera_rotation_moves_less_than_half_a_turn_per_frame() {
    let mut rand = GoomRand::new(77);
    let mut mover = PrettyMove::default();
    let mut cycle = 0.0f32;
    let mut events = 0;
    for _ in 0..20_000 {
        let before = mover.rot();
        if mover.step(cycle, &mut rand) {
            events += 1;
        }
        let after = mover.rot();
        assert!((0.0..TAU).contains(&after), "rot {after} not wrapped");
        assert!(angular_distance(before, after) <= PI);
        cycle += 0.01;
    }
    assert!(events > 0, "no camera event in 20000 frames");
}

#[test]
fn camera_events_lock_out_restarts() {
    let mut rand = GoomRand::new(5);
    let mut mover = PrettyMove::default();
    let mut cycle = 0.0f32;
    let mut started = None;
    for frame in 0..50_000u32 {
        if mover.step(cycle, &mut rand) {
            started = Some(frame);
            break;
        }
        cycle += 0.01;
    }
    assert!(started.is_some());
    let happens = mover.happens();
    assert!((100..=160).contains(&happens), "happens = {happens}");
    assert_eq!(mover.lock(), happens * 3 / 2);

    for _ in 0..happens {
        assert!(!mover.step(cycle, &mut rand));
    }
    assert_eq!(mover.happens(), 0);
    for _ in 0..mover.lock() {
        assert!(!mover.step(cycle, &mut rand));
    }
    assert_eq!(mover.lock(), 0);
}

#[test]
fn camera_distance_settles_between_targets() {
    let mut rand = GoomRand::new(8);
    let mut mover = PrettyMove::default();
    let mut cycle = 0.0f32;
    for _ in 0..5_000 {
        mover.step(cycle, &mut rand);
        cycle += 0.01;
        assert!(mover.distt().is_finite());
        assert!(mover.distt() <= 286.0 + 1e-3);
        assert!((0.0..=8.0).contains(&mover.distt2()));
    }
    assert!(mover.distt() > 60.0);
}

#[test]
fn blend_angle_never_jumps_the_long_way() {
    for i in 0..64 {
        let rot = i as f32 * TAU / 64.0;
        for j in 0..64 {
            let target = j as f32 * TAU / 64.0;
            let next = blend_angle(rot, target);
            assert!(angular_distance(rot, next) <= PI / 16.0 + 1e-4);
        }
    }
}

#[test]
fn oscillator_frequency_is_bounded() {
    let mut o = SineOscillator::new(0.5, 1.5);
    o.set_frequency(0.0);
    assert_eq!(o.frequency(), SineOscillator::MIN_FREQUENCY);
    o.set_frequency(1.0);
    let first = o.next_value();
    assert!((first - 1.0).abs() < 1e-6);
}

#[test]
fn tracker_reports_falling_runs() {
    let mut t = ChangeTracker::default();
    let mut seen = Vec::new();
    for i in 0..30 {
        if let Some(trend) = t.observe(1.0 - i as f32 * 0.02) {
            seen.push((i, trend));
        }
    }
    assert_eq!(seen, vec![(10, Trend::Falling), (20, Trend::Falling)]);
}

fn pulse(step: usize) -> SoundSample {
    let v: i16 = if step % 16 < 2 { 28_000 } else { 1_500 };
    let ch: Vec<i16> = (0..AUDIO_SAMPLE_LEN)
        .map(|i| if i % 2 == 0 { v } else { -v })
        .collect();
    SoundSample::new(vec![ch.clone(), ch]).expect("block")
}

struct Harness {
    rand: GoomRand,
    sound: SoundEnvelope,
    src: Vec<u32>,
    dst: Vec<u32>,
    step: usize,
}

impl Harness {
    fn new(seed: u64) -> Self {
        Self {
            rand: GoomRand::new(seed),
            sound: SoundEnvelope::new(),
            src: vec![0; W * H],
            dst: vec![0; W * H],
            step: 0,
        }
    }

    fn frame(&mut self, fx: &mut TentacleFx, visible: bool) {
        let sample = pulse(self.step);
        self.sound.process_sample(&sample);
        self.dst.iter_mut().for_each(|p| *p = 0);
        let mut ctx = FxCtx {
            sound: &self.sound,
            sample: &sample,
            rand: &mut self.rand,
            visible,
        };
        fx.apply(&mut ctx, &mut self.src, &mut self.dst);
        std::mem::swap(&mut self.src, &mut self.dst);
        self.step += 1;
    }
}

#[test]
fn init_builds_requested_grids() {
    let mut h = Harness::new(1);
    let mut fx = TentacleFx::new(4);
    fx.init(W, H, &mut h.rand).expect("init");
    assert_eq!(fx.num_grids(), 4);
    for i in 0..4 {
        let g = fx.grid(i).expect("grid");
        assert_eq!(g.num_x(), 15);
        assert!((45..55).contains(&g.num_z()));
    }
    assert!(fx.grid(4).is_none());
}

#[test]
fn visible_tentacles_light_the_frame() {
    let mut h = Harness::new(2);
    let mut fx = TentacleFx::new(6);
    fx.init(W, H, &mut h.rand).expect("init");
    let mut lit_frames = 0;
    for _ in 0..40 {
        h.frame(&mut fx, true);
        if h.src.iter().any(|&p| p != 0) {
            lit_frames += 1;
        }
    }
    assert!(lit_frames > 30, "only {lit_frames} lit frames");
}

#[test]
fn hidden_tentacles_retract() {
    let mut h = Harness::new(3);
    let mut fx = TentacleFx::new(2);
    fx.init(W, H, &mut h.rand).expect("init");
    for _ in 0..3 {
        h.frame(&mut fx, false);
    }
    assert!((fx.lig() - 1.05).abs() < 1e-6);
    let cycle = fx.cycle();
    h.frame(&mut fx, false);
    assert!((fx.cycle() - cycle - 0.1).abs() < 1e-4);
    assert!(h.src.iter().all(|&p| p == 0));
}

#[test]
fn tentacle_colour_walks_toward_destination() {
    let mut h = Harness::new(4);
    let mut fx = TentacleFx::new(2);
    fx.init(W, H, &mut h.rand).expect("init");
    for _ in 0..400 {
        let before = fx.color().to_le_bytes();
        let dest = fx.destination_color().to_le_bytes();
        h.frame(&mut fx, true);
        let after = fx.color().to_le_bytes();
        let new_dest = fx.destination_color().to_le_bytes();
        if new_dest != dest {
            continue;
        }
        for c in 0..4 {
            let (b, a, d) = (before[c] as i32, after[c] as i32, dest[c] as i32);
            assert!((a - d).abs() <= (b - d).abs());
        }
    }
}

fn dump(fx: &TentacleFx) -> String {
    let mut w = StateWriter::new();
    fx.save(&mut w);
    w.to_text()
}

#[test]
fn saved_grids_restore_heights_and_colors() {
    let mut h = Harness::new(21);
    let mut fx = TentacleFx::new(3);
    fx.init(W, H, &mut h.rand).expect("init");
    for _ in 0..60 {
        h.frame(&mut fx, true);
    }
    let text = dump(&fx);

    let mut fresh_rand = GoomRand::new(21);
    let mut restored = TentacleFx::new(3);
    restored.init(W, H, &mut fresh_rand).expect("init");
    let reader = StateReader::parse(&text).expect("parse");
    restored.restore(&reader).expect("restore");

    for i in 0..3 {
        let a = fx.grid(i).expect("grid").vertices();
        let b = restored.grid(i).expect("grid").vertices();
        assert_eq!(a, b, "grid {i} vertices differ");
    }
    assert!(fx.grid(0).expect("grid").vertices().iter().any(|v| v.y != 0.0));
    assert_eq!(dump(&restored), text);
}

#[test]
fn restore_rejects_heights_for_a_different_grid() {
    let mut h = Harness::new(22);
    let mut fx = TentacleFx::new(1);
    fx.init(W, H, &mut h.rand).expect("init");
    let text = dump(&fx);
    let line = text
        .lines()
        .find(|l| l.starts_with("tentacles.heights[0]="))
        .expect("heights line");
    let shorter = text.replace(line, "tentacles.heights[0]=0,0");
    let reader = StateReader::parse(&shorter).expect("parse");
    assert!(fx.restore(&reader).is_err());
}
