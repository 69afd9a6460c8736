use goom_fx::color::{channels, evolve_color, evolve_color_all, pack, CHANNEL_MASKS};
use goom_fx::rand::GoomRand;
use goom_fx::sound::{SoundSample, AUDIO_SAMPLE_LEN};
use goom_fx::visual::{fade_pixel, FxCtx, FxError, FxPipeline, IfsFx, TentacleFx, VisualFx};

fn pulse(step: u64) -> SoundSample {
    let v: i16 = if step % 10 < 2 { 24_000 } else { 600 };
    SoundSample::new(vec![vec![v; AUDIO_SAMPLE_LEN]; 2]).expect("block")
}

fn stack() -> Vec<Box<dyn VisualFx>> {
    vec![Box::new(IfsFx::new()), Box::new(TentacleFx::new(2))]
}

fn frames(seed: u64, n: u64) -> Vec<Vec<u32>> {
    let mut p = FxPipeline::new(64, 48, seed, stack()).expect("pipeline");
    (0..n).map(|f| p.process_frame(&pulse(f)).to_vec()).collect()
}

#[test]
fn same_seed_same_frames() {
    assert_eq!(frames(7, 30), frames(7, 30));
}

#[test]
fn different_seeds_diverge() {
    assert_ne!(frames(7, 30), frames(8, 30));
}

#[test]
fn render_into_copies_the_frame() {
    let mut a = FxPipeline::new(40, 30, 5, stack()).expect("pipeline");
    let mut b = FxPipeline::new(40, 30, 5, stack()).expect("pipeline");
    let mut out = vec![0u32; 40 * 30];
    for f in 0..10 {
        b.render_into(&pulse(f), &mut out).expect("render");
        assert_eq!(a.process_frame(&pulse(f)), out.as_slice());
    }
    assert_eq!(b.frame(), 10);
}

#[test]
fn visibility_is_looked_up_by_name() {
    let mut p = FxPipeline::new(16, 16, 1, stack()).expect("pipeline");
    assert_eq!(p.is_visible("ifs"), Some(true));
    assert!(p.set_visible("tentacles", false));
    assert_eq!(p.is_visible("tentacles"), Some(false));
    assert!(!p.set_visible("plasma", false));
    assert_eq!(p.is_visible("plasma"), None);
    assert_eq!(p.effect_names(), vec!["ifs", "tentacles"]);
}

#[test]
fn trails_fade_without_new_strokes() {
    assert_eq!(fade_pixel(pack(80, 160, 240, 0)), pack(70, 140, 210, 0));
    let mut c = pack(255, 255, 255, 255);
    for _ in 0..64 {
        let next = fade_pixel(c);
        for (a, b) in channels(next).iter().zip(channels(c)) {
            assert!(*a <= b);
        }
        c = next;
    }
    assert!(channels(c).iter().all(|&v| v < 8));
}

#[test]
fn evolve_color_never_overshoots() {
    let mut rand = GoomRand::new(31);
    for _ in 0..500 {
        let src = rand.next_u32();
        let dest = rand.next_u32();
        for &mask in &CHANNEL_MASKS {
            let incr = mask & 0x0101_0101;
            let mut c = src;
            let mut dist = u64::from((c & mask).abs_diff(dest & mask));
            for _ in 0..300 {
                c = evolve_color(c, dest, mask, incr);
                assert_eq!(c & !mask, src & !mask);
                let d = u64::from((c & mask).abs_diff(dest & mask));
                assert!(d <= dist);
                dist = d;
            }
            assert_eq!(c & mask, dest & mask);
        }
        let mut c = src;
        for _ in 0..300 {
            c = evolve_color_all(c, dest);
        }
        assert_eq!(c, dest);
    }
}

/// Writes one pixel on the first frame only: into the back buffer at 0, the front at 1.
struct OneShot {
    fired: bool,
}

impl VisualFx for OneShot {
    fn name(&self) -> &'static str {
        "one-shot"
    }

    fn init(&mut self, _w: usize, _h: usize, _rand: &mut GoomRand) -> Result<(), FxError> {
        Ok(())
    }

    fn apply(&mut self, _ctx: &mut FxCtx<'_>, src: &mut [u32], dst: &mut [u32]) {
        if !self.fired {
            src[0] = pack(200, 200, 200, 0);
            dst[1] = pack(200, 200, 200, 0);
            self.fired = true;
        }
    }
}

#[test]
fn back_strokes_persist_and_front_strokes_flash() {
    let effects: Vec<Box<dyn VisualFx>> = vec![Box::new(OneShot { fired: false })];
    let mut p = FxPipeline::new(4, 4, 1, effects).expect("pipeline");
    let silence = SoundSample::silence(2).expect("silence");

    let first = p.process_frame(&silence).to_vec();
    assert_eq!(first[0], 0);
    assert_eq!(first[1], pack(200, 200, 200, 0));

    let second = p.process_frame(&silence).to_vec();
    assert_eq!(second[0], fade_pixel(pack(200, 200, 200, 0)));
    assert_eq!(second[1], 0);

    let third = p.process_frame(&silence);
    assert_eq!(third[0], fade_pixel(second[0]));
}
