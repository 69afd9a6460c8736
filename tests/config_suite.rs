use clap::Parser;
use goom_fx::config::{Config, ConfigError, EffectKind, SyntheticAudio, DEFAULT_SEED};
use goom_fx::runner::{build_effects, run, SceneDirector};
use goom_fx::sound::{SoundEnvelope, SoundSample, AUDIO_SAMPLE_LEN};
use goom_fx::visual::VisualFx;
use std::path::PathBuf;

fn parse(args: &[&str]) -> Config {
    let mut argv = vec!["goom_fx"];
    argv.extend_from_slice(args);
    Config::try_parse_from(argv).expect("config should parse")
}

#[test]
fn defaults_are_sane() {
    let cfg = parse(&[]);
    assert_eq!((cfg.width, cfg.height), (640, 480));
    assert_eq!(cfg.seed, DEFAULT_SEED);
    assert_eq!(cfg.effects, vec![EffectKind::Ifs, EffectKind::Tentacles]);
    assert_eq!(cfg.audio, SyntheticAudio::Pulse);
    assert_eq!(cfg.tentacle_grids, 6);
    assert!(cfg.frames.is_none());
    assert!(cfg.validate().is_ok());
}

#[test]
fn effect_list_accepts_commas_and_aliases() {
    let cfg = parse(&["--effects", "tentacle,fractal"]);
    assert_eq!(cfg.effects, vec![EffectKind::Tentacles, EffectKind::Ifs]);
    let cfg = parse(&["--effects", "ifs"]);
    assert_eq!(cfg.effects, vec![EffectKind::Ifs]);
}

#[test]
fn paths_and_counts_parse() {
    let cfg = parse(&[
        "--width",
        "64",
        "--height",
        "48",
        "--frames",
        "12",
        "--audio",
        "sweep",
        "--dump-frames",
        "out/frames",
        "--dump-every",
        "4",
        "--save-state",
        "s.state",
        "--tentacle-grids",
        "2",
    ]);
    assert_eq!(cfg.frames, Some(12));
    assert_eq!(cfg.audio, SyntheticAudio::Sweep);
    assert_eq!(cfg.dump_frames, Some(PathBuf::from("out/frames")));
    assert_eq!(cfg.dump_every, 4);
    assert_eq!(cfg.save_state, Some(PathBuf::from("s.state")));
    assert_eq!(cfg.tentacle_grids, 2);
}

#[test]
fn unknown_values_are_rejected() {
    assert!(Config::try_parse_from(["goom_fx", "--effects", "plasma"]).is_err());
    assert!(Config::try_parse_from(["goom_fx", "--audio", "noise"]).is_err());
    assert!(Config::try_parse_from(["goom_fx", "--width", "-3"]).is_err());
}

#[test]
fn validate_rejects_zero_sizes() {
    let cfg = parse(&["--width", "0"]);
    assert_eq!(
        cfg.validate(),
        Err(ConfigError::ZeroSize {
            width: 0,
            height: 480
        })
    );
    assert_eq!(parse(&["--fps", "0"]).validate(), Err(ConfigError::ZeroFps));
    assert_eq!(
        parse(&["--dump-every", "0"]).validate(),
        Err(ConfigError::ZeroDumpEvery)
    );
    assert_eq!(
        parse(&["--tentacle-grids", "0"]).validate(),
        Err(ConfigError::NoTentacleGrids)
    );
    assert!(parse(&["--tentacle-grids", "0", "--effects", "ifs"]).validate().is_ok());
}

#[test]
fn build_effects_follows_the_list() {
    let fx = build_effects(&[EffectKind::Tentacles, EffectKind::Ifs], 2);
    let names: Vec<_> = fx.iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["tentacles", "ifs"]);
}

#[test]
fn director_toggles_fractal_on_big_gooms() {
    let mut env = SoundEnvelope::new();
    let mut director = SceneDirector::new();
    let loud = SoundSample::new(vec![vec![30_000; AUDIO_SAMPLE_LEN]; 2]).expect("block");
    let quiet = SoundSample::new(vec![vec![300; AUDIO_SAMPLE_LEN]; 2]).expect("block");
    let mut toggles = 0;
    let mut last = director.ifs_visible();
    for step in 0..4_000 {
        env.process_sample(if step % 25 < 2 { &loud } else { &quiet });
        director.observe(&env);
        if director.ifs_visible() != last {
            assert!(env.is_big_goom());
            toggles += 1;
            last = director.ifs_visible();
        }
    }
    assert_eq!(toggles > 0, env.time_since_last_big_goom() < 4_000);
}

#[test]
fn short_headless_run_renders_frames() {
    let dir = std::env::temp_dir().join(format!("goom_fx_run_{}", std::process::id()));
    let cfg = parse(&[
        "--width",
        "80",
        "--height",
        "60",
        "--frames",
        "20",
        "--tentacle-grids",
        "2",
        "--dump-every",
        "10",
        "--dump-frames",
        dir.to_str().expect("utf-8 temp dir"),
    ]);
    let summary = run(cfg).expect("run");
    assert_eq!(summary.frames, 20);
    assert!(summary.lit_frames > 0);
    assert!(dir.join("frame_000000.ppm").exists());
    assert!(dir.join("frame_000010.ppm").exists());
    assert!(!dir.join("frame_000005.ppm").exists());
    let _ = std::fs::remove_dir_all(&dir);
}
