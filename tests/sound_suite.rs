use goom_fx::sound::{SoundEnvelope, SoundError, SoundSample, AUDIO_SAMPLE_LEN};

fn block(value: i16) -> SoundSample {
    SoundSample::new(vec![vec![value; AUDIO_SAMPLE_LEN]; 2]).expect("valid block")
}

fn pulse(step: usize) -> SoundSample {
    let v = if step % 20 < 2 { 30_000 } else { 400 };
    block(v)
}

fn assert_in_unit_range(env: &SoundEnvelope) {
    for (label, v) in [
        ("volume", env.volume()),
        ("acceleration", env.acceleration()),
        ("speed", env.speed()),
        ("goom_limit", env.goom_limit()),
    ] {
        assert!((0.0..=1.0).contains(&v), "{label} out of range: {v}");
    }
}

#[test]
fn envelope_fields_stay_clamped() {
    let mut env = SoundEnvelope::new();
    for step in 0..2_000 {
        env.process_sample(&pulse(step));
        assert_in_unit_range(&env);
    }
    for _ in 0..500 {
        env.process_sample(&block(i16::MAX));
        assert_in_unit_range(&env);
    }
}

#[test]
fn silence_never_gooms() {
    let mut env = SoundEnvelope::new();
    let silent = SoundSample::silence(2).expect("silence");
    for _ in 0..1_000 {
        env.process_sample(&silent);
        assert!(!env.is_goom());
        assert!(!env.is_big_goom());
        assert_eq!(env.volume(), 0.0);
    }
    assert_eq!(env.time_since_last_goom(), 1_000);
}

#[test]
fn full_scale_block_reads_full_volume() {
    let mut env = SoundEnvelope::new();
    env.process_sample(&block(i16::MAX));
    assert_eq!(env.volume(), 1.0);
    assert_eq!(env.all_times_max(), 32_767);
    assert_eq!(env.all_times_positive_max(), 32_767);
}

#[test]
fn louder_right_channel_does_not_cap_volume() {
    let stereo = SoundSample::new(vec![
        vec![10_000; AUDIO_SAMPLE_LEN],
        vec![20_000; AUDIO_SAMPLE_LEN],
    ])
    .expect("stereo block");
    let mut env = SoundEnvelope::new();
    for _ in 0..3 {
        env.process_sample(&stereo);
    }
    assert_eq!(env.volume(), 1.0);
    assert_eq!(env.all_times_positive_max(), 10_000);
    assert_eq!(env.all_times_max(), 10_000);
}

#[test]
fn negative_half_does_not_drive_volume() {
    let mut env = SoundEnvelope::new();
    env.process_sample(&block(-20_000));
    assert_eq!(env.volume(), 0.0);
    assert_eq!(env.all_times_min(), -20_000);
}

#[test]
fn volume_is_relative_to_loudest_block_so_far() {
    let mut env = SoundEnvelope::new();
    env.process_sample(&block(20_000));
    env.process_sample(&block(10_000));
    assert!((env.volume() - 0.5).abs() < 1e-6);
}

#[test]
fn pulses_after_silence_trigger_gooms() {
    let mut env = SoundEnvelope::new();
    let silent = SoundSample::silence(1).expect("silence");
    for _ in 0..64 {
        env.process_sample(&silent);
    }
    let mut gooms = 0;
    for step in 0..400 {
        env.process_sample(&pulse(step));
        if env.is_goom() {
            gooms += 1;
            assert_eq!(env.time_since_last_goom(), 0);
            assert!(env.goom_power() >= 0.0);
        }
    }
    assert!(gooms > 0, "no goom after silence then pulses");
}

#[test]
fn big_gooms_are_debounced() {
    let mut env = SoundEnvelope::new();
    let mut last_big: Option<usize> = None;
    for step in 0..3_000 {
        env.process_sample(&pulse(step));
        if env.is_big_goom() {
            if let Some(prev) = last_big {
                assert!(step - prev > 100, "big gooms {prev} and {step} too close");
            }
            last_big = Some(step);
        }
    }
}

#[test]
fn sample_rejects_three_channels() {
    let err = SoundSample::new(vec![vec![0; AUDIO_SAMPLE_LEN]; 3]).expect_err("3 channels");
    assert_eq!(err, SoundError::BadChannelCount(3));
    let err = SoundSample::from_interleaved(&[0; AUDIO_SAMPLE_LEN * 3], 3).expect_err("3 ch");
    assert_eq!(err, SoundError::BadChannelCount(3));
}

#[test]
fn sample_rejects_short_blocks() {
    let err = SoundSample::new(vec![vec![0; 100]]).expect_err("short block");
    assert_eq!(
        err,
        SoundError::BadBlockLength {
            expected: AUDIO_SAMPLE_LEN,
            got: 100
        }
    );
    assert!(SoundSample::silence(0).is_err());
}
