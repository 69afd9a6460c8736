use std::time::{Duration, Instant};

use anyhow::Result;
use goom_fx::config::{EffectKind, SyntheticAudio, DEFAULT_SEED};
use goom_fx::runner::{build_effects, frame_stats, AudioFeed};
use goom_fx::visual::tentacles::DEFAULT_NUM_GRIDS;
use goom_fx::visual::FxPipeline;

struct Args {
    frames: usize,
    w: usize,
    h: usize,
    grids: usize,
    seed: u64,
    ci_smoke: bool,
    quick: bool,
    max_ms: f64,
}

fn parse_args() -> Args {
    let mut args = Args {
        frames: 240,
        w: 320,
        h: 180,
        grids: DEFAULT_NUM_GRIDS,
        seed: DEFAULT_SEED,
        ci_smoke: false,
        quick: false,
        max_ms: 20.0,
    };

    let argv = std::env::args().skip(1).collect::<Vec<_>>();
    let mut i = 0usize;
    while i < argv.len() {
        let k = argv[i].as_str();
        let v = argv.get(i + 1).map(|s| s.as_str());
        match (k, v) {
            ("--frames", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.frames = n.max(1);
                }
                i += 2;
            }
            ("--width", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.w = n.max(1);
                }
                i += 2;
            }
            ("--height", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.h = n.max(1);
                }
                i += 2;
            }
            ("--tentacle-grids", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.grids = n.max(1);
                }
                i += 2;
            }
            ("--seed", Some(x)) => {
                if let Ok(n) = x.parse::<u64>() {
                    args.seed = n;
                }
                i += 2;
            }
            ("--ci-smoke", _) => {
                args.ci_smoke = true;
                i += 1;
            }
            ("--quick", _) => {
                args.quick = true;
                i += 1;
            }
            ("--max-ms", Some(x)) => {
                if let Ok(v) = x.parse::<f64>() {
                    args.max_ms = v.max(0.1);
                }
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    if args.quick {
        args.frames = args.frames.min(60);
    }

    args
}

struct BenchResult {
    label: String,
    ms: f64,
    lit: usize,
    elapsed: Duration,
}

fn bench_stack(args: &Args, label: &str, kinds: &[EffectKind]) -> Result<BenchResult> {
    let effects = build_effects(kinds, args.grids);
    let mut pipeline = FxPipeline::new(args.w, args.h, args.seed, effects)?;
    let feed = AudioFeed::Synthetic {
        kind: SyntheticAudio::Pulse,
        fps: 60,
    };

    let start = Instant::now();
    let mut lit = 0usize;
    for f in 0..args.frames {
        let block = feed.block(f as u64)?;
        if frame_stats(pipeline.process_frame(&block)).lit > 0 {
            lit += 1;
        }
    }
    let elapsed = start.elapsed();
    Ok(BenchResult {
        label: label.to_string(),
        ms: elapsed.as_secs_f64() * 1000.0 / args.frames as f64,
        lit,
        elapsed,
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = parse_args();

    let stacks: [(&str, &[EffectKind]); 3] = [
        ("ifs", &[EffectKind::Ifs]),
        ("tentacles", &[EffectKind::Tentacles]),
        ("ifs+tentacles", &[EffectKind::Ifs, EffectKind::Tentacles]),
    ];
    println!(
        "Effect benchmark: stacks={} frames/stack={} size={}x{} grids={} seed={:#x}",
        stacks.len(),
        args.frames,
        args.w,
        args.h,
        args.grids,
        args.seed
    );

    let mut total_time = Duration::ZERO;
    let mut total_frames = 0usize;
    let mut black = Vec::new();
    let mut slow = Vec::new();
    for (idx, (label, kinds)) in stacks.iter().enumerate() {
        let r = bench_stack(&args, label, kinds)?;
        println!(
            "{:>2}. {:<16} {:>8.3} ms/frame  lit={:>3}/{}",
            idx, r.label, r.ms, r.lit, args.frames
        );
        total_time += r.elapsed;
        total_frames += args.frames;
        if r.lit == 0 {
            black.push(r.label.clone());
        }
        if args.ci_smoke && r.ms > args.max_ms {
            slow.push((r.label, r.ms));
        }
    }

    let avg_ms = total_time.as_secs_f64() * 1000.0 / total_frames.max(1) as f64;
    let fps = if avg_ms > 0.0 { 1000.0 / avg_ms } else { 0.0 };
    println!("Summary: {:>8.3} ms/frame avg  {:>7.2} FPS", avg_ms, fps);

    if args.ci_smoke {
        if !black.is_empty() || !slow.is_empty() {
            eprintln!("CI smoke: FAIL");
            if !black.is_empty() {
                eprintln!("  black stacks: {}", black.join(", "));
            }
            for (name, ms) in slow {
                eprintln!("  slow stack: {} ({:.3} ms/frame > {:.3})", name, ms, args.max_ms);
            }
            anyhow::bail!("ci smoke failed");
        }
        println!("CI smoke: PASS (max_ms={:.3})", args.max_ms);
    }

    Ok(())
}
