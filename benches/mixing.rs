// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use softmix::device::mock;
use softmix::{Clip, Mixer, MixerConfig, SoundSource};
use std::sync::Arc;

const FRAGMENT_FRAMES: usize = 1024;

fn generate_test_clip(duration_seconds: f32, sample_rate: u32, frequency: f32) -> Arc<Clip> {
    let num_samples = (duration_seconds * sample_rate as f32) as usize;
    let mut samples = Vec::with_capacity(num_samples);

    for i in 0..num_samples {
        let t = i as f32 / sample_rate as f32;
        let sample = 0.3 * (2.0 * std::f32::consts::PI * frequency * t).sin();
        samples.push((sample * 32767.0) as i16);
    }

    let mut clip = Clip::from_pcm16(&samples, sample_rate, false);
    clip.set_looped(true);
    Arc::new(clip)
}

fn spawn_sources(mixer: &Mixer, count: usize, clip: &Arc<Clip>) -> Vec<SoundSource> {
    let mut sources = Vec::with_capacity(count);
    for i in 0..count {
        let source = mixer.create_source();
        // Spread the sources across the stereo field.
        let panning = if count > 1 {
            (i as f32 / (count - 1) as f32) * 2.0 - 1.0
        } else {
            0.0
        };
        source.set_panning(panning);
        assert!(source.play(clip.clone()));
        sources.push(source);
    }
    sources
}

fn benchmark_source_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("source_counts");

    let clip = generate_test_clip(1.0, 44100, 440.0);

    for count in [1, 4, 16, 64] {
        let mixer = Mixer::new();
        let sources = spawn_sources(&mixer, count, &clip);
        let mut out = vec![0i16; FRAGMENT_FRAMES * 2];

        group.bench_function(BenchmarkId::new("sources", count), |b| {
            b.iter(|| {
                mixer.render(black_box(&mut out));
            })
        });

        drop(sources);
    }

    group.finish();
}

fn benchmark_layouts(c: &mut Criterion) {
    let mut group = c.benchmark_group("layouts");

    // Test mixing into each supported speaker layout.
    let test_cases = vec![
        ("mono", 1),
        ("stereo", 2),
        ("quad", 4),
        ("5.1", 6),
    ];

    let clip = generate_test_clip(1.0, 44100, 440.0);

    for (layout, channels) in test_cases {
        let config: MixerConfig =
            serde_yml::from_str(&format!("layout: \"{}\"\n", layout)).unwrap();
        let mixer = Mixer::new();
        let device = mock::Device::get("mock-bench");
        mixer
            .configure_with_device(&config, Arc::new(device))
            .unwrap();

        let sources = spawn_sources(&mixer, 16, &clip);
        let mut out = vec![0i16; FRAGMENT_FRAMES * channels];

        group.bench_function(layout, |b| {
            b.iter(|| {
                mixer.render(black_box(&mut out));
            })
        });

        drop(sources);
    }

    group.finish();
}

fn benchmark_interpolation(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpolation");

    // A 22.05kHz clip into a 44.1kHz mix forces fractional stepping.
    let clip = generate_test_clip(1.0, 22050, 440.0);

    for (name, interpolation) in [("linear", true), ("nearest", false)] {
        let config: MixerConfig =
            serde_yml::from_str(&format!("interpolation: {}\n", interpolation)).unwrap();
        let mixer = Mixer::new();
        let device = mock::Device::get("mock-bench");
        mixer
            .configure_with_device(&config, Arc::new(device))
            .unwrap();

        let sources = spawn_sources(&mixer, 16, &clip);
        let mut out = vec![0i16; FRAGMENT_FRAMES * 2];

        group.bench_function(name, |b| {
            b.iter(|| {
                mixer.render(black_box(&mut out));
            })
        });

        drop(sources);
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_source_counts,
    benchmark_layouts,
    benchmark_interpolation
);
criterion_main!(benches);
