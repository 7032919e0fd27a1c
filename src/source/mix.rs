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

//! Fixed point mixing routines.
//!
//! Sources advance through their PCM data with a 16.16 fixed point step
//! derived from the ratio of the source frequency to the output rate. Each
//! routine adds volume scaled samples into an `i32` accumulation buffer and
//! reports whether the source ran off the end of its data.

/// Per output sample position increment in source frames.
///
/// The whole part advances the frame index directly, the fractional part
/// accumulates in units of 1/65536th of a frame.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Step {
    pub whole: usize,
    pub fract: u32,
}

impl Step {
    /// Computes the step for playing a source at the given frequency into an
    /// output running at the given mix rate.
    pub fn new(effective_frequency: f32, mix_rate: u32) -> Step {
        if mix_rate == 0 {
            return Step { whole: 0, fract: 0 };
        }

        let add = (effective_frequency.max(0.0) as f64) / f64::from(mix_rate);
        Step {
            whole: add as usize,
            fract: (add.fract() * 65536.0) as u32,
        }
    }
}

/// Playback position within PCM data, in frames plus a fractional part in
/// the range [0, 65535].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MixCursor {
    pub frame: usize,
    pub fract: u32,
}

/// What happens when the cursor steps onto or past the end of the data.
pub(crate) trait Boundary: Copy {
    /// Brings the frame index back into the playable region. Returns false
    /// when the source is exhausted instead.
    fn rein(&self, frame: &mut usize) -> bool;

    /// The frame interpolation reads ahead to from the given frame. The
    /// sample after the last frame is the loop re-entry for looped data and
    /// silence for one shot data.
    fn next_frame(&self, frame: usize) -> Option<usize>;
}

/// Looping region. Stepping past the end wraps back by the loop length as
/// many times as needed. Callers must ensure `repeat < end`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Wrap {
    pub end: usize,
    pub repeat: usize,
}

impl Boundary for Wrap {
    fn rein(&self, frame: &mut usize) -> bool {
        while *frame >= self.end {
            *frame -= self.end - self.repeat;
        }
        true
    }

    fn next_frame(&self, frame: usize) -> Option<usize> {
        if frame + 1 >= self.end {
            Some(self.repeat)
        } else {
            Some(frame + 1)
        }
    }
}

/// Play once and stop at the end.
#[derive(Clone, Copy, Debug)]
pub(crate) struct OneShot {
    pub end: usize,
}

impl Boundary for OneShot {
    fn rein(&self, frame: &mut usize) -> bool {
        *frame < self.end
    }

    fn next_frame(&self, frame: usize) -> Option<usize> {
        if frame + 1 >= self.end {
            None
        } else {
            Some(frame + 1)
        }
    }
}

/// Raw sample access and volume application for a PCM encoding.
pub(crate) trait Pcm {
    /// Reads the sample at the given single channel index.
    fn at(data: &[u8], index: usize) -> i32;

    /// Applies a volume scaled by 256. For 8 bit data this doubles as the
    /// conversion up to 16 bit range.
    fn apply(sample: i32, volume: i32) -> i32;
}

/// Signed 16 bit little endian samples.
pub(crate) struct S16;

impl Pcm for S16 {
    #[inline]
    fn at(data: &[u8], index: usize) -> i32 {
        i32::from(i16::from_le_bytes([data[index * 2], data[index * 2 + 1]]))
    }

    #[inline]
    fn apply(sample: i32, volume: i32) -> i32 {
        (sample * volume) >> 8
    }
}

/// Signed 8 bit samples.
pub(crate) struct S8;

impl Pcm for S8 {
    #[inline]
    fn at(data: &[u8], index: usize) -> i32 {
        i32::from(data[index] as i8)
    }

    #[inline]
    fn apply(sample: i32, volume: i32) -> i32 {
        sample * volume
    }
}

/// Moves the cursor forward by one output sample. Returns false when a one
/// shot source crossed its end.
#[inline]
fn advance<B: Boundary>(cursor: &mut MixCursor, step: Step, boundary: &B) -> bool {
    cursor.frame += step.whole;
    cursor.fract += step.fract;
    if cursor.fract > 65535 {
        cursor.fract &= 65535;
        cursor.frame += 1;
    }
    boundary.rein(&mut cursor.frame)
}

/// Linear interpolation between two neighboring samples at a 16 bit
/// fractional position.
#[inline]
fn lerp(s0: i32, s1: i32, fract: u32) -> i32 {
    (i64::from(s0) + (i64::from(s1) - i64::from(s0)) * i64::from(fract) / 65536) as i32
}

/// Advances the cursor as if mixing the given number of output samples at
/// zero volume. The resulting cursor matches a sample by sample pass.
pub(crate) fn advance_silent<B: Boundary>(
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    samples: usize,
) -> bool {
    let total_fract = u64::from(cursor.fract) + samples as u64 * u64::from(step.fract);
    cursor.frame += samples * step.whole + (total_fract >> 16) as usize;
    cursor.fract = (total_fract & 65535) as u32;
    boundary.rein(&mut cursor.frame)
}

pub(crate) fn mix_mono_to_mono<P: Pcm, B: Boundary>(
    data: &[u8],
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    vol: i32,
    dest: &mut [i32],
) -> bool {
    for out in dest.iter_mut() {
        *out += P::apply(P::at(data, cursor.frame), vol);
        if !advance(cursor, step, &boundary) {
            return false;
        }
    }
    true
}

pub(crate) fn mix_mono_to_mono_ip<P: Pcm, B: Boundary>(
    data: &[u8],
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    vol: i32,
    dest: &mut [i32],
) -> bool {
    for out in dest.iter_mut() {
        let s0 = P::at(data, cursor.frame);
        let s1 = boundary
            .next_frame(cursor.frame)
            .map_or(0, |next| P::at(data, next));
        *out += P::apply(lerp(s0, s1, cursor.fract), vol);
        if !advance(cursor, step, &boundary) {
            return false;
        }
    }
    true
}

pub(crate) fn mix_mono_to_stereo<P: Pcm, B: Boundary>(
    data: &[u8],
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    left_vol: i32,
    right_vol: i32,
    dest: &mut [i32],
) -> bool {
    for out in dest.chunks_exact_mut(2) {
        let s = P::at(data, cursor.frame);
        out[0] += P::apply(s, left_vol);
        out[1] += P::apply(s, right_vol);
        if !advance(cursor, step, &boundary) {
            return false;
        }
    }
    true
}

pub(crate) fn mix_mono_to_stereo_ip<P: Pcm, B: Boundary>(
    data: &[u8],
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    left_vol: i32,
    right_vol: i32,
    dest: &mut [i32],
) -> bool {
    for out in dest.chunks_exact_mut(2) {
        let s0 = P::at(data, cursor.frame);
        let s1 = boundary
            .next_frame(cursor.frame)
            .map_or(0, |next| P::at(data, next));
        let s = lerp(s0, s1, cursor.fract);
        out[0] += P::apply(s, left_vol);
        out[1] += P::apply(s, right_vol);
        if !advance(cursor, step, &boundary) {
            return false;
        }
    }
    true
}

pub(crate) fn mix_mono_to_multi<P: Pcm, B: Boundary, const CH: usize>(
    data: &[u8],
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    vols: [i32; CH],
    dest: &mut [i32],
) -> bool {
    for out in dest.chunks_exact_mut(CH) {
        let s = P::at(data, cursor.frame);
        for (o, vol) in out.iter_mut().zip(vols) {
            *o += P::apply(s, vol);
        }
        if !advance(cursor, step, &boundary) {
            return false;
        }
    }
    true
}

pub(crate) fn mix_mono_to_multi_ip<P: Pcm, B: Boundary, const CH: usize>(
    data: &[u8],
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    vols: [i32; CH],
    dest: &mut [i32],
) -> bool {
    for out in dest.chunks_exact_mut(CH) {
        let s0 = P::at(data, cursor.frame);
        let s1 = boundary
            .next_frame(cursor.frame)
            .map_or(0, |next| P::at(data, next));
        let s = lerp(s0, s1, cursor.fract);
        for (o, vol) in out.iter_mut().zip(vols) {
            *o += P::apply(s, vol);
        }
        if !advance(cursor, step, &boundary) {
            return false;
        }
    }
    true
}

pub(crate) fn mix_stereo_to_mono<P: Pcm, B: Boundary>(
    data: &[u8],
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    vol: i32,
    dest: &mut [i32],
) -> bool {
    for out in dest.iter_mut() {
        let left = P::at(data, cursor.frame * 2);
        let right = P::at(data, cursor.frame * 2 + 1);
        *out += P::apply((left + right) / 2, vol);
        if !advance(cursor, step, &boundary) {
            return false;
        }
    }
    true
}

pub(crate) fn mix_stereo_to_mono_ip<P: Pcm, B: Boundary>(
    data: &[u8],
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    vol: i32,
    dest: &mut [i32],
) -> bool {
    for out in dest.iter_mut() {
        let (left, right) = stereo_frame_ip::<P, B>(data, cursor, &boundary);
        *out += P::apply((left + right) / 2, vol);
        if !advance(cursor, step, &boundary) {
            return false;
        }
    }
    true
}

pub(crate) fn mix_stereo_to_stereo<P: Pcm, B: Boundary>(
    data: &[u8],
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    vol: i32,
    dest: &mut [i32],
) -> bool {
    for out in dest.chunks_exact_mut(2) {
        out[0] += P::apply(P::at(data, cursor.frame * 2), vol);
        out[1] += P::apply(P::at(data, cursor.frame * 2 + 1), vol);
        if !advance(cursor, step, &boundary) {
            return false;
        }
    }
    true
}

pub(crate) fn mix_stereo_to_stereo_ip<P: Pcm, B: Boundary>(
    data: &[u8],
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    vol: i32,
    dest: &mut [i32],
) -> bool {
    for out in dest.chunks_exact_mut(2) {
        let (left, right) = stereo_frame_ip::<P, B>(data, cursor, &boundary);
        out[0] += P::apply(left, vol);
        out[1] += P::apply(right, vol);
        if !advance(cursor, step, &boundary) {
            return false;
        }
    }
    true
}

pub(crate) fn mix_stereo_to_multi<P: Pcm, B: Boundary, const CH: usize>(
    data: &[u8],
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    vols: [i32; CH],
    dest: &mut [i32],
) -> bool {
    for out in dest.chunks_exact_mut(CH) {
        let left = P::at(data, cursor.frame * 2);
        let right = P::at(data, cursor.frame * 2 + 1);
        for (ch, (o, vol)) in out.iter_mut().zip(vols).enumerate() {
            *o += P::apply(pick_stereo_channel::<CH>(ch, left, right), vol);
        }
        if !advance(cursor, step, &boundary) {
            return false;
        }
    }
    true
}

pub(crate) fn mix_stereo_to_multi_ip<P: Pcm, B: Boundary, const CH: usize>(
    data: &[u8],
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    vols: [i32; CH],
    dest: &mut [i32],
) -> bool {
    for out in dest.chunks_exact_mut(CH) {
        let (left, right) = stereo_frame_ip::<P, B>(data, cursor, &boundary);
        for (ch, (o, vol)) in out.iter_mut().zip(vols).enumerate() {
            *o += P::apply(pick_stereo_channel::<CH>(ch, left, right), vol);
        }
        if !advance(cursor, step, &boundary) {
            return false;
        }
    }
    true
}

/// Interpolates the left and right samples of a stereo frame independently.
#[inline]
fn stereo_frame_ip<P: Pcm, B: Boundary>(
    data: &[u8],
    cursor: &MixCursor,
    boundary: &B,
) -> (i32, i32) {
    let left = P::at(data, cursor.frame * 2);
    let right = P::at(data, cursor.frame * 2 + 1);
    match boundary.next_frame(cursor.frame) {
        Some(next) => (
            lerp(left, P::at(data, next * 2), cursor.fract),
            lerp(right, P::at(data, next * 2 + 1), cursor.fract),
        ),
        None => (
            lerp(left, 0, cursor.fract),
            lerp(right, 0, cursor.fract),
        ),
    }
}

/// Which side of a stereo frame feeds a given surround channel. The front
/// and rear pairs alternate left and right, the center and LFE channels of
/// a 5.1 layout take the mid signal.
#[inline]
fn pick_stereo_channel<const CH: usize>(ch: usize, left: i32, right: i32) -> i32 {
    if CH == 6 && (ch == 2 || ch == 3) {
        (left + right) / 2
    } else if ch % 2 == 0 {
        left
    } else {
        right
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_step_from_frequency_ratio() {
        let unity = Step::new(44100.0, 44100);
        assert_eq!(unity.whole, 1);
        assert_eq!(unity.fract, 0);

        let half = Step::new(22050.0, 44100);
        assert_eq!(half.whole, 0);
        assert_eq!(half.fract, 32768);

        let zero_rate = Step::new(44100.0, 0);
        assert_eq!(zero_rate.whole, 0);
        assert_eq!(zero_rate.fract, 0);
    }

    #[test]
    fn test_looped_mono_wraps_and_leaves_cursor_inside() {
        let data = pcm16(&[10, 20, 30, 40]);
        let mut cursor = MixCursor { frame: 0, fract: 0 };
        let mut dest = vec![0i32; 6];

        let more = mix_mono_to_mono::<S16, _>(
            &data,
            &mut cursor,
            Step { whole: 1, fract: 0 },
            Wrap { end: 4, repeat: 0 },
            256,
            &mut dest,
        );

        assert!(more);
        assert_eq!(dest, vec![10, 20, 30, 40, 10, 20]);
        assert_eq!(cursor.frame, 2);
        assert_eq!(cursor.fract, 0);
    }

    #[test]
    fn test_one_shot_mono_stops_at_end() {
        let data = pcm16(&[10, 20, 30, 40]);
        let mut cursor = MixCursor { frame: 0, fract: 0 };
        let mut dest = vec![0i32; 6];

        let more = mix_mono_to_mono::<S16, _>(
            &data,
            &mut cursor,
            Step { whole: 1, fract: 0 },
            OneShot { end: 4 },
            256,
            &mut dest,
        );

        assert!(!more);
        assert_eq!(dest, vec![10, 20, 30, 40, 0, 0]);
    }

    #[test]
    fn test_volume_scales_by_256() {
        let data = pcm16(&[1000, -1000]);
        let mut cursor = MixCursor { frame: 0, fract: 0 };
        let mut dest = vec![0i32; 2];

        mix_mono_to_mono::<S16, _>(
            &data,
            &mut cursor,
            Step { whole: 1, fract: 0 },
            OneShot { end: 2 },
            128,
            &mut dest,
        );

        assert_eq!(dest, vec![500, -500]);
    }

    #[test]
    fn test_eight_bit_samples_scale_into_sixteen_bit_range() {
        let data: Vec<u8> = vec![100i8 as u8, (-50i8) as u8];
        let mut cursor = MixCursor { frame: 0, fract: 0 };
        let mut dest = vec![0i32; 2];

        mix_mono_to_mono::<S8, _>(
            &data,
            &mut cursor,
            Step { whole: 1, fract: 0 },
            OneShot { end: 2 },
            256,
            &mut dest,
        );

        assert_eq!(dest, vec![25600, -12800]);
    }

    #[test]
    fn test_mixing_accumulates_into_existing_contents() {
        let data = pcm16(&[10, 10]);
        let mut cursor = MixCursor { frame: 0, fract: 0 };
        let mut dest = vec![5i32; 2];

        mix_mono_to_mono::<S16, _>(
            &data,
            &mut cursor,
            Step { whole: 1, fract: 0 },
            OneShot { end: 2 },
            256,
            &mut dest,
        );

        assert_eq!(dest, vec![15, 15]);
    }

    #[test]
    fn test_split_mix_matches_single_mix() {
        let data = pcm16(&[3, 14, 15, 92, 65, 35]);
        let step = Step {
            whole: 0,
            fract: 48000,
        };
        let boundary = Wrap { end: 6, repeat: 1 };

        let mut whole_cursor = MixCursor { frame: 0, fract: 0 };
        let mut whole_dest = vec![0i32; 16];
        mix_mono_to_mono::<S16, _>(
            &data,
            &mut whole_cursor,
            step,
            boundary,
            256,
            &mut whole_dest,
        );

        let mut split_cursor = MixCursor { frame: 0, fract: 0 };
        let mut split_dest = vec![0i32; 16];
        for chunk in split_dest.chunks_mut(5) {
            mix_mono_to_mono::<S16, _>(&data, &mut split_cursor, step, boundary, 256, chunk);
        }

        assert_eq!(whole_dest, split_dest);
        assert_eq!(whole_cursor, split_cursor);
    }

    #[test]
    fn test_silent_advance_matches_mixed_advance() {
        let data = pcm16(&[0; 7]);
        let step = Step {
            whole: 1,
            fract: 21000,
        };
        let boundary = Wrap { end: 7, repeat: 2 };

        let mut mixed = MixCursor {
            frame: 3,
            fract: 1234,
        };
        let mut dest = vec![0i32; 40];
        mix_mono_to_mono::<S16, _>(&data, &mut mixed, step, boundary, 256, &mut dest);

        let mut silent = MixCursor {
            frame: 3,
            fract: 1234,
        };
        advance_silent(&mut silent, step, boundary, 40);

        assert_eq!(mixed, silent);
    }

    #[test]
    fn test_silent_advance_exhausts_one_shot() {
        let mut cursor = MixCursor { frame: 0, fract: 0 };
        let more = advance_silent(&mut cursor, Step { whole: 1, fract: 0 }, OneShot { end: 4 }, 10);
        assert!(!more);
    }

    #[test]
    fn test_interpolation_midpoint() {
        let data = pcm16(&[0, 100, 200]);
        let mut cursor = MixCursor { frame: 0, fract: 0 };
        let mut dest = vec![0i32; 4];

        // Half speed playback lands halfway between neighbors every other
        // output sample.
        mix_mono_to_mono_ip::<S16, _>(
            &data,
            &mut cursor,
            Step {
                whole: 0,
                fract: 32768,
            },
            OneShot { end: 3 },
            256,
            &mut dest,
        );

        assert_eq!(dest, vec![0, 50, 100, 150]);
    }

    #[test]
    fn test_interpolation_reads_loop_reentry_past_end() {
        let data = pcm16(&[400, 1000]);
        let cursor = MixCursor {
            frame: 1,
            fract: 32768,
        };

        let mut c = cursor;
        let mut dest = vec![0i32; 1];
        mix_mono_to_mono_ip::<S16, _>(
            &data,
            &mut c,
            Step { whole: 1, fract: 0 },
            Wrap { end: 2, repeat: 0 },
            256,
            &mut dest,
        );
        // Halfway from 1000 toward the loop re-entry sample 400.
        assert_eq!(dest[0], 700);

        let mut c = cursor;
        let mut dest = vec![0i32; 1];
        mix_mono_to_mono_ip::<S16, _>(
            &data,
            &mut c,
            Step { whole: 1, fract: 0 },
            OneShot { end: 2 },
            256,
            &mut dest,
        );
        // Halfway from 1000 toward silence.
        assert_eq!(dest[0], 500);
    }

    #[test]
    fn test_mono_to_stereo_uses_separate_volumes() {
        let data = pcm16(&[100]);
        let mut cursor = MixCursor { frame: 0, fract: 0 };
        let mut dest = vec![0i32; 2];

        mix_mono_to_stereo::<S16, _>(
            &data,
            &mut cursor,
            Step { whole: 1, fract: 0 },
            OneShot { end: 1 },
            256,
            64,
            &mut dest,
        );

        assert_eq!(dest, vec![100, 25]);
    }

    #[test]
    fn test_stereo_to_mono_averages_channels() {
        let data = pcm16(&[100, 200, -100, 100]);
        let mut cursor = MixCursor { frame: 0, fract: 0 };
        let mut dest = vec![0i32; 2];

        mix_stereo_to_mono::<S16, _>(
            &data,
            &mut cursor,
            Step { whole: 1, fract: 0 },
            OneShot { end: 2 },
            256,
            &mut dest,
        );

        assert_eq!(dest, vec![150, 0]);
    }

    #[test]
    fn test_stereo_channels_interpolate_independently() {
        let data = pcm16(&[0, 1000, 100, 2000]);
        let mut cursor = MixCursor {
            frame: 0,
            fract: 32768,
        };
        let mut dest = vec![0i32; 2];

        mix_stereo_to_stereo_ip::<S16, _>(
            &data,
            &mut cursor,
            Step { whole: 1, fract: 0 },
            OneShot { end: 2 },
            256,
            &mut dest,
        );

        assert_eq!(dest, vec![50, 1500]);
    }

    #[test]
    fn test_mono_to_quad_applies_corner_volumes() {
        let data = pcm16(&[100]);
        let mut cursor = MixCursor { frame: 0, fract: 0 };
        let mut dest = vec![0i32; 4];

        mix_mono_to_multi::<S16, _, 4>(
            &data,
            &mut cursor,
            Step { whole: 1, fract: 0 },
            OneShot { end: 1 },
            [256, 128, 64, 0],
            &mut dest,
        );

        assert_eq!(dest, vec![100, 50, 25, 0]);
    }

    #[test]
    fn test_stereo_to_five_one_routes_mid_to_center() {
        let data = pcm16(&[100, 200]);
        let mut cursor = MixCursor { frame: 0, fract: 0 };
        let mut dest = vec![0i32; 6];

        mix_stereo_to_multi::<S16, _, 6>(
            &data,
            &mut cursor,
            Step { whole: 1, fract: 0 },
            OneShot { end: 1 },
            [256, 256, 256, 256, 256, 256],
            &mut dest,
        );

        // Front left, front right, center and LFE from the mid signal, then
        // the rear pair.
        assert_eq!(dest, vec![100, 200, 150, 150, 100, 200]);
    }
}
