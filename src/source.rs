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

//! Sound sources.
//!
//! A [`SoundSource`] is the game-thread handle to one playing sound. It is
//! created through [`Mixer::create_source`](crate::mixer::Mixer::create_source),
//! which registers it with the mixer, and deregisters itself on drop. The
//! playback state itself lives behind a mutex shared with the mix pass.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clip::Clip;
use crate::decoder::Decoder;
use crate::format::OutputFormat;
use crate::mixer::Mixer;
use crate::stream::SoundStream;

use self::mix::{Boundary, MixCursor, OneShot, Pcm, Step, Wrap, S16, S8};
use self::volume::SpeakerVolumes;

mod mix;
mod volume;

/// Highest playback frequency a source accepts, in Hz.
const MAX_FREQUENCY: f32 = 256_000.0;

/// Game-thread handle to one sound source.
pub struct SoundSource {
    /// Unique ID of this source.
    id: u64,
    /// Playback state shared with the mix pass.
    core: Arc<Mutex<SourceCore>>,
    /// The owning mixer, for deregistration and master gain lookups.
    mixer: Mixer,
}

impl SoundSource {
    pub(crate) fn new(id: u64, core: Arc<Mutex<SourceCore>>, mixer: Mixer) -> SoundSource {
        SoundSource { id, core, mixer }
    }

    /// Returns the unique ID of this source. Finished events carry it.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Starts playing a clip from its beginning. Compressed clips play
    /// through a freshly opened decoder. Returns false when the clip has no
    /// data or its decoder cannot be opened.
    pub fn play(&self, clip: Arc<Clip>) -> bool {
        self.core.lock().play_clip(clip)
    }

    /// Starts playing a clip with the given frequency, gain and panning.
    pub fn play_at(&self, clip: Arc<Clip>, frequency: f32, gain: f32, panning: f32) -> bool {
        let mut core = self.core.lock();
        core.gain = gain.max(0.0);
        core.panning = panning.clamp(-1.0, 1.0);
        let started = core.play_clip(clip);
        core.frequency = frequency.clamp(0.0, MAX_FREQUENCY);
        started
    }

    /// Starts streaming from a decoder. The stream ends when the decoder
    /// runs dry.
    pub fn play_stream(&self, decoder: Box<dyn Decoder>) {
        self.core.lock().start_stream(SoundStream::new(decoder));
    }

    /// Stops playback. Idempotent. A playback that was still pending a
    /// finished event raises it on the next update pass.
    pub fn stop(&self) {
        self.core.lock().finish();
    }

    /// Seeks to a time position in seconds. For clips the position is
    /// clamped to the clip length and aligned down to a frame boundary; for
    /// streams the decoder decides whether seeking is supported.
    pub fn seek(&self, time: f32) -> bool {
        let mut core = self.core.lock();
        let Some(frequency) = core.native_frequency() else {
            return false;
        };
        let frame = (time.max(0.0) * frequency as f32) as u64;
        core.seek_frames(frame)
    }

    /// Sets the scalar gain. Unbounded above 1, never negative.
    pub fn set_gain(&self, gain: f32) {
        self.core.lock().gain = gain.max(0.0);
    }

    /// Sets the attenuation in `[0, 1]`.
    pub fn set_attenuation(&self, attenuation: f32) {
        self.core.lock().attenuation = attenuation.clamp(0.0, 1.0);
    }

    /// Sets the left/right panning in `[-1, 1]`.
    pub fn set_panning(&self, panning: f32) {
        self.core.lock().panning = panning.clamp(-1.0, 1.0);
    }

    /// Sets the front/rear reach in `[-1, 1]` used by surround layouts.
    pub fn set_reach(&self, reach: f32) {
        self.core.lock().reach = reach.clamp(-1.0, 1.0);
    }

    /// Sets the playback frequency in Hz.
    pub fn set_frequency(&self, frequency: f32) {
        self.core.lock().frequency = frequency.clamp(0.0, MAX_FREQUENCY);
    }

    /// Routes this source to the subwoofer channel on layouts that have one.
    pub fn set_low_frequency(&self, low_frequency: bool) {
        self.core.lock().low_frequency = low_frequency;
    }

    /// Exempts this source from the mixer's time scale.
    pub fn set_ignore_time_scale(&self, ignore: bool) {
        self.core.lock().ignore_time_scale = ignore;
    }

    /// Deregisters this source from the mixer when playback finishes.
    pub fn set_auto_remove(&self, auto_remove: bool) {
        self.core.lock().auto_remove = auto_remove;
    }

    /// Assigns the sound type tag used for master gain grouping and pausing,
    /// and refreshes the cached master gain for the new type.
    pub fn set_sound_type(&self, sound_type: &str) {
        self.mixer.assign_sound_type(&self.core, sound_type);
    }

    pub fn gain(&self) -> f32 {
        self.core.lock().gain
    }

    pub fn attenuation(&self) -> f32 {
        self.core.lock().attenuation
    }

    pub fn panning(&self) -> f32 {
        self.core.lock().panning
    }

    pub fn reach(&self) -> f32 {
        self.core.lock().reach
    }

    pub fn frequency(&self) -> f32 {
        self.core.lock().frequency
    }

    pub fn sound_type(&self) -> String {
        self.core.lock().sound_type.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.core.lock().is_playing()
    }

    /// Current play position in source frames.
    pub fn play_position_samples(&self) -> u64 {
        self.core.lock().position_frames()
    }

    /// Length of the current clip in frames. Zero for streams and compressed
    /// payloads, whose length is not known ahead of decoding.
    pub fn length_samples(&self) -> u64 {
        let core = self.core.lock();
        core.clip.as_ref().map_or(0, |clip| clip.frames() as u64)
    }

    /// Current play position in seconds.
    pub fn time_position(&self) -> f32 {
        self.core.lock().time_position
    }

    /// Snapshots the persistable parameters of this source.
    pub fn state(&self) -> SourceState {
        let core = self.core.lock();
        SourceState {
            sound_type: core.sound_type.clone(),
            gain: core.gain,
            attenuation: core.attenuation,
            panning: core.panning,
            reach: core.reach,
            frequency: core.frequency,
            low_frequency: core.low_frequency,
            position_samples: core.position_frames(),
            playing: core.is_playing(),
            auto_remove: core.auto_remove,
        }
    }

    /// Restores a snapshot taken with [`state`](Self::state). Parameters are
    /// re-clamped on the way in. When the snapshot was playing and this
    /// source currently is, playback resumes from the snapshot position;
    /// restoring a stopped snapshot stops playback.
    pub fn restore(&self, state: &SourceState) {
        self.mixer.assign_sound_type(&self.core, &state.sound_type);
        let mut core = self.core.lock();
        core.gain = state.gain.max(0.0);
        core.attenuation = state.attenuation.clamp(0.0, 1.0);
        core.panning = state.panning.clamp(-1.0, 1.0);
        core.reach = state.reach.clamp(-1.0, 1.0);
        core.frequency = state.frequency.clamp(0.0, MAX_FREQUENCY);
        core.low_frequency = state.low_frequency;
        core.auto_remove = state.auto_remove;
        if state.playing {
            core.seek_frames(state.position_samples);
        } else {
            core.finish();
        }
    }
}

impl Drop for SoundSource {
    fn drop(&mut self) {
        self.mixer.unregister(self.id);
    }
}

impl std::fmt::Debug for SoundSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.core.lock();
        f.debug_struct("SoundSource")
            .field("id", &self.id)
            .field("sound_type", &core.sound_type)
            .field("playing", &core.is_playing())
            .field("streaming", &core.stream.is_some())
            .finish()
    }
}

/// Persistable source parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceState {
    pub sound_type: String,
    pub gain: f32,
    pub attenuation: f32,
    pub panning: f32,
    pub reach: f32,
    pub frequency: f32,
    pub low_frequency: bool,
    pub position_samples: u64,
    pub playing: bool,
    pub auto_remove: bool,
}

/// Playback state of one source, shared between the handle and the mixer.
pub(crate) struct SourceCore {
    /// Unique ID, matching the owning handle.
    pub(crate) id: u64,
    /// The clip being played, if any. Mutually exclusive with `stream`.
    clip: Option<Arc<Clip>>,
    /// The stream being played, if any.
    stream: Option<SoundStream>,
    /// Byte offset of the cursor into the clip data or ring buffer. `None`
    /// exactly when the source is not playing.
    offset: Option<usize>,
    /// Fractional cursor position in `[0, 65535]`.
    fract: u32,
    /// Play position in seconds.
    time_position: f32,
    gain: f32,
    attenuation: f32,
    panning: f32,
    reach: f32,
    /// Playback frequency in Hz.
    frequency: f32,
    /// Cached master gain for this source's sound type, refreshed by the
    /// mixer whenever the gain table or the type changes.
    pub(crate) master_gain: f32,
    /// Sound type tag for master gain grouping and pausing.
    pub(crate) sound_type: String,
    low_frequency: bool,
    ignore_time_scale: bool,
    /// Deregister from the mixer once finished.
    pub(crate) auto_remove: bool,
    /// A finished event is owed for the current playback.
    finish_pending: bool,
}

impl SourceCore {
    pub(crate) fn new(id: u64, sound_type: &str, master_gain: f32) -> SourceCore {
        SourceCore {
            id,
            clip: None,
            stream: None,
            offset: None,
            fract: 0,
            time_position: 0.0,
            gain: 1.0,
            attenuation: 1.0,
            panning: 0.0,
            reach: 0.0,
            frequency: 0.0,
            master_gain,
            sound_type: sound_type.to_string(),
            low_frequency: false,
            ignore_time_scale: false,
            auto_remove: false,
            finish_pending: false,
        }
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.offset.is_some()
    }

    /// Consumes the pending finished flag once playback has ended.
    pub(crate) fn take_finished(&mut self) -> bool {
        if self.finish_pending && !self.is_playing() {
            self.finish_pending = false;
            true
        } else {
            false
        }
    }

    fn play_clip(&mut self, clip: Arc<Clip>) -> bool {
        if !clip.has_data() {
            self.finish();
            return false;
        }

        if clip.is_compressed() {
            return match clip.create_decoder() {
                Some(Ok(decoder)) => {
                    let mut stream = SoundStream::new(decoder);
                    stream.set_stop_at_end(!clip.is_looped());
                    self.start_stream(stream);
                    true
                }
                Some(Err(err)) => {
                    warn!(error = %err, "Failed to open clip decoder");
                    self.finish();
                    false
                }
                None => {
                    self.finish();
                    false
                }
            };
        }

        self.stream = None;
        self.frequency = clip.frequency() as f32;
        self.offset = Some(0);
        self.fract = 0;
        self.time_position = 0.0;
        self.finish_pending = true;
        self.clip = Some(clip);
        true
    }

    fn start_stream(&mut self, stream: SoundStream) {
        self.clip = None;
        self.frequency = stream.frequency() as f32;
        self.stream = Some(stream);
        self.offset = Some(0);
        self.fract = 0;
        self.time_position = 0.0;
        self.finish_pending = true;
    }

    /// Clears the cursor and releases any stream. The pending finished flag
    /// survives so the event is still raised.
    fn finish(&mut self) {
        self.offset = None;
        self.stream = None;
        self.fract = 0;
        self.time_position = 0.0;
    }

    /// The native rate of whatever is playing, used to convert seek times.
    fn native_frequency(&self) -> Option<u32> {
        match (&self.stream, &self.clip) {
            (Some(stream), _) => Some(stream.frequency()),
            (None, Some(clip)) => Some(clip.frequency()),
            (None, None) => None,
        }
    }

    fn position_frames(&self) -> u64 {
        match (&self.stream, &self.clip, self.offset) {
            (Some(stream), _, Some(_)) => {
                (self.time_position * stream.frequency() as f32).round() as u64
            }
            (None, Some(clip), Some(offset)) => (offset / clip.frame_size()) as u64,
            _ => 0,
        }
    }

    fn seek_frames(&mut self, frame: u64) -> bool {
        if self.offset.is_none() {
            return false;
        }
        if let Some(stream) = self.stream.as_mut() {
            if stream.seek(frame) {
                self.fract = 0;
                self.time_position = frame as f32 / stream.frequency() as f32;
                return true;
            }
            return false;
        }
        if let Some(clip) = &self.clip {
            let frame_size = clip.frame_size();
            let target = (frame as usize).min(clip.end() / frame_size);
            self.offset = Some(target * frame_size);
            self.fract = 0;
            self.time_position = target as f32 / clip.frequency() as f32;
            return true;
        }
        false
    }

    /// Mixes this source into an interleaved i32 accumulation buffer laid
    /// out for the given format. Returns without advancing when the source
    /// is not playing or its effective time scale is zero; all-zero channel
    /// volumes advance the cursor without touching the buffer.
    pub(crate) fn mix(&mut self, dest: &mut [i32], format: &OutputFormat, time_scale: f32) {
        let samples = dest.len() / format.channels();
        if samples == 0 || self.offset.is_none() {
            return;
        }
        let scale = if self.ignore_time_scale { 1.0 } else { time_scale };
        if scale == 0.0 {
            return;
        }

        let total_gain = self.master_gain * self.attenuation * self.gain;
        let stereo_source = self.source_is_stereo();
        let vols = if stereo_source {
            volume::stereo_volumes(format.layout, total_gain, self.low_frequency)
        } else {
            volume::mono_volumes(
                format.layout,
                total_gain,
                self.panning,
                self.reach,
                self.low_frequency,
            )
        };
        if vols.is_silent() {
            self.advance(samples, format, time_scale);
            return;
        }

        let effective_frequency = self.frequency * scale;
        let step = Step::new(effective_frequency, format.sample_rate);
        if self.stream.is_some() {
            self.mix_stream(dest, samples, effective_frequency, step, vols, format);
        } else if let Some(clip) = self.clip.clone() {
            self.mix_clip(&clip, dest, step, vols, format.interpolation);
        }
    }

    /// Advances playback as a zero-volume mix of the given sample count
    /// would, including loop wraps, natural ends and stream consumption.
    /// This is also the headless path driven by the mixer's update pass.
    pub(crate) fn advance(&mut self, samples: usize, format: &OutputFormat, time_scale: f32) {
        if samples == 0 || self.offset.is_none() {
            return;
        }
        let scale = if self.ignore_time_scale { 1.0 } else { time_scale };
        if scale == 0.0 {
            return;
        }
        let effective_frequency = self.frequency * scale;
        let step = Step::new(effective_frequency, format.sample_rate);

        if let Some(stream) = self.stream.as_mut() {
            let fill = stream.prepare(samples, effective_frequency, format.sample_rate);
            if fill.ended {
                self.finish();
                return;
            }
            let frame_size = stream.frame_size();
            let filled_frames = fill.filled / frame_size;
            let mut cursor = MixCursor {
                frame: 0,
                fract: self.fract,
            };
            mix::advance_silent(
                &mut cursor,
                step,
                OneShot { end: filled_frames },
                samples,
            );
            let consumed = cursor.frame.min(filled_frames);
            self.fract = cursor.fract;
            stream.retire(consumed * frame_size);
            self.time_position += consumed as f32 / stream.frequency() as f32;
        } else if let Some(clip) = self.clip.clone() {
            let region = ClipRegion::of(&clip);
            if region.end == 0 {
                self.finish();
                return;
            }
            let mut cursor = self.clip_cursor(region.frame_size);
            let more = if region.looped {
                mix::advance_silent(&mut cursor, step, region.wrap(), samples)
            } else if cursor.frame >= region.end {
                false
            } else {
                mix::advance_silent(&mut cursor, step, region.one_shot(), samples)
            };
            self.fract = cursor.fract;
            if more {
                self.offset = Some(cursor.frame * region.frame_size);
                self.time_position = cursor.frame as f32 / clip.frequency() as f32;
            } else {
                self.finish();
            }
        }
    }

    fn source_is_stereo(&self) -> bool {
        match (&self.stream, &self.clip) {
            (Some(stream), _) => stream.is_stereo(),
            (None, Some(clip)) => clip.is_stereo(),
            (None, None) => false,
        }
    }

    fn clip_cursor(&self, frame_size: usize) -> MixCursor {
        MixCursor {
            frame: self.offset.unwrap_or(0) / frame_size,
            fract: self.fract,
        }
    }

    fn mix_clip(
        &mut self,
        clip: &Arc<Clip>,
        dest: &mut [i32],
        step: Step,
        vols: SpeakerVolumes,
        interpolation: bool,
    ) {
        let region = ClipRegion::of(clip);
        if region.end == 0 {
            self.finish();
            return;
        }
        let mut cursor = self.clip_cursor(region.frame_size);
        let sixteen_bit = clip.is_sixteen_bit();
        let stereo = clip.is_stereo();

        let more = if region.looped {
            let boundary = region.wrap();
            boundary.rein(&mut cursor.frame);
            mix_region(
                clip.data(),
                sixteen_bit,
                stereo,
                interpolation,
                &mut cursor,
                step,
                boundary,
                vols,
                dest,
            )
        } else if cursor.frame >= region.end {
            false
        } else {
            mix_region(
                clip.data(),
                sixteen_bit,
                stereo,
                interpolation,
                &mut cursor,
                step,
                region.one_shot(),
                vols,
                dest,
            )
        };

        self.fract = cursor.fract;
        if more {
            self.offset = Some(cursor.frame * region.frame_size);
            self.time_position = cursor.frame as f32 / clip.frequency() as f32;
        } else {
            self.finish();
        }
    }

    fn mix_stream(
        &mut self,
        dest: &mut [i32],
        samples: usize,
        effective_frequency: f32,
        step: Step,
        vols: SpeakerVolumes,
        format: &OutputFormat,
    ) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let fill = stream.prepare(samples, effective_frequency, format.sample_rate);
        if fill.ended {
            self.finish();
            return;
        }

        let frame_size = stream.frame_size();
        let filled_frames = fill.filled / frame_size;
        // Mixing starts from the ring start on every call; only the
        // fractional position carries over.
        let mut cursor = MixCursor {
            frame: 0,
            fract: self.fract,
        };
        if filled_frames > 0 {
            mix_region(
                stream.data(),
                stream.sample_size() == 2,
                stream.is_stereo(),
                format.interpolation,
                &mut cursor,
                step,
                OneShot { end: filled_frames },
                vols,
                dest,
            );
        }
        let consumed = cursor.frame.min(filled_frames);
        self.fract = cursor.fract;
        stream.retire(consumed * frame_size);
        self.time_position += consumed as f32 / stream.frequency() as f32;
    }
}

/// Playable region of a clip, in frames.
#[derive(Clone, Copy)]
struct ClipRegion {
    frame_size: usize,
    end: usize,
    repeat: usize,
    looped: bool,
}

impl ClipRegion {
    fn of(clip: &Clip) -> ClipRegion {
        let frame_size = clip.frame_size();
        let end = clip.end() / frame_size;
        let repeat = clip.repeat() / frame_size;
        ClipRegion {
            frame_size,
            end,
            repeat,
            // A loop region of zero frames cannot wrap; play it out instead.
            looped: clip.is_looped() && repeat < end,
        }
    }

    fn wrap(&self) -> Wrap {
        Wrap {
            end: self.end,
            repeat: self.repeat,
        }
    }

    fn one_shot(&self) -> OneShot {
        OneShot { end: self.end }
    }
}

fn mix_region<B: Boundary>(
    data: &[u8],
    sixteen_bit: bool,
    stereo: bool,
    interpolation: bool,
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    vols: SpeakerVolumes,
    dest: &mut [i32],
) -> bool {
    if sixteen_bit {
        run_routines::<S16, B>(data, stereo, interpolation, cursor, step, boundary, vols, dest)
    } else {
        run_routines::<S8, B>(data, stereo, interpolation, cursor, step, boundary, vols, dest)
    }
}

/// Selects exactly one mixing routine from the source channel count, the
/// interpolation flag and the shape of the channel volumes.
#[allow(clippy::too_many_arguments)]
fn run_routines<P: Pcm, B: Boundary>(
    data: &[u8],
    stereo: bool,
    interpolation: bool,
    cursor: &mut MixCursor,
    step: Step,
    boundary: B,
    vols: SpeakerVolumes,
    dest: &mut [i32],
) -> bool {
    match (vols, stereo, interpolation) {
        (SpeakerVolumes::Mono { vol }, false, false) => {
            mix::mix_mono_to_mono::<P, B>(data, cursor, step, boundary, vol, dest)
        }
        (SpeakerVolumes::Mono { vol }, false, true) => {
            mix::mix_mono_to_mono_ip::<P, B>(data, cursor, step, boundary, vol, dest)
        }
        (SpeakerVolumes::Mono { vol }, true, false) => {
            mix::mix_stereo_to_mono::<P, B>(data, cursor, step, boundary, vol, dest)
        }
        (SpeakerVolumes::Mono { vol }, true, true) => {
            mix::mix_stereo_to_mono_ip::<P, B>(data, cursor, step, boundary, vol, dest)
        }
        (SpeakerVolumes::Stereo { left, right }, false, false) => {
            mix::mix_mono_to_stereo::<P, B>(data, cursor, step, boundary, left, right, dest)
        }
        (SpeakerVolumes::Stereo { left, right }, false, true) => {
            mix::mix_mono_to_stereo_ip::<P, B>(data, cursor, step, boundary, left, right, dest)
        }
        // Stereo sources carry one volume on both of their channels.
        (SpeakerVolumes::Stereo { left, .. }, true, false) => {
            mix::mix_stereo_to_stereo::<P, B>(data, cursor, step, boundary, left, dest)
        }
        (SpeakerVolumes::Stereo { left, .. }, true, true) => {
            mix::mix_stereo_to_stereo_ip::<P, B>(data, cursor, step, boundary, left, dest)
        }
        (SpeakerVolumes::Quad(vols), false, false) => {
            mix::mix_mono_to_multi::<P, B, 4>(data, cursor, step, boundary, vols, dest)
        }
        (SpeakerVolumes::Quad(vols), false, true) => {
            mix::mix_mono_to_multi_ip::<P, B, 4>(data, cursor, step, boundary, vols, dest)
        }
        (SpeakerVolumes::Quad(vols), true, false) => {
            mix::mix_stereo_to_multi::<P, B, 4>(data, cursor, step, boundary, vols, dest)
        }
        (SpeakerVolumes::Quad(vols), true, true) => {
            mix::mix_stereo_to_multi_ip::<P, B, 4>(data, cursor, step, boundary, vols, dest)
        }
        (SpeakerVolumes::Surround(vols), false, false) => {
            mix::mix_mono_to_multi::<P, B, 6>(data, cursor, step, boundary, vols, dest)
        }
        (SpeakerVolumes::Surround(vols), false, true) => {
            mix::mix_mono_to_multi_ip::<P, B, 6>(data, cursor, step, boundary, vols, dest)
        }
        (SpeakerVolumes::Surround(vols), true, false) => {
            mix::mix_stereo_to_multi::<P, B, 6>(data, cursor, step, boundary, vols, dest)
        }
        (SpeakerVolumes::Surround(vols), true, true) => {
            mix::mix_stereo_to_multi_ip::<P, B, 6>(data, cursor, step, boundary, vols, dest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SpeakerLayout;
    use crate::testutil;

    fn mono_format() -> OutputFormat {
        OutputFormat {
            sample_rate: 44100,
            layout: SpeakerLayout::Mono,
            interpolation: false,
            buffer: std::time::Duration::from_millis(100),
        }
    }

    fn test_core() -> SourceCore {
        SourceCore::new(1, "sfx", 1.0)
    }

    fn ramp_clip(samples: &[i16], looped: bool) -> Arc<Clip> {
        let mut clip = Clip::from_pcm16(samples, 44100, false);
        clip.set_looped(looped);
        Arc::new(clip)
    }

    #[test]
    fn test_looped_clip_mix_and_cursor() {
        let mut core = test_core();
        assert!(core.play_clip(ramp_clip(&[10, 20, 30, 40], true)));

        let mut dest = vec![0i32; 6];
        core.mix(&mut dest, &mono_format(), 1.0);

        assert_eq!(dest, vec![10, 20, 30, 40, 10, 20]);
        assert_eq!(core.position_frames(), 2);
        assert!(core.is_playing());
    }

    #[test]
    fn test_one_shot_clip_stops_once() {
        let mut core = test_core();
        assert!(core.play_clip(ramp_clip(&[10, 20, 30, 40], false)));

        let mut dest = vec![0i32; 6];
        core.mix(&mut dest, &mono_format(), 1.0);

        assert_eq!(dest, vec![10, 20, 30, 40, 0, 0]);
        assert!(!core.is_playing());
        assert!(core.take_finished());
        assert!(!core.take_finished());

        // A stopped source leaves the buffer alone.
        let mut dest = vec![0i32; 4];
        core.mix(&mut dest, &mono_format(), 1.0);
        assert_eq!(dest, vec![0; 4]);
    }

    #[test]
    fn test_finished_not_raised_while_playing() {
        let mut core = test_core();
        core.play_clip(ramp_clip(&[10, 20, 30, 40], false));
        assert!(!core.take_finished());

        let mut dest = vec![0i32; 2];
        core.mix(&mut dest, &mono_format(), 1.0);
        assert!(!core.take_finished());
    }

    #[test]
    fn test_stop_keeps_finished_pending() {
        let mut core = test_core();
        core.play_clip(ramp_clip(&[10, 20, 30, 40], true));
        core.finish();
        assert!(!core.is_playing());
        assert!(core.take_finished());
    }

    #[test]
    fn test_zero_time_scale_freezes_playback() {
        let mut core = test_core();
        core.play_clip(ramp_clip(&[10, 20, 30, 40], true));

        let mut dest = vec![0i32; 4];
        core.mix(&mut dest, &mono_format(), 0.0);
        assert_eq!(dest, vec![0; 4]);
        assert_eq!(core.position_frames(), 0);

        core.ignore_time_scale = true;
        core.mix(&mut dest, &mono_format(), 0.0);
        assert_eq!(dest, vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_zero_volume_advances_silently() {
        let mut core = test_core();
        core.play_clip(ramp_clip(&[10, 20, 30, 40], true));
        core.gain = 0.0;

        let mut dest = vec![0i32; 6];
        core.mix(&mut dest, &mono_format(), 1.0);

        assert_eq!(dest, vec![0; 6]);
        assert_eq!(core.position_frames(), 2);
    }

    #[test]
    fn test_zero_volume_one_shot_still_ends() {
        let mut core = test_core();
        core.play_clip(ramp_clip(&[10, 20, 30, 40], false));
        core.gain = 0.0;

        let mut dest = vec![0i32; 6];
        core.mix(&mut dest, &mono_format(), 1.0);
        assert!(!core.is_playing());
        assert!(core.take_finished());
    }

    #[test]
    fn test_headless_advance_matches_mixed_positions() {
        let clip = ramp_clip(&[1, 2, 3, 4, 5, 6, 7], true);

        let mut mixed = test_core();
        mixed.play_clip(clip.clone());
        let mut dest = vec![0i32; 5];
        mixed.mix(&mut dest, &mono_format(), 1.0);

        let mut headless = test_core();
        headless.play_clip(clip);
        headless.advance(5, &mono_format(), 1.0);

        assert_eq!(mixed.position_frames(), headless.position_frames());
        assert_eq!(mixed.time_position, headless.time_position);
    }

    #[test]
    fn test_seek_aligns_to_frames() {
        let mut core = test_core();
        core.play_clip(ramp_clip(&[10, 20, 30, 40], false));

        assert!(core.seek_frames(2));
        assert_eq!(core.offset, Some(4));

        // Past the end clamps to the end; the next mix ends playback.
        assert!(core.seek_frames(100));
        assert_eq!(core.offset, Some(8));
        let mut dest = vec![0i32; 2];
        core.mix(&mut dest, &mono_format(), 1.0);
        assert!(!core.is_playing());
    }

    #[test]
    fn test_empty_clip_does_not_play() {
        let mut core = test_core();
        assert!(!core.play_clip(Arc::new(Clip::from_pcm(Vec::new(), 44100, true, false))));
        assert!(!core.is_playing());
    }

    #[test]
    fn test_stream_mix_pulls_from_decoder() {
        let mut core = test_core();
        core.start_stream(SoundStream::new(Box::new(testutil::RampDecoder::new(
            44100, 40,
        ))));
        assert!(core.is_playing());

        let mut dest = vec![0i32; 10];
        core.mix(&mut dest, &mono_format(), 1.0);

        // 8 bit source bytes 0.. scaled up by the 256 volume.
        let expected: Vec<i32> = (0..10).map(|b| b * 256).collect();
        assert_eq!(dest, expected);
        assert_eq!(core.position_frames(), 10);
    }

    #[test]
    fn test_stream_ends_when_decoder_dry() {
        let mut core = test_core();
        core.start_stream(SoundStream::new(Box::new(testutil::RampDecoder::new(
            44100, 8,
        ))));

        let mut dest = vec![0i32; 8];
        core.mix(&mut dest, &mono_format(), 1.0);
        assert!(core.is_playing());

        // Decoder is dry and the leftover is gone, so the next mix ends it.
        let mut dest = vec![0i32; 8];
        core.mix(&mut dest, &mono_format(), 1.0);
        assert!(!core.is_playing());
        assert!(core.take_finished());
    }

    #[test]
    fn test_compressed_clip_plays_through_stream_path() {
        let payload = testutil::wav_payload_mono16(&(0..64).collect::<Vec<i16>>(), 44100);
        let clip = Arc::new(Clip::from_compressed(payload).expect("probe wav payload"));

        let mut core = test_core();
        assert!(core.play_clip(clip));
        assert!(core.stream.is_some());
        assert!(core.clip.is_none());

        let mut dest = vec![0i32; 8];
        core.mix(&mut dest, &mono_format(), 1.0);
        assert_eq!(dest, (0..8).collect::<Vec<i32>>());
    }

    #[test]
    fn test_state_snapshot_round_trip() {
        let mut core = test_core();
        core.play_clip(ramp_clip(&[10, 20, 30, 40, 50, 60], false));
        core.gain = 0.5;
        core.panning = -0.25;

        let mut dest = vec![0i32; 3];
        core.mix(&mut dest, &mono_format(), 1.0);
        assert_eq!(core.position_frames(), 3);

        let state = SourceState {
            sound_type: core.sound_type.clone(),
            gain: core.gain,
            attenuation: core.attenuation,
            panning: core.panning,
            reach: core.reach,
            frequency: core.frequency,
            low_frequency: core.low_frequency,
            position_samples: core.position_frames(),
            playing: core.is_playing(),
            auto_remove: core.auto_remove,
        };

        let yaml = serde_yml::to_string(&state).expect("serialize state");
        let parsed: SourceState = serde_yml::from_str(&yaml).expect("parse state");
        assert_eq!(parsed, state);
        assert_eq!(parsed.position_samples, 3);
        assert!(parsed.playing);
    }
}
