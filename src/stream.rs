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
// Staging buffer between a pull decoder and the per-callback mixing pull.
// Decouples the decoder's variable production from the mixer's fixed-size
// requests.
//

use crate::decoder::Decoder;

/// Length of the staging buffer in milliseconds of audio at the stream's
/// native rate.
const STREAM_BUFFER_MS: usize = 100;

/// Extra frames requested beyond the exact resampling need, so interpolation
/// can read one sample ahead without leaving the filled region.
pub(crate) const STREAM_SAFETY_SAMPLES: usize = 4;

/// Result of refilling the staging buffer for one mix call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFill {
    /// Bytes of the buffer that are valid for this mix call (leftovers plus
    /// freshly decoded data plus any zero-fill).
    pub filled: usize,
    /// The decoder is dry and the stream is configured to stop: the source
    /// should end playback without mixing.
    pub ended: bool,
}

/// A pull decoder staged through a scratch buffer sized to a fixed wall-clock
/// duration at the stream's native rate. Each mix call pulls exactly what the
/// resampler will consume; unconsumed bytes survive to the next call.
pub struct SoundStream {
    decoder: Box<dyn Decoder>,
    /// Scratch storage the playback cursor walks during a mix call.
    buffer: Vec<u8>,
    /// Bytes at the front of the buffer left over from the previous call.
    unused: usize,
    /// Valid region established by the most recent `prepare`.
    filled: usize,
    /// Bytes of the valid region that are real decoder output. The
    /// zero-filled tail past this point is scratch and never carries over
    /// to the next call.
    loaded: usize,
    /// Whether playback ends when the decoder runs dry. When false, a
    /// seekable decoder is rewound to keep producing (looped compressed
    /// clips); a non-seekable one yields silence.
    stop_at_end: bool,
}

impl SoundStream {
    /// Wraps a decoder, sizing the staging buffer from its native format.
    pub fn new(decoder: Box<dyn Decoder>) -> SoundStream {
        let capacity = decoder.frame_size() * decoder.frequency() as usize * STREAM_BUFFER_MS
            / 1000
            + STREAM_SAFETY_SAMPLES * decoder.frame_size();
        SoundStream {
            decoder,
            buffer: vec![0; capacity],
            unused: 0,
            filled: 0,
            loaded: 0,
            stop_at_end: true,
        }
    }

    pub fn set_stop_at_end(&mut self, stop_at_end: bool) {
        self.stop_at_end = stop_at_end;
    }

    pub fn stop_at_end(&self) -> bool {
        self.stop_at_end
    }

    pub fn frequency(&self) -> u32 {
        self.decoder.frequency()
    }

    pub fn sample_size(&self) -> u32 {
        self.decoder.sample_size()
    }

    pub fn is_stereo(&self) -> bool {
        self.decoder.is_stereo()
    }

    /// Bytes per interleaved frame.
    pub fn frame_size(&self) -> usize {
        self.decoder.frame_size()
    }

    /// The staging buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// The bytes the cursor may walk this mix call.
    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.filled]
    }

    /// Forwards a seek to the decoder. Returns false when unsupported.
    pub fn seek(&mut self, frame: u64) -> bool {
        if self.decoder.seek(frame) {
            self.unused = 0;
            self.filled = 0;
            self.loaded = 0;
            true
        } else {
            false
        }
    }

    /// Refills the staging buffer with enough bytes to satisfy `samples`
    /// output samples at the given rates. Shortfall from the decoder is
    /// zero-filled; a dry decoder either rewinds (continuing streams) or
    /// reports the stream ended.
    pub fn prepare(&mut self, samples: usize, effective_frequency: f32, mix_rate: u32) -> StreamFill {
        let frame_size = self.frame_size();
        let frames_needed = (samples as f32 * effective_frequency / mix_rate as f32) as usize
            + STREAM_SAFETY_SAMPLES;
        let total = (frames_needed * frame_size).max(self.unused).min(self.buffer.len());

        let mut got = 0;
        let want = total - self.unused;
        if want > 0 {
            let region = &mut self.buffer[self.unused..self.unused + want];
            got = self.decoder.read(region);

            // A continuing stream rewinds and keeps decoding; short loops may
            // need several rewinds to cover one request.
            while got < want && !self.stop_at_end {
                if !self.decoder.seek(0) {
                    break;
                }
                let more = self.decoder.read(&mut region[got..]);
                if more == 0 {
                    break;
                }
                got += more;
            }

            if got < want {
                region[got..].fill(0);
            }
        }

        let ended = self.stop_at_end && got == 0 && self.unused == 0;
        self.loaded = self.unused + got;
        self.filled = total;
        StreamFill {
            filled: total,
            ended,
        }
    }

    /// Retires one mix call: bytes the cursor consumed are dropped and any
    /// remaining decoded bytes move back to the buffer start. Zero-fill
    /// padding is discarded so a draining stream can still run dry.
    pub fn retire(&mut self, used: usize) {
        let used = used.min(self.loaded);
        self.buffer.copy_within(used..self.loaded, 0);
        self.unused = self.loaded - used;
        self.filled = 0;
        self.loaded = 0;
    }
}
