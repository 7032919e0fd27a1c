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
// An immutable PCM (or compressed) audio asset with loop metadata. Clips are
// configured once at load time and then shared read-only between any number
// of sound sources.
//

use std::{fs, io, path::Path, sync::Arc};

use tracing::debug;

use crate::decoder::{symphonia::SymphoniaDecoder, Decoder, DecoderError};

/// Errors that can occur while loading a clip.
#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    /// IO error while reading the asset.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The WAV container could not be parsed.
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// The PCM layout is not one the mixer can play.
    #[error("Unsupported PCM format: {bits} bits, {channels} channels")]
    UnsupportedFormat { bits: u16, channels: u16 },

    /// The compressed payload could not be opened for probing.
    #[error("Decoder error: {0}")]
    Decoder(#[from] DecoderError),
}

/// An audio asset. Either decoded PCM played directly by the mixing routines
/// or a compressed payload (kept verbatim) played through the stream path.
#[derive(Clone)]
pub struct Clip {
    /// Interleaved PCM bytes, or the verbatim compressed payload.
    data: Arc<Vec<u8>>,
    /// Native sample rate in Hz.
    frequency: u32,
    /// Bytes per single-channel sample (1 or 2).
    sample_size: u32,
    /// Whether the PCM is two-channel interleaved.
    stereo: bool,
    /// Whether playback loops instead of stopping at the end.
    looped: bool,
    /// Loop re-entry point, in bytes from the start of the data.
    repeat: usize,
    /// One past the last playable byte. Always frame aligned.
    end: usize,
    /// Whether `data` holds a compressed payload rather than PCM.
    compressed: bool,
    /// Duration of a compressed payload in seconds, learned at probe time.
    compressed_length: f32,
}

impl Clip {
    /// Creates a clip from raw interleaved PCM bytes. Sixteen bit data is
    /// little endian; the length is aligned down to a whole frame.
    pub fn from_pcm(data: Vec<u8>, frequency: u32, sixteen_bit: bool, stereo: bool) -> Clip {
        let sample_size: u32 = if sixteen_bit { 2 } else { 1 };
        let frame_size = (sample_size as usize) << (stereo as usize);
        let end = data.len() - data.len() % frame_size;

        Clip {
            data: Arc::new(data),
            frequency,
            sample_size,
            stereo,
            looped: false,
            repeat: 0,
            end,
            compressed: false,
            compressed_length: 0.0,
        }
    }

    /// Creates a 16-bit clip from interleaved samples.
    pub fn from_pcm16(samples: &[i16], frequency: u32, stereo: bool) -> Clip {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Clip::from_pcm(data, frequency, true, stereo)
    }

    /// Loads a clip from a file, picking the WAV loader for `.wav` and
    /// keeping anything else as a compressed payload for streamed playback.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Clip, ClipError> {
        let path = path.as_ref();
        let is_wav = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if is_wav {
            Clip::from_wav_file(path)
        } else {
            Clip::from_compressed(fs::read(path)?)
        }
    }

    /// Loads an 8 or 16-bit PCM WAV file into a clip.
    pub fn from_wav_file<P: AsRef<Path>>(path: P) -> Result<Clip, ClipError> {
        let clip = Clip::from_wav(io::BufReader::new(fs::File::open(path.as_ref())?))?;
        debug!(
            path = %path.as_ref().display(),
            frequency = clip.frequency,
            stereo = clip.stereo,
            frames = clip.frames(),
            "Loaded WAV clip."
        );
        Ok(clip)
    }

    /// Reads a WAV stream into a clip.
    pub fn from_wav<R: io::Read>(reader: R) -> Result<Clip, ClipError> {
        let mut wav_reader = hound::WavReader::new(reader)?;
        let spec = wav_reader.spec();

        if spec.channels == 0 || spec.channels > 2 {
            return Err(ClipError::UnsupportedFormat {
                bits: spec.bits_per_sample,
                channels: spec.channels,
            });
        }
        let stereo = spec.channels == 2;

        let data = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 8) => {
                let mut data = Vec::new();
                for sample in wav_reader.samples::<i32>() {
                    data.push(sample? as i8 as u8);
                }
                return Ok(Clip::from_pcm(data, spec.sample_rate, false, stereo));
            }
            (hound::SampleFormat::Int, 16) => {
                let mut data = Vec::new();
                for sample in wav_reader.samples::<i32>() {
                    data.extend_from_slice(&(sample? as i16).to_le_bytes());
                }
                data
            }
            // Float WAVs are rescaled into 16-bit storage.
            (hound::SampleFormat::Float, _) => {
                let mut data = Vec::new();
                for sample in wav_reader.samples::<f32>() {
                    let scaled = (sample? * i16::MAX as f32)
                        .round()
                        .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                    data.extend_from_slice(&scaled.to_le_bytes());
                }
                data
            }
            _ => {
                return Err(ClipError::UnsupportedFormat {
                    bits: spec.bits_per_sample,
                    channels: spec.channels,
                })
            }
        };

        Ok(Clip::from_pcm(data, spec.sample_rate, true, stereo))
    }

    /// Wraps a compressed payload, probing it once for format and duration.
    /// Playback decodes on the fly through the stream path.
    pub fn from_compressed(payload: Vec<u8>) -> Result<Clip, ClipError> {
        let payload = Arc::new(payload);
        let probe = SymphoniaDecoder::from_shared_bytes(Arc::clone(&payload))?;
        let frequency = probe.frequency();
        let stereo = probe.is_stereo();
        let compressed_length = probe.length_seconds().unwrap_or(0.0);
        debug!(
            frequency,
            stereo, compressed_length, "Probed compressed clip."
        );

        Ok(Clip {
            end: payload.len(),
            data: payload,
            frequency,
            sample_size: 2,
            stereo,
            looped: false,
            repeat: 0,
            compressed: true,
            compressed_length,
        })
    }

    /// Enables or disables looping. The loop re-entry point is reset to the
    /// clip start when looping is switched on this way.
    pub fn set_looped(&mut self, looped: bool) {
        self.looped = looped;
        self.repeat = 0;
    }

    /// Enables looping with a re-entry point at the given frame.
    pub fn set_loop_point(&mut self, frame: usize) {
        let byte = (frame * self.frame_size()).min(self.end);
        self.looped = true;
        self.repeat = byte;
    }

    /// Overrides the native sample rate.
    pub fn set_frequency(&mut self, frequency: u32) {
        self.frequency = frequency;
    }

    pub fn is_looped(&self) -> bool {
        self.looped
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn is_sixteen_bit(&self) -> bool {
        self.sample_size == 2
    }

    pub fn is_stereo(&self) -> bool {
        self.stereo
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Bytes per single-channel sample.
    pub fn sample_size(&self) -> u32 {
        self.sample_size
    }

    /// Bytes per interleaved frame.
    pub fn frame_size(&self) -> usize {
        (self.sample_size as usize) << (self.stereo as usize)
    }

    /// The raw backing bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// One past the last playable byte.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Loop re-entry point in bytes.
    pub fn repeat(&self) -> usize {
        self.repeat
    }

    /// Whether there is anything to play at all.
    pub fn has_data(&self) -> bool {
        !self.data.is_empty() && self.end > 0
    }

    /// Total length in frames. Zero for compressed clips; see
    /// `length_seconds` for those.
    pub fn frames(&self) -> usize {
        if self.compressed {
            0
        } else {
            self.end / self.frame_size()
        }
    }

    /// Total length in seconds.
    pub fn length_seconds(&self) -> f32 {
        if self.compressed {
            self.compressed_length
        } else if self.frequency == 0 {
            0.0
        } else {
            self.frames() as f32 / self.frequency as f32
        }
    }

    /// Opens a fresh decoder over a compressed payload. Returns None for
    /// plain PCM clips.
    pub fn create_decoder(&self) -> Option<Result<Box<dyn Decoder>, DecoderError>> {
        if !self.compressed {
            return None;
        }
        Some(
            SymphoniaDecoder::from_shared_bytes(Arc::clone(&self.data))
                .map(|decoder| Box::new(decoder) as Box<dyn Decoder>),
        )
    }
}

impl std::fmt::Debug for Clip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clip")
            .field("bytes", &self.data.len())
            .field("frequency", &self.frequency)
            .field("sample_size", &self.sample_size)
            .field("stereo", &self.stereo)
            .field("looped", &self.looped)
            .field("compressed", &self.compressed)
            .finish()
    }
}
