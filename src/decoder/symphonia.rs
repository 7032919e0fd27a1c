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
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use symphonia::default::{get_codecs, get_probe};
use tracing::warn;

use super::{Decoder, DecoderError};

/// Shares a compressed payload with symphonia without copying it.
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// Decodes compressed audio (Ogg, MP3, FLAC, and anything else symphonia
/// understands) into interleaved 16-bit PCM on demand. Channels beyond the
/// first two are dropped so the output is always mono or stereo.
pub struct SymphoniaDecoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    frequency: u32,
    stereo: bool,
    length_frames: Option<u64>,
    // Decoded bytes from the last packet that did not fit the caller's buffer.
    leftover: Vec<u8>,
    finished: bool,
}

impl SymphoniaDecoder {
    /// Opens a decoder over a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DecoderError> {
        let file = File::open(path.as_ref())?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.as_ref().extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        Self::open(mss, hint)
    }

    /// Opens a decoder over an in-memory payload shared with its owner.
    pub fn from_shared_bytes(payload: Arc<Vec<u8>>) -> Result<Self, DecoderError> {
        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(SharedBytes(payload))),
            Default::default(),
        );
        Self::open(mss, Hint::new())
    }

    fn open(mss: MediaSourceStream, hint: Hint) -> Result<Self, DecoderError> {
        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;

        let mut format_reader = probed.format;

        // Find the first audio track.
        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecoderError::NoTrack)?;

        let track_id = track.id;
        let params = &track.codec_params;

        let frequency = params
            .sample_rate
            .ok_or(DecoderError::MissingParameter("sample rate"))?;
        let length_frames = params.n_frames;
        let channels = params.channels.map(|c| c.count()).unwrap_or(0);

        let decoder_opts: DecoderOptions = Default::default();
        let mut decoder = get_codecs().make(params, &decoder_opts)?;

        // If the container does not declare a channel count, decode the
        // first audio packet and derive it from the decoded buffer. The
        // decoded bytes become the initial leftover so they are not lost.
        let (channels, leftover) = if channels > 0 {
            (channels, Vec::new())
        } else {
            let mut primed = Vec::new();
            let mut consume = |decoded: AudioBufferRef| Self::buffer_to_pcm(decoded, &mut primed);
            let detected =
                Self::decode_next(format_reader.as_mut(), decoder.as_mut(), track_id, &mut consume)?;
            match detected {
                Some(channels) => (channels, primed),
                None => return Err(DecoderError::MissingParameter("channels")),
            }
        };

        Ok(Self {
            format_reader,
            decoder,
            track_id,
            frequency,
            stereo: channels >= 2,
            length_frames,
            leftover,
            finished: false,
        })
    }

    /// Duration of the stream in seconds, when the container declares it.
    pub fn length_seconds(&self) -> Option<f32> {
        self.length_frames
            .map(|frames| frames as f32 / self.frequency as f32)
    }

    /// Reads the next packet, mapping the usual end-of-stream errors to None.
    /// ResetRequired is surfaced so the caller can reset the decoder.
    fn read_next_packet(
        format_reader: &mut dyn FormatReader,
    ) -> Result<Option<Packet>, SymphoniaError> {
        match format_reader.next_packet() {
            Ok(packet) => Ok(Some(packet)),
            Err(SymphoniaError::ResetRequired) => Err(SymphoniaError::ResetRequired),
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Ok(None)
            }
            // Some decoders return DecodeError at EOF instead of IoError.
            Err(SymphoniaError::DecodeError(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Decodes packets for our track until `consume` observes one with audio
    /// in it, returning the channel count seen, or None at end of stream.
    fn decode_next(
        format_reader: &mut dyn FormatReader,
        decoder: &mut dyn symphonia::core::codecs::Decoder,
        track_id: u32,
        consume: &mut dyn FnMut(AudioBufferRef) -> usize,
    ) -> Result<Option<usize>, DecoderError> {
        loop {
            let packet = match Self::read_next_packet(format_reader) {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(None),
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != track_id {
                continue;
            }
            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    decoder.decode(&packet)?
                }
                Err(e) => return Err(e.into()),
            };
            let channels = consume(decoded);
            if channels > 0 {
                return Ok(Some(channels));
            }
        }
    }

    /// Appends a decoded buffer to `out` as interleaved little-endian 16-bit
    /// PCM, folded to at most two channels. Returns the observed channel
    /// count (0 for an empty buffer).
    fn buffer_to_pcm(decoded: AudioBufferRef, out: &mut Vec<u8>) -> usize {
        match decoded {
            AudioBufferRef::F32(buf) => Self::interleave(&buf, |s| Self::scale_f32(s), out),
            AudioBufferRef::F64(buf) => Self::interleave(&buf, |s| Self::scale_f32(s as f32), out),
            AudioBufferRef::S8(buf) => Self::interleave(&buf, |s| (s as i16) << 8, out),
            AudioBufferRef::S16(buf) => Self::interleave(&buf, |s| s, out),
            AudioBufferRef::S24(buf) => Self::interleave(&buf, |s| (s.inner() >> 8) as i16, out),
            AudioBufferRef::S32(buf) => Self::interleave(&buf, |s| (s >> 16) as i16, out),
            AudioBufferRef::U8(buf) => Self::interleave(&buf, |s| ((s as i16) - 128) << 8, out),
            AudioBufferRef::U16(buf) => Self::interleave(&buf, |s| (s as i32 - 32768) as i16, out),
            AudioBufferRef::U24(buf) => {
                Self::interleave(&buf, |s| ((s.inner() as i32 - (1 << 23)) >> 8) as i16, out)
            }
            AudioBufferRef::U32(buf) => {
                Self::interleave(&buf, |s| ((s as i64 - (1i64 << 31)) >> 16) as i16, out)
            }
        }
    }

    #[inline]
    fn scale_f32(sample: f32) -> i16 {
        (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
    }

    /// Interleaves planar samples into `out` as little-endian bytes, keeping
    /// at most the first two channels.
    fn interleave<T, F>(buf: &AudioBuffer<T>, convert: F, out: &mut Vec<u8>) -> usize
    where
        T: symphonia::core::sample::Sample,
        F: Fn(T) -> i16,
    {
        let frames = buf.frames();
        let channels = buf.spec().channels.count();
        let take = channels.min(2);
        let planes = buf.planes();
        out.reserve(frames * take * 2);
        for frame_idx in 0..frames {
            for plane in planes.planes().iter().take(take) {
                out.extend_from_slice(&convert(plane[frame_idx]).to_le_bytes());
            }
        }
        if frames == 0 {
            0
        } else {
            channels
        }
    }
}

impl Decoder for SymphoniaDecoder {
    fn read(&mut self, buffer: &mut [u8]) -> usize {
        let mut written = 0;

        // Serve leftovers from the previous read first.
        if !self.leftover.is_empty() {
            let take = buffer.len().min(self.leftover.len());
            buffer[..take].copy_from_slice(&self.leftover[..take]);
            self.leftover.drain(..take);
            written += take;
        }

        while written < buffer.len() && !self.finished {
            let mut pcm = Vec::new();
            let decoded = Self::decode_next(
                self.format_reader.as_mut(),
                self.decoder.as_mut(),
                self.track_id,
                &mut |decoded| Self::buffer_to_pcm(decoded, &mut pcm),
            );
            match decoded {
                Ok(Some(_)) => {
                    let take = (buffer.len() - written).min(pcm.len());
                    buffer[written..written + take].copy_from_slice(&pcm[..take]);
                    written += take;
                    if take < pcm.len() {
                        self.leftover.extend_from_slice(&pcm[take..]);
                    }
                }
                Ok(None) => {
                    self.finished = true;
                }
                Err(e) => {
                    // Mid-stream decode failures end the stream; the caller
                    // zero-fills whatever is missing.
                    warn!(error = %e, "Decoder failed mid-stream, ending playback.");
                    self.finished = true;
                }
            }
        }

        written
    }

    fn frequency(&self) -> u32 {
        self.frequency
    }

    fn sample_size(&self) -> u32 {
        2
    }

    fn is_stereo(&self) -> bool {
        self.stereo
    }

    fn seek(&mut self, frame: u64) -> bool {
        let time = Time::from(frame as f64 / self.frequency as f64);
        let seek_to = SeekTo::Time {
            time,
            track_id: Some(self.track_id),
        };
        match self.format_reader.seek(SeekMode::Accurate, seek_to) {
            Ok(_) => {
                self.decoder.reset();
                self.leftover.clear();
                self.finished = false;
                true
            }
            Err(e) => {
                warn!(error = %e, frame, "Decoder seek failed, ignoring.");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Symphonia reads WAV as well, which gives the tests a payload with
    // exactly known PCM contents.
    fn wav_payload(samples: &[i16], channels: u16, sample_rate: u32) -> Arc<Vec<u8>> {
        let mut bytes = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(
            &mut bytes,
            hound::WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
        )
        .unwrap();
        for sample in samples {
            writer.write_sample(*sample).unwrap();
        }
        writer.finalize().unwrap();
        Arc::new(bytes.into_inner())
    }

    fn as_i16(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    #[test]
    fn test_decode_mono() {
        let payload = wav_payload(&[0, 1000, 2000, 3000, 4000, 5000], 1, 22050);
        let mut decoder = SymphoniaDecoder::from_shared_bytes(payload).unwrap();

        assert_eq!(decoder.frequency(), 22050);
        assert_eq!(decoder.sample_size(), 2);
        assert!(!decoder.is_stereo());
        assert_eq!(decoder.frame_size(), 2);
        assert_eq!(decoder.length_seconds(), Some(6.0 / 22050.0));

        let mut buffer = vec![0u8; 64];
        let read = decoder.read(&mut buffer);
        assert_eq!(read, 12);
        assert_eq!(as_i16(&buffer[..read]), vec![0, 1000, 2000, 3000, 4000, 5000]);

        // Exhausted stream keeps returning nothing.
        assert_eq!(decoder.read(&mut buffer), 0);
    }

    #[test]
    fn test_decode_stereo() {
        let payload = wav_payload(&[1, -1, 2, -2, 3, -3], 2, 44100);
        let mut decoder = SymphoniaDecoder::from_shared_bytes(payload).unwrap();

        assert!(decoder.is_stereo());
        assert_eq!(decoder.frame_size(), 4);

        let mut buffer = vec![0u8; 64];
        let read = decoder.read(&mut buffer);
        assert_eq!(read, 12);
        assert_eq!(as_i16(&buffer[..read]), vec![1, -1, 2, -2, 3, -3]);
    }

    #[test]
    fn test_short_reads_carry_leftover() {
        let payload = wav_payload(&[10, 20, 30, 40], 1, 44100);
        let mut decoder = SymphoniaDecoder::from_shared_bytes(payload).unwrap();

        // Pull two bytes at a time; packet excess must survive in between.
        let mut collected = Vec::new();
        loop {
            let mut chunk = [0u8; 2];
            let read = decoder.read(&mut chunk);
            if read == 0 {
                break;
            }
            collected.extend_from_slice(&chunk[..read]);
        }
        assert_eq!(as_i16(&collected), vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_seek() {
        // One full second of filler, then markers. Seeking to a whole-second
        // boundary keeps the time-to-frame conversion exact.
        let mut samples = vec![7i16; 44100];
        samples.extend_from_slice(&[1111, 2222, 3333, 4444]);
        let payload = wav_payload(&samples, 1, 44100);
        let mut decoder = SymphoniaDecoder::from_shared_bytes(payload).unwrap();

        let mut buffer = vec![0u8; 4];
        decoder.read(&mut buffer);

        assert!(decoder.seek(44100));
        let mut rest = vec![0u8; 8];
        let read = decoder.read(&mut rest);
        assert_eq!(read, 8);
        assert_eq!(as_i16(&rest), vec![1111, 2222, 3333, 4444]);
    }

    #[test]
    fn test_rejects_garbage() {
        let payload = Arc::new(vec![0u8; 64]);
        assert!(SymphoniaDecoder::from_shared_bytes(payload).is_err());
    }
}
