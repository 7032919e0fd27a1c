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

pub mod symphonia;

use std::io;

use ::symphonia::core::errors::Error as SymphoniaError;

/// Errors that can occur while opening or seeking a decoder.
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    /// IO error while reading the payload.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The payload could not be probed or decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] SymphoniaError),

    /// The container holds no decodable audio track.
    #[error("No audio track found")]
    NoTrack,

    /// The container does not declare a parameter the mixer needs.
    #[error("Stream parameter missing: {0}")]
    MissingParameter(&'static str),
}

/// A pull-based PCM byte source feeding streamed playback. Implementations
/// decode on demand; the streaming buffer never inspects the compressed
/// format itself.
pub trait Decoder: Send {
    /// Fills `buffer` with as many decoded PCM bytes as are available and
    /// returns how many were written. A short read signals the end of the
    /// stream; the caller zero-fills the remainder.
    fn read(&mut self, buffer: &mut [u8]) -> usize;

    /// Native sample rate of the decoded PCM in Hz.
    fn frequency(&self) -> u32;

    /// Bytes per single-channel sample of the decoded PCM.
    fn sample_size(&self) -> u32;

    /// Whether the decoded PCM is two-channel interleaved.
    fn is_stereo(&self) -> bool;

    /// Repositions the stream to the given frame. Returns false when the
    /// implementation cannot seek; the caller ignores the request then.
    fn seek(&mut self, frame: u64) -> bool {
        let _ = frame;
        false
    }

    /// Bytes per interleaved frame.
    fn frame_size(&self) -> usize {
        (self.sample_size() as usize) << (self.is_stereo() as usize)
    }
}

impl Decoder for Box<dyn Decoder> {
    fn read(&mut self, buffer: &mut [u8]) -> usize {
        (**self).read(buffer)
    }

    fn frequency(&self) -> u32 {
        (**self).frequency()
    }

    fn sample_size(&self) -> u32 {
        (**self).sample_size()
    }

    fn is_stereo(&self) -> bool {
        (**self).is_stereo()
    }

    fn seek(&mut self, frame: u64) -> bool {
        (**self).seek(frame)
    }
}
