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

use std::{fmt, str::FromStr, time::Duration};

/// Errors that can occur while describing an output format.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The speaker layout name is not recognized.
    #[error("Unsupported speaker layout: {0}")]
    UnknownLayout(String),

    /// The sample rate is zero.
    #[error("Sample rate must be greater than 0")]
    InvalidSampleRate,

    /// The buffer duration is zero.
    #[error("Buffer length must be greater than 0")]
    InvalidBuffer,

    /// The buffer duration string could not be parsed.
    #[error("Invalid buffer duration: {0}")]
    InvalidDuration(String),
}

/// Speaker layout the mixer renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerLayout {
    /// Single channel.
    Mono,
    /// Left/right.
    Stereo,
    /// Front left/right plus rear left/right.
    Quad,
    /// Front left/right, center, LFE, rear left/right.
    Surround51,
}

impl SpeakerLayout {
    /// The number of interleaved output channels for this layout.
    pub fn channels(self) -> usize {
        match self {
            SpeakerLayout::Mono => 1,
            SpeakerLayout::Stereo => 2,
            SpeakerLayout::Quad => 4,
            SpeakerLayout::Surround51 => 6,
        }
    }

    /// Whether this layout has a dedicated subwoofer channel.
    pub fn has_lfe(self) -> bool {
        matches!(self, SpeakerLayout::Surround51)
    }

    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            SpeakerLayout::Mono => "mono",
            SpeakerLayout::Stereo => "stereo",
            SpeakerLayout::Quad => "quad",
            SpeakerLayout::Surround51 => "5.1",
        }
    }
}

impl FromStr for SpeakerLayout {
    /// Convert from string representation
    fn from_str(s: &str) -> Result<Self, FormatError> {
        match s {
            "mono" | "Mono" => Ok(SpeakerLayout::Mono),
            "stereo" | "Stereo" => Ok(SpeakerLayout::Stereo),
            "quad" | "Quad" => Ok(SpeakerLayout::Quad),
            "5.1" | "surround" | "Surround" => Ok(SpeakerLayout::Surround51),
            _ => Err(FormatError::UnknownLayout(s.to_string())),
        }
    }

    type Err = FormatError;
}

impl fmt::Display for SpeakerLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output format the mixer is configured with.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFormat {
    /// Mix rate in Hz.
    pub sample_rate: u32,
    /// Speaker layout.
    pub layout: SpeakerLayout,
    /// Whether mixing routines use linear interpolation.
    pub interpolation: bool,
    /// Length of one output fragment (device buffer).
    pub buffer: Duration,
}

impl OutputFormat {
    /// Creates a new OutputFormat
    pub fn new(
        sample_rate: u32,
        layout: SpeakerLayout,
        interpolation: bool,
        buffer: Duration,
    ) -> Result<Self, FormatError> {
        if sample_rate == 0 {
            return Err(FormatError::InvalidSampleRate);
        }
        if buffer.is_zero() {
            return Err(FormatError::InvalidBuffer);
        }

        Ok(OutputFormat {
            sample_rate,
            layout,
            interpolation,
            buffer,
        })
    }

    /// The number of interleaved output channels.
    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    /// The number of frames in one output fragment at the mix rate.
    pub fn fragment_frames(&self) -> usize {
        (self.sample_rate as u128 * self.buffer.as_millis() / 1000) as usize
    }
}

impl Default for OutputFormat {
    /// Creates a default output format (44.1kHz stereo, interpolated, 100ms buffer)
    fn default() -> Self {
        OutputFormat {
            sample_rate: 44100,
            layout: SpeakerLayout::Stereo,
            interpolation: true,
            buffer: Duration::from_millis(100),
        }
    }
}
