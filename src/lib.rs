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

//! A software audio mixer.
//!
//! Sound sources play [`clip::Clip`]s or streamed decoders and are mixed
//! into interleaved 16-bit output, either through a real output device or
//! headlessly on machines without audio hardware. The [`mixer::Mixer`] is
//! the entry point: it hands out [`source::SoundSource`] handles and is
//! driven once per tick by [`mixer::Mixer::update`].

pub mod clip;
pub mod config;
pub mod decoder;
pub mod device;
pub mod format;
pub mod listener;
pub mod mixer;
pub mod source;
mod stream;
#[cfg(test)]
mod testutil;

pub use clip::Clip;
pub use config::MixerConfig;
pub use format::{OutputFormat, SpeakerLayout};
pub use listener::Listener;
pub use mixer::{FinishedEvent, Mixer};
pub use source::{SoundSource, SourceState};
