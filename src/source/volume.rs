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

//! Speaker volume derivation.
//!
//! The mixing routines take integer volumes scaled by 256. This module turns
//! a source's scalar gain and its panning and reach placement into one such
//! volume per output channel. Panning leans the source left (-1) or right
//! (+1), reach leans it toward the front (+1) or rear (-1) speaker pair.

use crate::format::SpeakerLayout;

/// Integer volumes for each channel of an output layout, scaled by 256.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SpeakerVolumes {
    Mono { vol: i32 },
    Stereo { left: i32, right: i32 },
    Quad([i32; 4]),
    Surround([i32; 6]),
}

impl SpeakerVolumes {
    /// True when every channel volume is zero and mixing would only advance
    /// the cursor.
    pub fn is_silent(&self) -> bool {
        match self {
            SpeakerVolumes::Mono { vol } => *vol == 0,
            SpeakerVolumes::Stereo { left, right } => *left == 0 && *right == 0,
            SpeakerVolumes::Quad(vols) => vols.iter().all(|vol| *vol == 0),
            SpeakerVolumes::Surround(vols) => vols.iter().all(|vol| *vol == 0),
        }
    }
}

#[inline]
fn scaled(factor: f32, gain: f32) -> i32 {
    (factor * gain * 256.0).round() as i32
}

/// Volumes for a mono source placed with panning and reach. Low frequency
/// sources bypass placement on 5.1 output and feed the LFE channel alone.
pub(crate) fn mono_volumes(
    layout: SpeakerLayout,
    total_gain: f32,
    panning: f32,
    reach: f32,
    low_frequency: bool,
) -> SpeakerVolumes {
    let left = (1.0 - panning) * 0.5;
    let right = (1.0 + panning) * 0.5;
    let front = (1.0 + reach) * 0.5;
    let rear = (1.0 - reach) * 0.5;

    match layout {
        SpeakerLayout::Mono => SpeakerVolumes::Mono {
            vol: scaled(1.0, total_gain),
        },
        SpeakerLayout::Stereo => SpeakerVolumes::Stereo {
            left: scaled(left, total_gain),
            right: scaled(right, total_gain),
        },
        SpeakerLayout::Quad => SpeakerVolumes::Quad([
            scaled(left * front, total_gain),
            scaled(right * front, total_gain),
            scaled(left * rear, total_gain),
            scaled(right * rear, total_gain),
        ]),
        SpeakerLayout::Surround51 => {
            if low_frequency {
                return SpeakerVolumes::Surround([0, 0, 0, scaled(1.0, total_gain), 0, 0]);
            }
            let front_left = left * front;
            let front_right = right * front;
            let center = (front_left + front_right) * 0.5 * reach.clamp(0.0, 1.0);
            SpeakerVolumes::Surround([
                scaled(front_left, total_gain),
                scaled(front_right, total_gain),
                scaled(center, total_gain),
                0,
                scaled(left * rear, total_gain),
                scaled(right * rear, total_gain),
            ])
        }
    }
}

/// Volumes for a stereo source. Each source channel maps straight through to
/// its side of the layout, so panning and reach do not apply.
pub(crate) fn stereo_volumes(
    layout: SpeakerLayout,
    total_gain: f32,
    low_frequency: bool,
) -> SpeakerVolumes {
    let vol = scaled(1.0, total_gain);
    match layout {
        SpeakerLayout::Mono => SpeakerVolumes::Mono { vol },
        SpeakerLayout::Stereo => SpeakerVolumes::Stereo {
            left: vol,
            right: vol,
        },
        SpeakerLayout::Quad => SpeakerVolumes::Quad([vol, vol, vol, vol]),
        SpeakerLayout::Surround51 => {
            if low_frequency {
                SpeakerVolumes::Surround([0, 0, 0, vol, 0, 0])
            } else {
                SpeakerVolumes::Surround([vol, vol, 0, 0, vol, vol])
            }
        }
    }
}
