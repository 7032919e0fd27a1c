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

use serde::{Deserialize, Serialize};

/// World-space orientation of the listening position. The mixer snapshots
/// the active listener once per mix pass; positional attenuation itself is
/// computed by the caller and fed in through `set_attenuation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Listener {
    /// World-space position.
    pub position: [f32; 3],
    /// Normalized forward direction.
    pub forward: [f32; 3],
    /// Normalized up direction.
    pub up: [f32; 3],
}

impl Listener {
    /// Creates a listener at the given position facing down negative Z.
    pub fn new(position: [f32; 3]) -> Self {
        Listener {
            position,
            forward: [0.0, 0.0, -1.0],
            up: [0.0, 1.0, 0.0],
        }
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener::new([0.0, 0.0, 0.0])
    }
}
