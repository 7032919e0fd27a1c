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
use std::{fmt, sync::Arc};

use parking_lot::Mutex;

use super::{DeviceError, OutputCallback, OutputStream};
use crate::format::OutputFormat;

/// An open mock stream: the render callback plus the channel count it was
/// opened with.
struct Open {
    callback: OutputCallback,
    channels: usize,
}

struct Inner {
    /// One stream at a time. Dropping a stale stream handle clears whatever is
    /// open, so the old stream must be closed before a new one is opened.
    open: Mutex<Option<Open>>,
    /// Every sample ever pumped through the callback, for test inspection.
    #[cfg(test)]
    captured: Mutex<Vec<i16>>,
}

/// A mock device. Doesn't actually play anything; the host drives the render
/// callback by calling pump.
#[derive(Clone)]
pub struct Device {
    name: String,
    inner: Arc<Inner>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            inner: Arc::new(Inner {
                open: Mutex::new(None),
                #[cfg(test)]
                captured: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns true if an output stream is currently open on this device.
    pub fn is_open(&self) -> bool {
        self.inner.open.lock().is_some()
    }

    /// Renders the given number of frames through the open stream's callback
    /// and returns the interleaved samples. Returns an empty vector if no
    /// stream is open.
    pub fn pump(&self, frames: usize) -> Vec<i16> {
        let mut open = self.inner.open.lock();
        let Some(open) = open.as_mut() else {
            return Vec::new();
        };
        let mut buffer = vec![0i16; frames * open.channels];
        (open.callback)(&mut buffer);
        #[cfg(test)]
        self.inner.captured.lock().extend_from_slice(&buffer);
        buffer
    }

    /// Returns a copy of every sample pumped so far.
    #[cfg(test)]
    pub fn captured(&self) -> Vec<i16> {
        self.inner.captured.lock().clone()
    }
}

impl super::Device for Device {
    fn open_output(
        &self,
        format: &OutputFormat,
        callback: OutputCallback,
    ) -> Result<Box<dyn OutputStream>, DeviceError> {
        *self.inner.open.lock() = Some(Open {
            callback,
            channels: format.channels(),
        });
        Ok(Box::new(Stream {
            inner: self.inner.clone(),
        }))
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, DeviceError> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

struct Stream {
    inner: Arc<Inner>,
}

impl OutputStream for Stream {}

impl Drop for Stream {
    fn drop(&mut self) {
        *self.inner.open.lock() = None;
    }
}
