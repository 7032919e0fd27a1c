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

use std::{any::Any, fmt, io, sync::Arc};

use crate::format::{FormatError, OutputFormat};

pub mod cpal;
pub mod mock;
mod thread_priority;

/// Errors that can occur while enumerating or opening audio devices.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// No device with the requested name exists.
    #[error("No device found with name {0}")]
    NotFound(String),

    /// IO error while querying the backend.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The backend has no host available.
    #[error("Audio host error: {0}")]
    Host(#[from] ::cpal::HostUnavailable),

    /// The backend could not enumerate its devices.
    #[error("Device enumeration error: {0}")]
    Devices(#[from] ::cpal::DevicesError),

    /// The backend could not report a device name.
    #[error("Device name error: {0}")]
    Name(#[from] ::cpal::DeviceNameError),

    /// The device could not report its supported configurations.
    #[error("Stream configuration error: {0}")]
    Configs(#[from] ::cpal::SupportedStreamConfigsError),

    /// The device could not report its default configuration.
    #[error("Default configuration error: {0}")]
    DefaultConfig(#[from] ::cpal::DefaultStreamConfigError),

    /// The device rejected the requested stream.
    #[error("Stream build error: {0}")]
    BuildStream(#[from] ::cpal::BuildStreamError),

    /// The stream could not be started.
    #[error("Stream play error: {0}")]
    PlayStream(#[from] ::cpal::PlayStreamError),

    /// The device renders a sample format the mixer cannot produce.
    #[error("Unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    /// The device has fewer output channels than the layout needs.
    #[error("{needed} channels needed, audio device {device} only has {available}")]
    Channels {
        needed: usize,
        device: String,
        available: u16,
    },

    /// The output format itself is invalid.
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// The output thread stopped before reporting a result.
    #[error("Output thread exited unexpectedly")]
    ThreadExited,

    /// The device is not a mock device.
    #[error("Not a mock device")]
    NotMock,
}

/// Fills one hardware fragment with interleaved signed 16-bit samples. Runs
/// on the device's playback thread.
pub type OutputCallback = Box<dyn FnMut(&mut [i16]) + Send + 'static>;

/// A running output stream. Dropping it closes the device.
pub trait OutputStream: Send {}

pub trait Device: Any + fmt::Display + Send + Sync {
    /// Opens a continuous output stream in the given format. The callback is
    /// invoked from the device's playback thread for every fragment.
    fn open_output(
        &self,
        format: &OutputFormat,
        callback: OutputCallback,
    ) -> Result<Box<dyn OutputStream>, DeviceError>;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, DeviceError>;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, DeviceError> {
    cpal::Device::list()
}

/// Gets a device with the given name. Names starting with "mock" produce a
/// mock device; no name selects the system default output.
pub fn get_device(name: Option<&str>) -> Result<Arc<dyn Device>, DeviceError> {
    if let Some(name) = name {
        if name.starts_with("mock") {
            return Ok(Arc::new(mock::Device::get(name)));
        }
    }

    Ok(Arc::new(cpal::Device::get(name)?))
}
