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
use std::{fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, warn};

use super::{thread_priority, DeviceError, OutputCallback, OutputStream};
use crate::format::OutputFormat;

/// A small wrapper around a cpal::Device. Used for storing some extra
/// data that makes device selection more convenient.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of output channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn super::Device>>, DeviceError> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn super::Device> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices.
    fn list_cpal_devices() -> Result<Vec<Device>, DeviceError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };

                let mut max_channels = 0;
                for output_config in output_configs {
                    if max_channels < output_config.channels() {
                        max_channels = output_config.channels();
                    }
                }

                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the given cpal device, or the default output device if no name is
    /// given.
    pub fn get(name: Option<&str>) -> Result<Device, DeviceError> {
        match name {
            Some(name) => Device::list_cpal_devices()?
                .into_iter()
                .find(|device| device.name.trim() == name)
                .ok_or_else(|| DeviceError::NotFound(name.to_string())),
            None => {
                // Suppress noisy output here.
                let _shh_stdout = shh::stdout()?;
                let _shh_stderr = shh::stderr()?;

                let host = cpal::default_host();
                let device = host
                    .default_output_device()
                    .ok_or_else(|| DeviceError::NotFound("default output".to_string()))?;

                let name = device.name()?;
                let mut max_channels = 0;
                for output_config in device.supported_output_configs()? {
                    if max_channels < output_config.channels() {
                        max_channels = output_config.channels();
                    }
                }

                Ok(Device {
                    name,
                    max_channels,
                    host_id: host.id(),
                    device,
                })
            }
        }
    }
}

impl super::Device for Device {
    /// Opens an output stream on this device. The stream is created on its own
    /// thread because cpal streams cannot move between threads, and the thread
    /// reports the outcome back before this returns.
    fn open_output(
        &self,
        format: &OutputFormat,
        callback: OutputCallback,
    ) -> Result<Box<dyn OutputStream>, DeviceError> {
        let needed = format.channels();
        if (self.max_channels as usize) < needed {
            return Err(DeviceError::Channels {
                needed,
                device: self.name.clone(),
                available: self.max_channels,
            });
        }

        let config = cpal::StreamConfig {
            channels: needed as u16,
            sample_rate: format.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(format.fragment_frames() as u32),
        };
        let sample_format = self.device.default_output_config()?.sample_format();
        if sample_format != cpal::SampleFormat::I16 {
            warn!(
                format = ?sample_format,
                device = self.name,
                "Device native sample format is not i16, converting."
            );
        }

        let device = self.device.clone();
        let mut render = promote_and_render(callback);
        let (result_tx, result_rx) = crossbeam_channel::bounded::<Result<(), DeviceError>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let thread = thread::spawn(move || {
            let stream_result: Result<cpal::Stream, DeviceError> = match sample_format {
                cpal::SampleFormat::I16 => device
                    .build_output_stream(
                        &config,
                        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| render(data),
                        |err| error!("Output stream error: {}", err),
                        None,
                    )
                    .map_err(DeviceError::from),
                cpal::SampleFormat::F32 => {
                    build_converting_stream::<f32>(&device, &config, render)
                }
                cpal::SampleFormat::I32 => {
                    build_converting_stream::<i32>(&device, &config, render)
                }
                cpal::SampleFormat::U16 => {
                    build_converting_stream::<u16>(&device, &config, render)
                }
                other => Err(DeviceError::UnsupportedSampleFormat(format!("{:?}", other))),
            };

            let stream = match stream_result {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = result_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = result_tx.send(Err(e.into()));
                return;
            }
            let _ = result_tx.send(Ok(()));

            // Keep the stream alive until the handle is dropped.
            let _ = shutdown_rx.recv();
        });

        match result_rx.recv() {
            Ok(Ok(())) => {
                info!(device = self.name, "Output stream started.");
                Ok(Box::new(Output {
                    shutdown_tx,
                    thread: Some(thread),
                }))
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(DeviceError::ThreadExited)
            }
        }
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<std::sync::Arc<super::mock::Device>, DeviceError> {
        Err(DeviceError::NotMock)
    }
}

/// Wraps the render callback so the first invocation promotes the cpal
/// callback thread. The environment is read here, outside the hot path.
fn promote_and_render(mut callback: OutputCallback) -> impl FnMut(&mut [i16]) + Send + 'static {
    let priority = thread_priority::callback_thread_priority();
    let rt_audio = thread_priority::rt_audio_enabled();
    let mut priority_set = false;
    move |data: &mut [i16]| {
        thread_priority::configure_audio_thread_priority(priority, rt_audio, &mut priority_set);
        callback(data);
    }
}

/// Builds an output stream for devices whose native sample type is not i16.
/// Rendering happens in a staging buffer which is then converted per sample.
fn build_converting_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut render: impl FnMut(&mut [i16]) + Send + 'static,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let mut staging: Vec<i16> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                staging.resize(data.len(), 0);
                render(&mut staging);
                for (dst, &src) in data.iter_mut().zip(staging.iter()) {
                    *dst = T::from_sample(src);
                }
            },
            |err| error!("Output stream error: {}", err),
            None,
        )
        .map_err(DeviceError::from)
}

/// A running output stream. Dropping it stops the callback thread and closes
/// the underlying cpal stream.
struct Output {
    shutdown_tx: crossbeam_channel::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl OutputStream for Output {}

impl Drop for Output {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
