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

//! The mixer.
//!
//! A [`Mixer`] owns the source registry and the output device. Sources are
//! created through [`Mixer::create_source`] and mixed into the device's
//! callback buffer while a device is open; without one, [`Mixer::update`]
//! advances playback headlessly so positions and finished events behave the
//! same on machines with no audio hardware.
//!
//! Lock order is always registry first, then one source at a time. No path
//! takes them the other way around.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::MixerConfig;
use crate::device::{self, Device, DeviceError, OutputCallback, OutputStream};
use crate::format::OutputFormat;
use crate::listener::Listener;
use crate::source::{SoundSource, SourceCore};

/// Reserved sound type whose master gain scales every other type.
pub const MASTER_SOUND_TYPE: &str = "Master";

/// Sound type newly created sources start out with.
pub const DEFAULT_SOUND_TYPE: &str = "sfx";

/// Global atomic counter for generating unique source IDs.
static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Raised once per playback when a source reaches its natural end or is
/// stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinishedEvent {
    /// The ID of the source whose playback finished.
    pub source_id: u64,
}

/// The audio mixer. Cloning is cheap and every clone drives the same engine.
#[derive(Clone)]
pub struct Mixer {
    inner: Arc<MixerInner>,
}

struct MixerInner {
    /// Registered sources and global playback state.
    registry: Mutex<Registry>,
    /// The open output stream, if any. Never locked while holding the
    /// registry; a stream teardown can block on an in-flight callback.
    output: Mutex<Option<Box<dyn OutputStream>>>,
    /// Finished events, published by the update pass.
    finished_tx: Sender<FinishedEvent>,
    finished_rx: Receiver<FinishedEvent>,
}

struct Registry {
    sources: Vec<RegisteredSource>,
    /// Master gain per sound type. The reserved type scales all others.
    master_gains: HashMap<String, f32>,
    /// Sound types that are hard-paused.
    paused: HashSet<String>,
    listener: Option<Listener>,
    time_scale: f32,
    format: OutputFormat,
    /// An output stream is currently open.
    device_open: bool,
    /// Mix passes produce audio. Cleared by [`Mixer::stop_output`].
    running: bool,
    /// Accumulation buffer reused across render passes.
    scratch: Vec<i32>,
}

struct RegisteredSource {
    id: u64,
    core: Arc<Mutex<SourceCore>>,
}

impl Registry {
    /// The combined master gain for a sound type: the reserved global gain
    /// alone for the reserved type itself, otherwise global times specific,
    /// with unknown types defaulting to 1.
    fn effective_gain(&self, sound_type: &str) -> f32 {
        let master = self
            .master_gains
            .get(MASTER_SOUND_TYPE)
            .copied()
            .unwrap_or(1.0);
        if sound_type == MASTER_SOUND_TYPE {
            return master;
        }
        master * self.master_gains.get(sound_type).copied().unwrap_or(1.0)
    }

    /// Pushes the current combined gain into every registered source.
    fn refresh_master_gains(&self) {
        for source in &self.sources {
            let mut core = source.core.lock();
            let master_gain = self.effective_gain(&core.sound_type);
            core.master_gain = master_gain;
        }
    }
}

impl Mixer {
    pub fn new() -> Mixer {
        let (finished_tx, finished_rx) = crossbeam_channel::unbounded();
        Mixer {
            inner: Arc::new(MixerInner {
                registry: Mutex::new(Registry {
                    sources: Vec::new(),
                    master_gains: HashMap::new(),
                    paused: HashSet::new(),
                    listener: None,
                    time_scale: 1.0,
                    format: OutputFormat::default(),
                    device_open: false,
                    running: true,
                    scratch: Vec::new(),
                }),
                output: Mutex::new(None),
                finished_tx,
                finished_rx,
            }),
        }
    }

    /// Creates and registers a new sound source. The handle deregisters
    /// itself when dropped.
    pub fn create_source(&self) -> SoundSource {
        let id = NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.inner.registry.lock();
        let master_gain = registry.effective_gain(DEFAULT_SOUND_TYPE);
        let core = Arc::new(Mutex::new(SourceCore::new(id, DEFAULT_SOUND_TYPE, master_gain)));
        registry.sources.push(RegisteredSource {
            id,
            core: core.clone(),
        });
        drop(registry);

        debug!(id, "Registered source.");
        SoundSource::new(id, core, self.clone())
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.inner
            .registry
            .lock()
            .sources
            .retain(|source| source.id != id);
        debug!(id, "Deregistered source.");
    }

    /// Retags a source and refreshes its cached master gain for the new type.
    pub(crate) fn assign_sound_type(&self, core: &Arc<Mutex<SourceCore>>, sound_type: &str) {
        let registry = self.inner.registry.lock();
        let master_gain = registry.effective_gain(sound_type);
        let mut core = core.lock();
        core.sound_type = sound_type.to_string();
        core.master_gain = master_gain;
    }

    /// Sets the master gain for a sound type, clamped to `[0, 1]`, and
    /// immediately pushes the new combined gain to every registered source.
    /// The reserved type [`MASTER_SOUND_TYPE`] scales all types at once.
    pub fn set_master_gain(&self, sound_type: &str, gain: f32) {
        let mut registry = self.inner.registry.lock();
        registry
            .master_gains
            .insert(sound_type.to_string(), gain.clamp(0.0, 1.0));
        registry.refresh_master_gains();
    }

    /// Returns the stored master gain for a sound type, 1 when unset.
    pub fn master_gain(&self, sound_type: &str) -> f32 {
        self.inner
            .registry
            .lock()
            .master_gains
            .get(sound_type)
            .copied()
            .unwrap_or(1.0)
    }

    /// Returns the combined gain applied to sources of the given type.
    pub fn effective_gain(&self, sound_type: &str) -> f32 {
        self.inner.registry.lock().effective_gain(sound_type)
    }

    /// Hard-pauses every source of the given type: their cursors stop
    /// advancing until the type is resumed.
    pub fn pause_type(&self, sound_type: &str) {
        self.inner
            .registry
            .lock()
            .paused
            .insert(sound_type.to_string());
    }

    pub fn resume_type(&self, sound_type: &str) {
        self.inner.registry.lock().paused.remove(sound_type);
    }

    pub fn resume_all(&self) {
        self.inner.registry.lock().paused.clear();
    }

    pub fn is_paused(&self, sound_type: &str) -> bool {
        self.inner.registry.lock().paused.contains(sound_type)
    }

    /// Scales the effective frequency of every source that does not opt out
    /// with `set_ignore_time_scale`. Zero freezes them in place.
    pub fn set_time_scale(&self, time_scale: f32) {
        self.inner.registry.lock().time_scale = time_scale.max(0.0);
    }

    pub fn time_scale(&self) -> f32 {
        self.inner.registry.lock().time_scale
    }

    /// Stores the listener pose for spatialization bookkeeping. Attenuation
    /// derived from it is applied per source through `set_attenuation`.
    pub fn set_listener(&self, listener: Listener) {
        self.inner.registry.lock().listener = Some(listener);
    }

    pub fn listener(&self) -> Option<Listener> {
        self.inner.registry.lock().listener
    }

    /// Returns the output format the mixer currently mixes for.
    pub fn format(&self) -> OutputFormat {
        self.inner.registry.lock().format.clone()
    }

    /// True once an output device has been opened by [`Mixer::configure`].
    pub fn is_initialized(&self) -> bool {
        self.inner.registry.lock().device_open
    }

    pub fn source_count(&self) -> usize {
        self.inner.registry.lock().sources.len()
    }

    /// Returns a receiver of finished events. Events are published by the
    /// update pass, never from the audio callback.
    pub fn finished_events(&self) -> Receiver<FinishedEvent> {
        self.inner.finished_rx.clone()
    }

    /// Opens the configured output device and starts mixing into it. Any
    /// previously open stream is closed first. On error the mixer stays
    /// un-initialized and playback keeps tracking headlessly.
    pub fn configure(&self, config: &MixerConfig) -> Result<(), DeviceError> {
        let device = device::get_device(config.device())?;
        self.configure_with_device(config, device)
    }

    /// Like [`Mixer::configure`], but with a caller-supplied device.
    pub fn configure_with_device(
        &self,
        config: &MixerConfig,
        device: Arc<dyn Device>,
    ) -> Result<(), DeviceError> {
        let format = config.to_format()?;

        // The previous stream must be fully closed before the device hands
        // out a new one.
        *self.inner.output.lock() = None;

        {
            let mut registry = self.inner.registry.lock();
            registry.format = format.clone();
            registry.device_open = false;
            for (sound_type, gain) in config.master_gains() {
                registry
                    .master_gains
                    .insert(sound_type, gain.clamp(0.0, 1.0));
            }
            registry.refresh_master_gains();
        }

        let weak = Arc::downgrade(&self.inner);
        let callback: OutputCallback = Box::new(move |buffer: &mut [i16]| match weak.upgrade() {
            Some(inner) => inner.render(buffer),
            None => buffer.fill(0),
        });
        let stream = device.open_output(&format, callback)?;

        {
            let mut registry = self.inner.registry.lock();
            registry.device_open = true;
            registry.running = true;
        }
        *self.inner.output.lock() = Some(stream);

        info!(
            device = %device,
            sample_rate = format.sample_rate,
            layout = %format.layout,
            "Configured output device."
        );
        Ok(())
    }

    /// Resumes mix passes after [`Mixer::stop_output`]. Runs one
    /// zero-timestep update first so positions are current before audio is
    /// heard.
    pub fn start(&self) {
        self.update(0.0);
        self.inner.registry.lock().running = true;
        info!("Output started.");
    }

    /// Halts mix passes. The device stream stays open and renders silence.
    pub fn stop_output(&self) {
        self.inner.registry.lock().running = false;
        info!("Output stopped.");
    }

    /// Closes the output stream. Playback keeps tracking headlessly through
    /// [`Mixer::update`].
    pub fn close_output(&self) {
        *self.inner.output.lock() = None;
        self.inner.registry.lock().device_open = false;
        info!("Output device closed.");
    }

    /// Mixes every playing source into an interleaved i16 buffer laid out
    /// for the current format. This is what the device callback drives; it
    /// is public so headless hosts can pull rendered audio themselves.
    pub fn render(&self, dest: &mut [i16]) {
        self.inner.render(dest);
    }

    /// The once-per-tick game-thread pass. Publishes pending finished
    /// events, deregisters auto-remove sources, and, when no device is open,
    /// advances playback by `time_step` seconds of output. Pass zero when
    /// driving [`Mixer::render`] by hand.
    pub fn update(&self, time_step: f32) {
        let mut finished: Vec<FinishedEvent> = Vec::new();
        {
            let mut registry = self.inner.registry.lock();
            let registry = &mut *registry;
            let samples = if registry.device_open || !registry.running {
                0
            } else {
                (time_step.max(0.0) * registry.format.sample_rate as f32).round() as usize
            };
            let format = &registry.format;
            let paused = &registry.paused;
            let time_scale = registry.time_scale;
            registry.sources.retain(|source| {
                let mut core = source.core.lock();
                if samples > 0 && !paused.contains(&core.sound_type) {
                    core.advance(samples, format, time_scale);
                }
                if core.take_finished() {
                    finished.push(FinishedEvent { source_id: core.id });
                    return !core.auto_remove;
                }
                true
            });
        }

        // Published outside the lock; receivers may call straight back in.
        for event in finished {
            let _ = self.inner.finished_tx.send(event);
        }
    }
}

impl MixerInner {
    fn render(&self, dest: &mut [i16]) {
        dest.fill(0);
        let mut registry = self.registry.lock();
        if !registry.running {
            return;
        }
        let registry = &mut *registry;
        registry.scratch.clear();
        registry.scratch.resize(dest.len(), 0);
        let time_scale = registry.time_scale;

        // Reverse registration order, newest first.
        for source in registry.sources.iter().rev() {
            let mut core = source.core.lock();
            if registry.paused.contains(&core.sound_type) {
                continue;
            }
            core.mix(&mut registry.scratch, &registry.format, time_scale);
        }

        for (out, sum) in dest.iter_mut().zip(registry.scratch.iter()) {
            *out = (*sum).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        }
    }
}

impl Drop for MixerInner {
    fn drop(&mut self) {
        // The last mixer handle can die on the audio callback thread, and
        // dropping a stream there would join the thread running us. A
        // detached thread tears the stream down instead.
        if let Some(stream) = self.output.lock().take() {
            std::thread::spawn(move || drop(stream));
        }
    }
}

impl Default for Mixer {
    fn default() -> Mixer {
        Mixer::new()
    }
}

impl fmt::Debug for Mixer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.lock();
        f.debug_struct("Mixer")
            .field("sources", &registry.sources.len())
            .field("device_open", &registry.device_open)
            .field("running", &registry.running)
            .field("time_scale", &registry.time_scale)
            .finish()
    }
}
