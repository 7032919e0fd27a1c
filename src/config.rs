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
use std::{collections::HashMap, fs, path::Path, str::FromStr, time::Duration};

use duration_string::DurationString;
use serde::Deserialize;

use crate::format::{FormatError, OutputFormat, SpeakerLayout};

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_LAYOUT: SpeakerLayout = SpeakerLayout::Stereo;
const DEFAULT_BUFFER: Duration = Duration::from_millis(100);

/// Errors that can occur while loading a mixer configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid YAML.
    #[error("Unable to parse configuration: {0}")]
    Parse(#[from] serde_yml::Error),
}

/// A YAML representation of the mixer configuration.
#[derive(Deserialize, Clone)]
pub struct MixerConfig {
    /// The output device. Uses the system default output when unset.
    device: Option<String>,

    /// Output sample rate in Hz (default: 44100).
    sample_rate: Option<u32>,

    /// Speaker layout: "mono", "stereo", "quad" or "5.1" (default: "stereo").
    layout: Option<String>,

    /// Whether mixing resamples with linear interpolation (default: true).
    interpolation: Option<bool>,

    /// How much audio one output fragment covers, e.g. "100ms".
    buffer: Option<String>,

    /// Initial master gain per sound type, 0.0 through 1.0.
    master_gains: Option<HashMap<String, f32>>,
}

impl MixerConfig {
    /// New will create a new MixerConfig with every field defaulted.
    pub fn new() -> MixerConfig {
        MixerConfig {
            device: None,
            sample_rate: None,
            layout: None,
            interpolation: None,
            buffer: None,
            master_gains: None,
        }
    }

    /// Reads a mixer configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<MixerConfig, ConfigError> {
        Ok(serde_yml::from_str(&fs::read_to_string(path)?)?)
    }

    /// Returns the device from the configuration, if one was set.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Returns the output sample rate (default: 44100).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the speaker layout (default: stereo).
    pub fn layout(&self) -> Result<SpeakerLayout, FormatError> {
        match self.layout.as_deref() {
            Some(layout) => SpeakerLayout::from_str(layout),
            None => Ok(DEFAULT_LAYOUT),
        }
    }

    /// Returns whether resampling interpolation is enabled (default: true).
    pub fn interpolation(&self) -> bool {
        self.interpolation.unwrap_or(true)
    }

    /// Returns the output fragment length (default: 100ms).
    pub fn buffer(&self) -> Result<Duration, FormatError> {
        match &self.buffer {
            Some(buffer) => Ok(DurationString::from_string(buffer.clone())
                .map_err(|e| FormatError::InvalidDuration(e.to_string()))?
                .into()),
            None => Ok(DEFAULT_BUFFER),
        }
    }

    /// Returns the output format described by this configuration.
    pub fn to_format(&self) -> Result<OutputFormat, FormatError> {
        OutputFormat::new(
            self.sample_rate(),
            self.layout()?,
            self.interpolation(),
            self.buffer()?,
        )
    }

    /// Returns the initial master gains per sound type.
    pub fn master_gains(&self) -> HashMap<String, f32> {
        self.master_gains.clone().unwrap_or_default()
    }
}

impl Default for MixerConfig {
    fn default() -> MixerConfig {
        MixerConfig::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MixerConfig::new();
        assert_eq!(config.device(), None);
        assert_eq!(config.sample_rate(), 44100);
        assert_eq!(config.layout().expect("layout"), SpeakerLayout::Stereo);
        assert!(config.interpolation());
        assert_eq!(config.buffer().expect("buffer"), Duration::from_millis(100));
        assert!(config.master_gains().is_empty());

        let format = config.to_format().expect("format");
        assert_eq!(format, OutputFormat::default());
    }

    #[test]
    fn test_parse_yaml() {
        let config: MixerConfig = serde_yml::from_str(
            r#"
            device: "Scarlett 2i2"
            sample_rate: 48000
            layout: "5.1"
            interpolation: false
            buffer: 50ms
            master_gains:
              music: 0.8
              sfx: 0.5
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.device(), Some("Scarlett 2i2"));
        assert_eq!(config.sample_rate(), 48000);
        assert_eq!(config.layout().expect("layout"), SpeakerLayout::Surround51);
        assert!(!config.interpolation());
        assert_eq!(config.buffer().expect("buffer"), Duration::from_millis(50));

        let gains = config.master_gains();
        assert_eq!(gains.get("music"), Some(&0.8));
        assert_eq!(gains.get("sfx"), Some(&0.5));

        let format = config.to_format().expect("format");
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.layout, SpeakerLayout::Surround51);
        assert_eq!(format.buffer, Duration::from_millis(50));
        assert!(!format.interpolation);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: MixerConfig =
            serde_yml::from_str("sample_rate: 22050").expect("config should parse");
        assert_eq!(config.sample_rate(), 22050);
        assert_eq!(config.layout().expect("layout"), SpeakerLayout::Stereo);
        assert_eq!(config.buffer().expect("buffer"), Duration::from_millis(100));
    }

    #[test]
    fn test_bad_duration() {
        let config: MixerConfig = serde_yml::from_str("buffer: wat").expect("config should parse");
        assert!(matches!(
            config.buffer(),
            Err(FormatError::InvalidDuration(_))
        ));
        assert!(config.to_format().is_err());
    }

    #[test]
    fn test_bad_layout() {
        let config: MixerConfig =
            serde_yml::from_str("layout: \"7.1\"").expect("config should parse");
        assert_eq!(
            config.layout(),
            Err(FormatError::UnknownLayout("7.1".to_string()))
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mixer.yaml");
        std::fs::write(&path, "sample_rate: 96000\nlayout: quad\n").expect("write config");

        let config = MixerConfig::from_file(&path).expect("config should load");
        assert_eq!(config.sample_rate(), 96000);
        assert_eq!(config.layout().expect("layout"), SpeakerLayout::Quad);

        assert!(MixerConfig::from_file(&dir.path().join("missing.yaml")).is_err());
    }
}
