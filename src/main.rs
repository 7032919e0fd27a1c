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
use clap::{crate_version, Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use softmix::config::MixerConfig;
use softmix::device;
use softmix::mixer::Mixer;
use softmix::Clip;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A software audio mixer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays an audio file through an output device.
    Play {
        /// The path to the audio file to play.
        file: String,
        /// The device name to play through.
        #[arg[short, long]]
        device: Option<String>,
        /// The path to a mixer configuration.
        #[arg[short, long]]
        config: Option<String>,
    },
    /// Verifies a mixer configuration and prints the resolved settings.
    Config {
        /// The path to the mixer configuration.
        path: String,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = device::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            file,
            device: device_name,
            config,
        } => {
            let config = match config {
                Some(path) => MixerConfig::from_file(&PathBuf::from(path))?,
                None => MixerConfig::new(),
            };

            let mixer = Mixer::new();
            match device_name {
                Some(name) => {
                    let device = device::get_device(Some(name.as_str()))?;
                    mixer.configure_with_device(&config, device)?;
                }
                None => mixer.configure(&config)?,
            }

            let clip = Arc::new(Clip::from_file(&file)?);
            let source = mixer.create_source();
            if !source.play(clip) {
                return Err(format!("unable to play {}", file).into());
            }

            println!("Playing {}...", file);
            let events = mixer.finished_events();
            while events.try_recv().is_err() {
                mixer.update(0.0);
                thread::sleep(Duration::from_millis(10));
            }
        }
        Commands::Config { path } => {
            let config = MixerConfig::from_file(&PathBuf::from(&path))?;
            let format = config.to_format()?;

            println!("Configuration:");
            println!("- Device: {}", config.device().unwrap_or("default"));
            println!("- Sample rate: {}", format.sample_rate);
            println!("- Layout: {}", format.layout);
            println!("- Interpolation: {}", format.interpolation);
            println!("- Buffer: {:?}", format.buffer);

            let gains = config.master_gains();
            if !gains.is_empty() {
                // Sort the types so that the output is consistent.
                let mut types: Vec<String> = gains.keys().cloned().collect();
                types.sort();

                println!("\nMaster gains:");
                for sound_type in types.iter() {
                    println!("- {}: {}", sound_type, gains[sound_type]);
                }
            }
        }
    }

    Ok(())
}
