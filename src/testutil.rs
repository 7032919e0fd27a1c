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

#[cfg(test)]
use std::{
    io::Cursor,
    thread,
    time::{Duration, SystemTime},
};

#[cfg(test)]
use hound::{SampleFormat, WavSpec, WavWriter};

#[cfg(test)]
use crate::decoder::Decoder;

/// Produces a ramp of bytes (0, 1, 2, ... wrapping) as 8-bit mono PCM,
/// optionally capped at a total length. The predictable payload makes mixed
/// output easy to assert against.
#[cfg(test)]
pub struct RampDecoder {
    next: u8,
    produced: usize,
    frequency: u32,
    limit: Option<usize>,
    seekable: bool,
}

#[cfg(test)]
impl RampDecoder {
    /// A decoder that runs dry after `limit` bytes.
    pub fn new(frequency: u32, limit: usize) -> RampDecoder {
        RampDecoder {
            next: 0,
            produced: 0,
            frequency,
            limit: Some(limit),
            seekable: false,
        }
    }

    /// A decoder that never runs dry.
    pub fn endless(frequency: u32) -> RampDecoder {
        RampDecoder {
            next: 0,
            produced: 0,
            frequency,
            limit: None,
            seekable: false,
        }
    }

    /// Makes the decoder honor seek requests.
    pub fn seekable(mut self) -> RampDecoder {
        self.seekable = true;
        self
    }
}

#[cfg(test)]
impl Decoder for RampDecoder {
    fn read(&mut self, buffer: &mut [u8]) -> usize {
        let available = match self.limit {
            Some(limit) => limit.saturating_sub(self.produced).min(buffer.len()),
            None => buffer.len(),
        };
        for slot in buffer[..available].iter_mut() {
            *slot = self.next;
            self.next = self.next.wrapping_add(1);
        }
        self.produced += available;
        available
    }

    fn frequency(&self) -> u32 {
        self.frequency
    }

    fn sample_size(&self) -> u32 {
        1
    }

    fn is_stereo(&self) -> bool {
        false
    }

    fn seek(&mut self, frame: u64) -> bool {
        if !self.seekable {
            return false;
        }
        self.next = frame as u8;
        self.produced = frame as usize;
        true
    }
}

/// Renders 16-bit mono samples into an in-memory WAV payload.
#[cfg(test)]
pub fn wav_payload_mono16(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let mut payload = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(
        &mut payload,
        WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )
    .expect("wav writer");
    for sample in samples {
        writer.write_sample(*sample).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
    payload.into_inner()
}

/// Wait for the given predicate to return true or fail.
#[inline]
#[cfg(test)]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}
