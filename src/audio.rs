//! WAV and raster file helpers.
//!
//! Writers stage into a temp file next to the target and rename on success, so
//! an interrupted write never leaves a file that a later skip-if-exists check
//! would accept.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tempfile::NamedTempFile;

use crate::api::PcmAudio;
use crate::error::{Error, Result};

pub const MUSIC_SAMPLE_RATE: u32 = 48_000;
pub const MUSIC_CHANNELS: u16 = 2;

pub fn pcm16_spec(sample_rate: u32, channels: u16) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Playback length of a WAV file in seconds.
pub fn wav_duration(path: &Path) -> Result<f64> {
    let reader = WavReader::open(path).map_err(|e| Error::MissingAsset {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(Error::MissingAsset {
            path: path.to_path_buf(),
            reason: "sample rate is zero".into(),
        });
    }
    Ok(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

pub fn write_pcm_wav(path: &Path, audio: &PcmAudio) -> Result<()> {
    let staged = staging_file(path)?;
    {
        let mut writer = WavWriter::new(
            BufWriter::new(staged.as_file()),
            pcm16_spec(audio.sample_rate, audio.channels),
        )?;
        for sample in &audio.samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
    }
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut staged = staging_file(path)?;
    staged.write_all(bytes)?;
    staged.flush()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Incremental writer for streamed stereo music.
pub struct MusicWriter {
    inner: WavWriter<BufWriter<File>>,
    pending: Option<u8>,
    samples: u64,
}

impl MusicWriter {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            inner: WavWriter::create(path, pcm16_spec(MUSIC_SAMPLE_RATE, MUSIC_CHANNELS))?,
            pending: None,
            samples: 0,
        })
    }

    /// Appends little-endian 16-bit bytes. A chunk may split a sample; the odd
    /// byte waits for the next chunk.
    pub fn write_bytes(&mut self, mut bytes: &[u8]) -> Result<()> {
        if let Some(low) = self.pending.take() {
            match bytes.split_first() {
                Some((high, rest)) => {
                    self.push(i16::from_le_bytes([low, *high]))?;
                    bytes = rest;
                }
                None => {
                    self.pending = Some(low);
                    return Ok(());
                }
            }
        }
        let mut pairs = bytes.chunks_exact(2);
        for pair in &mut pairs {
            self.push(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        self.pending = pairs.remainder().first().copied();
        Ok(())
    }

    /// Pads the last frame with silence if the stream stopped mid-frame.
    pub fn finalize(mut self) -> Result<()> {
        while self.samples % u64::from(MUSIC_CHANNELS) != 0 {
            self.push(0)?;
        }
        self.inner.finalize()?;
        Ok(())
    }

    fn push(&mut self, sample: i16) -> Result<()> {
        self.inner.write_sample(sample)?;
        self.samples += 1;
        Ok(())
    }
}

/// Bytes per second of the music stream.
pub fn music_byte_rate() -> usize {
    MUSIC_SAMPLE_RATE as usize * usize::from(MUSIC_CHANNELS) * 2
}

fn staging_file(target: &Path) -> Result<NamedTempFile> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    Ok(NamedTempFile::new_in(dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn written_speech_reports_its_duration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intro_audio.wav");
        let audio = PcmAudio {
            samples: vec![0; 36_000],
            sample_rate: 24_000,
            channels: 1,
        };
        write_pcm_wav(&path, &audio).unwrap();
        assert!((wav_duration(&path).unwrap() - 1.5).abs() < 1e-9);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_or_garbage_audio_is_a_missing_asset() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("word_0.wav");
        assert!(matches!(wav_duration(&missing), Err(Error::MissingAsset { .. })));

        let garbage = dir.path().join("word_1.wav");
        std::fs::write(&garbage, b"not a wav").unwrap();
        assert!(matches!(wav_duration(&garbage), Err(Error::MissingAsset { .. })));
    }

    #[test]
    fn music_writer_handles_samples_split_across_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("music.wav");
        let mut writer = MusicWriter::create(&path).unwrap();
        writer.write_bytes(&[1, 0, 2]).unwrap();
        writer.write_bytes(&[0, 3]).unwrap();
        writer.write_bytes(&[0]).unwrap();
        writer.finalize().unwrap();

        let samples: Vec<i16> = WavReader::open(&path)
            .unwrap()
            .into_samples::<i16>()
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(samples, vec![1, 2, 3, 0]);
    }
}
