//! Where narration audio and illustrations end up.

use anyhow::{Context, Result};
use quiz_core::collaborators::{Audio, AudioSink};
use quiz_core::history::Illustration;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

/// Writes each narration clip to its own WAV file.
///
/// Files are written on a dedicated thread so `play` never waits on the disk.
/// Dropping the sink waits for clips already handed over.
pub struct WavFileSink {
    clips: Option<mpsc::Sender<Audio>>,
    writer: Option<thread::JoinHandle<()>>,
}

impl WavFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        let (clips, rx) = mpsc::channel::<Audio>();
        let writer = thread::Builder::new()
            .name("wav-writer".to_string())
            .spawn(move || {
                for (clip, audio) in (1u64..).zip(rx) {
                    match write_clip(&dir, clip, &audio) {
                        Ok(path) => tracing::info!("Narration written to {}", path.display()),
                        Err(e) => tracing::warn!("Failed to write narration: {:?}", e),
                    }
                }
            })
            .context("Failed to spawn WAV writer thread")?;
        Ok(Self {
            clips: Some(clips),
            writer: Some(writer),
        })
    }
}

fn write_clip(dir: &Path, clip: u64, audio: &Audio) -> Result<PathBuf> {
    let path = dir.join(format!("narration-{clip:03}.wav"));
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for chunk in audio.pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
    }
    writer.finalize()?;
    Ok(path)
}

impl AudioSink for WavFileSink {
    fn play(&self, audio: Audio) {
        let Some(clips) = &self.clips else {
            return;
        };
        if let Err(e) = clips.send(audio) {
            tracing::warn!(
                "WAV writer is gone, dropping {} bytes of narration",
                e.0.pcm.len()
            );
        }
    }

    fn stop(&self) {}
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        // Closing the channel ends the writer loop.
        self.clips.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                tracing::warn!("WAV writer thread panicked");
            }
        }
    }
}

/// Plays narration through an output device.
#[cfg(feature = "speaker")]
pub struct SpeakerSink {
    speaker: quiz_native_audio::speaker::Speaker,
}

#[cfg(feature = "speaker")]
impl SpeakerSink {
    pub fn open() -> Result<Self> {
        tracing::debug!(
            "Output devices:\n{}",
            quiz_native_audio::device::get_available_outputs()?
        );
        Ok(Self {
            speaker: quiz_native_audio::speaker::Speaker::open(None)?,
        })
    }
}

#[cfg(feature = "speaker")]
impl AudioSink for SpeakerSink {
    fn play(&self, audio: Audio) {
        self.speaker.play(audio.pcm, audio.sample_rate);
    }

    fn stop(&self) {
        self.speaker.stop();
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

/// Saves the illustration of history item `index` and returns its path.
pub fn save_illustration(dir: &Path, index: usize, illustration: &Illustration) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    let path = dir.join(format!(
        "question-{:02}.{}",
        index + 1,
        extension_for(&illustration.mime)
    ));
    fs::write(&path, &illustration.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_wav_sink_writes_numbered_clips() -> Result<()> {
        let dir = tempdir()?;
        let sink = WavFileSink::new(dir.path().join("out"))?;
        let pcm: Vec<u8> = [0i16, 1000, -1000]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        sink.play(Audio {
            pcm: pcm.clone(),
            sample_rate: 24_000,
        });
        sink.play(Audio {
            pcm,
            sample_rate: 24_000,
        });
        drop(sink);

        let reader = hound::WavReader::open(dir.path().join("out/narration-002.wav"))?;
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
        assert_eq!(samples, vec![0, 1000, -1000]);
        Ok(())
    }

    #[test]
    fn test_wav_sink_drops_clip_it_cannot_write() -> Result<()> {
        let dir = tempdir()?;
        let out = dir.path().join("out");
        let sink = WavFileSink::new(&out)?;
        fs::remove_dir(&out)?;

        sink.play(Audio {
            pcm: vec![0, 0],
            sample_rate: 24_000,
        });
        drop(sink);

        assert!(!out.exists());
        Ok(())
    }

    #[test]
    fn test_save_illustration() -> Result<()> {
        let dir = tempdir()?;
        let path = save_illustration(
            dir.path(),
            2,
            &Illustration {
                bytes: vec![1, 2, 3],
                mime: "image/png".to_string(),
            },
        )?;
        assert_eq!(path, dir.path().join("question-03.png"));
        assert_eq!(fs::read(path)?, vec![1, 2, 3]);
        Ok(())
    }
}
