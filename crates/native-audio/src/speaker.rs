//! Plays PCM16 clips on an output device.
//!
//! `cpal::Stream` is not `Send` everywhere, so the stream lives on a dedicated
//! thread and `Speaker` only holds a command channel to it.

use crate::audio::{pcm16_to_f32, resample, shared_buffer};
use anyhow::Context;
use cpal::traits::{DeviceTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Output buffer length.
pub const OUTPUT_LATENCY_MS: usize = 500;

const FEED_INTERVAL: Duration = Duration::from_millis(10);

enum Command {
    Play { pcm: Vec<u8>, sample_rate: u32 },
    Stop,
}

pub struct Speaker {
    commands: mpsc::Sender<Command>,
}

impl Speaker {
    /// Opens `device_name` (or the default output) and starts its stream.
    pub fn open(device_name: Option<String>) -> anyhow::Result<Self> {
        let (commands, rx) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<()>>();

        thread::Builder::new()
            .name("speaker".to_string())
            .spawn(move || {
                let output = match OutputStream::build(device_name) {
                    Ok(output) => {
                        let _ = ready_tx.send(Ok(()));
                        output
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                output.run(rx);
            })
            .context("Failed to spawn speaker thread")?;

        ready_rx
            .recv()
            .context("Speaker thread exited before opening the device")??;
        Ok(Self { commands })
    }

    /// Replaces whatever is playing with `pcm` (mono little-endian PCM16).
    pub fn play(&self, pcm: Vec<u8>, sample_rate: u32) {
        if let Err(e) = self.commands.send(Command::Play { pcm, sample_rate }) {
            tracing::warn!("Speaker is gone, dropping audio: {:?}", e);
        }
    }

    pub fn stop(&self) {
        if self.commands.send(Command::Stop).is_err() {
            tracing::debug!("Speaker is gone, nothing to stop");
        }
    }
}

struct OutputStream {
    // Kept alive for as long as the thread runs.
    stream: cpal::Stream,
    producer: ringbuf::HeapProd<f32>,
    flush: Arc<AtomicBool>,
    sample_rate: u32,
}

impl OutputStream {
    fn build(device_name: Option<String>) -> anyhow::Result<Self> {
        let output = crate::device::get_or_default_output(device_name)
            .context("Failed to get audio output device")?;
        tracing::info!("Using output device: {:?}", output.name()?);

        let output_config = output
            .default_output_config()
            .context("Failed to get default output config")?;
        let output_config = cpal::StreamConfig {
            channels: output_config.channels(),
            sample_rate: output_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        let output_channel_count = output_config.channels as usize;
        let sample_rate = output_config.sample_rate.0;
        tracing::info!("Output stream config: {:?}", &output_config);

        let buffer = shared_buffer(sample_rate as usize * OUTPUT_LATENCY_MS / 1000);
        let (producer, mut consumer) = buffer.split();
        let flush = Arc::new(AtomicBool::new(false));
        let flush_rx = flush.clone();

        let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if flush_rx.swap(false, Ordering::AcqRel) {
                while consumer.try_pop().is_some() {}
            }
            for frame in data.chunks_mut(output_channel_count.max(1)) {
                let sample = consumer.try_pop().unwrap_or(0.0);
                frame.fill(sample);
            }
        };

        let stream = output.build_output_stream(
            &output_config,
            output_data_fn,
            move |err| tracing::error!("An error occurred on output stream: {}", err),
            None,
        )?;
        stream.play()?;

        Ok(Self {
            stream,
            producer,
            flush,
            sample_rate,
        })
    }

    fn run(mut self, commands: mpsc::Receiver<Command>) {
        let mut pending: VecDeque<f32> = VecDeque::new();
        loop {
            match commands.recv_timeout(FEED_INTERVAL) {
                Ok(Command::Play { pcm, sample_rate }) => {
                    self.flush.store(true, Ordering::Release);
                    pending.clear();
                    let samples = pcm16_to_f32(&pcm);
                    match resample(&samples, sample_rate, self.sample_rate) {
                        Ok(resampled) => pending.extend(resampled),
                        Err(e) => tracing::warn!("Failed to resample narration: {:?}", e),
                    }
                }
                Ok(Command::Stop) => {
                    self.flush.store(true, Ordering::Release);
                    pending.clear();
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }

            // Wait for the callback to drop stale samples before feeding new ones.
            if self.flush.load(Ordering::Acquire) {
                continue;
            }
            while let Some(&sample) = pending.front() {
                if self.producer.try_push(sample).is_err() {
                    break;
                }
                pending.pop_front();
            }
        }
        if let Err(e) = self.stream.pause() {
            tracing::debug!("Failed to pause output stream: {}", e);
        }
        tracing::debug!("Speaker thread stopped");
    }
}
