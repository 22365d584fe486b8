//! Alert sound played straight to the default output device.
//!
//! The file is decoded once (symphonia, downmixed to mono) when the player
//! is built. Each [`SoundPlayer::play`] opens a cpal output stream on its
//! own thread, loops the clip until stopped, then drops the stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use tracing::{debug, error, info};

use crate::errors::PlaybackError;
use crate::sound::{ActivePlayback, SoundPlayer};

struct Clip {
    samples: Vec<f32>,
    sample_rate: u32,
}

pub struct DeviceSoundPlayer {
    path: PathBuf,
    clip: Arc<Clip>,
}

impl DeviceSoundPlayer {
    pub fn new(sound_file: impl Into<PathBuf>) -> Result<Self, PlaybackError> {
        let path = sound_file.into();
        if !path.exists() {
            return Err(PlaybackError::SoundFileMissing(path));
        }
        let (samples, sample_rate) = decode_to_mono(&path)?;
        if samples.is_empty() {
            return Err(PlaybackError::Decode(format!(
                "no audio samples in {}",
                path.display()
            )));
        }
        info!(
            "alert sound loaded from {} ({} samples at {} Hz)",
            path.display(),
            samples.len(),
            sample_rate
        );
        Ok(Self {
            path,
            clip: Arc::new(Clip {
                samples,
                sample_rate,
            }),
        })
    }

    pub fn sound_file(&self) -> &Path {
        &self.path
    }

    /// Length of one pass through the clip.
    pub fn clip_duration(&self) -> Duration {
        Duration::from_secs_f64(self.clip.samples.len() as f64 / f64::from(self.clip.sample_rate))
    }
}

impl SoundPlayer for DeviceSoundPlayer {
    fn play(&self) -> Result<Box<dyn ActivePlayback>, PlaybackError> {
        let (ready_tx, ready_rx) = bounded::<Result<(), PlaybackError>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let clip = self.clip.clone();

        // cpal streams are not Send on every platform, so the stream lives
        // and dies on this thread.
        let handle = thread::Builder::new()
            .name("alert-playback".to_string())
            .spawn(move || {
                let stream = match open_looping_stream(&clip) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(stream);
                debug!("alert playback stream closed");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(DevicePlayback {
                stop: stop_tx,
                handle: Some(handle),
            })),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(PlaybackError::Device(
                    "playback thread exited before starting".to_string(),
                ))
            }
        }
    }
}

struct DevicePlayback {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl DevicePlayback {
    fn finish(&mut self) -> Result<(), PlaybackError> {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| PlaybackError::Device("playback thread panicked".to_string()))?;
        }
        Ok(())
    }
}

impl ActivePlayback for DevicePlayback {
    fn stop(mut self: Box<Self>) -> Result<(), PlaybackError> {
        self.finish()
    }
}

impl Drop for DevicePlayback {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

fn open_looping_stream(clip: &Clip) -> Result<cpal::Stream, PlaybackError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PlaybackError::Device("no default output device".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|err| PlaybackError::Device(format!("no default output config: {err}")))?;
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(PlaybackError::Device(format!(
            "alert playback requires f32 output (got {:?})",
            supported.sample_format()
        )));
    }

    let channels = usize::from(supported.channels()).max(1);
    let device_rate = supported.sample_rate();
    let config: cpal::StreamConfig = supported.into();
    let samples = resample_linear(&clip.samples, clip.sample_rate, device_rate);
    let mut cursor = 0usize;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                fill_looping(data, channels, &samples, &mut cursor);
            },
            move |err| {
                error!("alert output stream error: {err}");
            },
            None,
        )
        .map_err(|err| PlaybackError::Device(format!("failed to build output stream: {err}")))?;
    stream
        .play()
        .map_err(|err| PlaybackError::Device(format!("failed to start output stream: {err}")))?;
    Ok(stream)
}

/// Writes the mono clip into every channel of `out`, wrapping at the end.
fn fill_looping(out: &mut [f32], channels: usize, samples: &[f32], cursor: &mut usize) {
    for frame in out.chunks_mut(channels) {
        let value = if samples.is_empty() {
            0.0
        } else {
            let value = samples[*cursor % samples.len()];
            *cursor = (*cursor + 1) % samples.len();
            value
        };
        for slot in frame {
            *slot = value;
        }
    }
}

fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() || from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return input.to_vec();
    }
    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let out_len = ((input.len() as f64) * ratio).round() as usize;
    let last = input.len() - 1;
    (0..out_len)
        .map(|i| {
            let src = i as f64 / ratio;
            let i0 = (src.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let t = (src - i0 as f64) as f32;
            input[i0] * (1.0 - t) + input[i1] * t
        })
        .collect()
}

fn decode_to_mono(path: &Path) -> Result<(Vec<f32>, u32), PlaybackError> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| PlaybackError::Decode(format!("failed to probe audio: {err}")))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| PlaybackError::Decode("no default audio track".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| PlaybackError::Decode("unknown sample rate".to_string()))?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|err| PlaybackError::Decode(format!("failed to create decoder: {err}")))?;

    let mut out = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphError::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(err) => return Err(PlaybackError::Decode(format!("audio read error: {err}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphError::DecodeError(_)) => continue,
            Err(err) => return Err(PlaybackError::Decode(format!("audio decode error: {err}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let frames = decoded.frames() as u64;
        let required = usize::try_from(frames)
            .unwrap_or(usize::MAX)
            .saturating_mul(channels);
        let needs_new = sample_buf
            .as_ref()
            .map_or(true, |buf| buf.capacity() < required);
        if needs_new {
            sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
        } else if let Some(buf) = sample_buf.as_mut() {
            buf.clear();
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);
        for frame in buf.samples().chunks_exact(channels) {
            out.push(frame.iter().sum::<f32>() / channels as f32);
        }
    }
    Ok((out, sample_rate))
}
