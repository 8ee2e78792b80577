//! cpal output backend
//!
//! `write` pushes ring-slot bytes into a lock-free `rtrb` FIFO; the cpal
//! data callback drains it, decoding native-endian words into the stream's
//! sample type. The `cpal::Stream` lives on its own thread for the whole
//! lifetime of the handle, so the backend itself stays `Send` on every host.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, Device, Host, HostId, SampleFormat, SizedSample, StreamConfig, StreamError, SupportedBufferSize};
use crossbeam_channel::{Sender, bounded};
use rtrb::{Consumer, Producer, RingBuffer};

use sc_core::{BackendKind, ConfigError, ConfigResult, DeviceId, SoundcardFormat};

use super::{Backend, BackendHandle, Capabilities, DeviceInfo, OpenRequest, Range, check_prefix, fallback_capabilities};
use crate::{EngineError, EngineResult, NegotiationError, WriteError};

const CPAL_PREFIX: &str = "cpal-out";

// ═══════════════════════════════════════════════════════════════════════════════
// HOST SELECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// cpal host for a configured backend kind
fn host_id_for(kind: BackendKind) -> ConfigResult<HostId> {
    let name = match kind {
        BackendKind::Cpal => return Ok(cpal::default_host().id()),
        BackendKind::Alsa => "alsa",
        BackendKind::CoreAudio => "coreaudio",
        BackendKind::Wasapi => "wasapi",
        BackendKind::Oss | BackendKind::Null => {
            return Err(ConfigError::UnsupportedBackend(format!("{kind:?}")));
        }
    };

    let id: HostId = name
        .parse()
        .map_err(|_| ConfigError::UnsupportedBackend(name.to_string()))?;

    if !cpal::available_hosts().contains(&id) {
        return Err(ConfigError::UnsupportedBackend(name.to_string()));
    }

    Ok(id)
}

fn open_host(id: HostId) -> Result<Host, String> {
    cpal::host_from_id(id).map_err(|e| e.to_string())
}

fn output_device(host: &Host, index: u32) -> Option<Device> {
    host.output_devices().ok()?.nth(index as usize)
}

fn device_name(device: &Device) -> Option<String> {
    device.description().ok().map(|d| d.name().to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// FORMAT MAPPING
// ═══════════════════════════════════════════════════════════════════════════════

/// Stream sample format carrying a soundcard format
fn sample_format_for(format: SoundcardFormat) -> Option<SampleFormat> {
    match format {
        SoundcardFormat::S8 => Some(SampleFormat::I8),
        SoundcardFormat::S16 => Some(SampleFormat::I16),
        // 24-bit samples travel in a 32-bit stream
        SoundcardFormat::S24 | SoundcardFormat::S32 => Some(SampleFormat::I32),
        SoundcardFormat::S64 => Some(SampleFormat::I64),
        SoundcardFormat::Float => Some(SampleFormat::F32),
        SoundcardFormat::Double => Some(SampleFormat::F64),
        SoundcardFormat::Complex => None,
    }
}

fn formats_for(sample_format: SampleFormat) -> &'static [SoundcardFormat] {
    match sample_format {
        SampleFormat::I8 => &[SoundcardFormat::S8],
        SampleFormat::I16 => &[SoundcardFormat::S16],
        SampleFormat::I32 => &[SoundcardFormat::S24, SoundcardFormat::S32],
        SampleFormat::I64 => &[SoundcardFormat::S64],
        SampleFormat::F32 => &[SoundcardFormat::Float],
        SampleFormat::F64 => &[SoundcardFormat::Double],
        _ => &[],
    }
}

fn buffer_range(size: &SupportedBufferSize) -> Range {
    match size {
        SupportedBufferSize::Range { min, max } => Range::new(*min, *max),
        SupportedBufferSize::Unknown => fallback_capabilities().buffer_size,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STREAM THREAD
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct StreamFlags {
    /// Set once the first buffer was written; underruns count after that
    primed: AtomicBool,
    underrun: AtomicBool,
    removed: AtomicBool,
}

struct OpenStream {
    handle: BackendHandle,
    producer: Producer<u8>,
    buffer_bytes: usize,
    flags: Arc<StreamFlags>,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OpenStream {
    fn shut_down(&mut self) {
        // Dropping the sender wakes the stream thread
        self.shutdown.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::error!("cpal stream thread panicked");
        }
    }
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.shut_down();
    }
}

struct StreamSpec {
    host: HostId,
    device: u32,
    config: StreamConfig,
    format: SoundcardFormat,
}

fn run_stream_thread(
    spec: StreamSpec,
    consumer: Consumer<u8>,
    flags: Arc<StreamFlags>,
) -> Result<(Sender<()>, JoinHandle<()>), NegotiationError> {
    let (ready_tx, ready_rx) = bounded::<Result<(), NegotiationError>>(1);
    let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
    let device_label = format!("{CPAL_PREFIX}-{}", spec.device);

    let thread = thread::Builder::new()
        .name("sc-cpal-output".to_string())
        .spawn(move || {
            let stream = match build_stream(&spec, consumer, flags) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(NegotiationError::DeviceLocked(e.to_string())));
                return;
            }

            let _ = ready_tx.send(Ok(()));

            // Park until close() drops the sender
            let _ = shutdown_rx.recv();
            drop(stream);
        })
        .map_err(|e| NegotiationError::DeviceLocked(format!("{device_label}: {e}")))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok((shutdown_tx, thread)),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(NegotiationError::DeviceLocked(device_label))
        }
    }
}

fn build_stream(spec: &StreamSpec, consumer: Consumer<u8>, flags: Arc<StreamFlags>) -> Result<cpal::Stream, NegotiationError> {
    let locked = |what: String| NegotiationError::DeviceLocked(format!("{CPAL_PREFIX}-{}: {what}", spec.device));

    let host = open_host(spec.host).map_err(locked)?;
    let device = output_device(&host, spec.device).ok_or_else(|| locked("device vanished".to_string()))?;

    let stream = match spec.format {
        SoundcardFormat::S8 => build_typed::<i8, 1>(&device, &spec.config, consumer, flags, i8::from_ne_bytes),
        SoundcardFormat::S16 => build_typed::<i16, 2>(&device, &spec.config, consumer, flags, i16::from_ne_bytes),
        SoundcardFormat::S24 => build_typed::<i32, 4>(&device, &spec.config, consumer, flags, |b| {
            i32::from_ne_bytes(b) << 8
        }),
        SoundcardFormat::S32 => build_typed::<i32, 4>(&device, &spec.config, consumer, flags, i32::from_ne_bytes),
        SoundcardFormat::S64 => build_typed::<i64, 8>(&device, &spec.config, consumer, flags, i64::from_ne_bytes),
        SoundcardFormat::Float => build_typed::<f32, 4>(&device, &spec.config, consumer, flags, f32::from_ne_bytes),
        SoundcardFormat::Double => build_typed::<f64, 8>(&device, &spec.config, consumer, flags, f64::from_ne_bytes),
        SoundcardFormat::Complex => Err(NegotiationError::UnsupportedFormat(spec.format)),
    };

    stream.map_err(|e| match e {
        NegotiationError::DeviceLocked(what) => locked(what),
        other => other,
    })
}

fn build_typed<T, const N: usize>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: Consumer<u8>,
    flags: Arc<StreamFlags>,
    decode: fn([u8; N]) -> T,
) -> Result<cpal::Stream, NegotiationError>
where
    T: SizedSample + Send + 'static,
{
    let error_flags = Arc::clone(&flags);
    let mut scratch: Vec<u8> = Vec::with_capacity(consumer.buffer().capacity());

    device
        .build_output_stream::<T, _, _>(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let wanted = data.len() * N;
                let take = (consumer.slots().min(wanted) / N) * N;
                let mut filled = 0;

                if take > 0
                    && let Ok(chunk) = consumer.read_chunk(take)
                {
                    let (first, second) = chunk.as_slices();
                    scratch.clear();
                    scratch.extend_from_slice(first);
                    scratch.extend_from_slice(second);
                    chunk.commit_all();

                    for (sample, word) in data.iter_mut().zip(scratch.chunks_exact(N)) {
                        let mut bytes = [0u8; N];
                        bytes.copy_from_slice(word);
                        *sample = decode(bytes);
                        filled += 1;
                    }
                }

                if filled < data.len() {
                    data[filled..].fill(T::EQUILIBRIUM);
                    if flags.primed.load(Ordering::Acquire) {
                        flags.underrun.store(true, Ordering::Release);
                    }
                }
            },
            move |err| match err {
                StreamError::DeviceNotAvailable => {
                    log::error!("cpal output device lost");
                    error_flags.removed.store(true, Ordering::Release);
                }
                StreamError::BufferUnderrun => {
                    error_flags.underrun.store(true, Ordering::Release);
                }
                other => {
                    log::error!("cpal output stream error: {}", other);
                }
            },
            None,
        )
        .map_err(|e| NegotiationError::DeviceLocked(e.to_string()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// BACKEND
// ═══════════════════════════════════════════════════════════════════════════════

/// Output through a cpal host (ALSA, CoreAudio, WASAPI or the platform default)
pub struct CpalBackend {
    host_id: HostId,
    next_handle: u64,
    stream: Option<OpenStream>,
}

impl CpalBackend {
    pub fn new(kind: BackendKind) -> ConfigResult<Self> {
        let host_id = host_id_for(kind)?;
        log::debug!("cpal backend on host {}", host_id.name());

        Ok(Self {
            host_id,
            next_handle: 1,
            stream: None,
        })
    }

    fn host(&self) -> Result<Host, NegotiationError> {
        open_host(self.host_id).map_err(NegotiationError::DeviceLocked)
    }

    fn device(&self, id: &DeviceId) -> Result<(Host, Device), NegotiationError> {
        if check_prefix(self, id).is_err() {
            return Err(NegotiationError::DeviceLocked(id.to_string()));
        }

        let host = self.host()?;
        let device = output_device(&host, id.index()).ok_or_else(|| NegotiationError::DeviceLocked(id.to_string()))?;

        Ok((host, device))
    }

    fn open_stream(&mut self, handle: BackendHandle) -> Result<&mut OpenStream, WriteError> {
        match self.stream.as_mut() {
            Some(stream) if stream.handle == handle => Ok(stream),
            _ => Err(WriteError::DeviceRemoved(format!("{CPAL_PREFIX}: stale handle {}", handle.id()))),
        }
    }
}

impl Backend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn device_prefix(&self) -> &str {
        CPAL_PREFIX
    }

    fn list_devices(&mut self) -> EngineResult<Vec<DeviceInfo>> {
        let host = open_host(self.host_id).map_err(EngineError::Backend)?;
        let default_name = host.default_output_device().as_ref().and_then(device_name);

        let devices = host
            .output_devices()
            .map_err(|e| EngineError::Backend(e.to_string()))?
            .enumerate()
            .map(|(index, device)| {
                let name = device_name(&device).unwrap_or_else(|| format!("Output {index}"));
                DeviceInfo {
                    id: DeviceId::new(CPAL_PREFIX, index as u32),
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    name,
                }
            })
            .collect();

        Ok(devices)
    }

    fn query_capabilities(&mut self, id: &DeviceId) -> Result<Capabilities, NegotiationError> {
        let (_host, device) = self.device(id)?;

        let configs = device
            .supported_output_configs()
            .map_err(|e| NegotiationError::DeviceLocked(e.to_string()))?;

        let mut caps: Option<Capabilities> = None;

        for supported in configs {
            let channels = Range::new(supported.channels() as u32, supported.channels() as u32);
            let rate = Range::new(supported.min_sample_rate(), supported.max_sample_rate());
            let buffer_size = buffer_range(supported.buffer_size());
            let formats = formats_for(supported.sample_format());

            let entry = caps.get_or_insert_with(|| Capabilities {
                channels,
                rate,
                buffer_size,
                formats: Vec::new(),
            });
            entry.channels = entry.channels.union(channels);
            entry.rate = entry.rate.union(rate);
            entry.buffer_size = entry.buffer_size.union(buffer_size);
            for format in formats {
                if !entry.formats.contains(format) {
                    entry.formats.push(*format);
                }
            }
        }

        caps.ok_or_else(|| NegotiationError::DeviceLocked(format!("{id}: no output configurations")))
    }

    fn open(&mut self, request: &OpenRequest) -> Result<BackendHandle, NegotiationError> {
        if self.stream.is_some() {
            return Err(NegotiationError::DeviceLocked(request.device.to_string()));
        }

        let sample_format = sample_format_for(request.format).ok_or(NegotiationError::UnsupportedFormat(request.format))?;

        let (_host, device) = self.device(&request.device)?;
        let configs: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| NegotiationError::DeviceLocked(e.to_string()))?
            .filter(|c| c.sample_format() == sample_format)
            .collect();

        // Narrow step by step so the error names the first unmet parameter
        if configs.is_empty() {
            return Err(NegotiationError::UnsupportedFormat(request.format));
        }
        let configs: Vec<_> = configs
            .into_iter()
            .filter(|c| c.channels() as u32 == request.channels)
            .collect();
        if configs.is_empty() {
            return Err(NegotiationError::UnsupportedChannels(request.channels));
        }
        let supported = configs
            .into_iter()
            .find(|c| c.min_sample_rate() <= request.rate && request.rate <= c.max_sample_rate())
            .ok_or(NegotiationError::UnsupportedRate(request.rate))?;
        if !buffer_range(supported.buffer_size()).contains(request.buffer_size) {
            return Err(NegotiationError::UnsupportedBufferSize(request.buffer_size));
        }

        let buffer_bytes = request.buffer_bytes();
        let (producer, consumer) = RingBuffer::<u8>::new(buffer_bytes * request.ring_slots.max(2));
        let flags = Arc::new(StreamFlags::default());

        let spec = StreamSpec {
            host: self.host_id,
            device: request.device.index(),
            config: StreamConfig {
                channels: request.channels as u16,
                sample_rate: request.rate,
                buffer_size: CpalBufferSize::Fixed(request.buffer_size),
            },
            format: request.format,
        };

        let (shutdown, thread) = run_stream_thread(spec, consumer, Arc::clone(&flags))?;

        let handle = BackendHandle::new(self.next_handle);
        self.next_handle += 1;
        self.stream = Some(OpenStream {
            handle,
            producer,
            buffer_bytes,
            flags,
            shutdown: Some(shutdown),
            thread: Some(thread),
        });

        log::info!(
            "cpal output opened: {} ({} ch @ {} Hz, {} frames, {})",
            request.device,
            request.channels,
            request.rate,
            request.buffer_size,
            request.format
        );
        Ok(handle)
    }

    fn write(&mut self, handle: BackendHandle, bytes: &[u8]) -> Result<(), WriteError> {
        let stream = self.open_stream(handle)?;

        if stream.flags.removed.load(Ordering::Acquire) {
            return Err(WriteError::DeviceRemoved(format!("{CPAL_PREFIX}: device lost")));
        }
        if stream.flags.underrun.swap(false, Ordering::AcqRel) {
            return Err(WriteError::Underrun);
        }

        let count = stream.producer.slots().min(bytes.len());
        if count < bytes.len() {
            log::warn!("cpal short write: {} of {} bytes", count, bytes.len());
        }

        if count > 0
            && let Ok(mut chunk) = stream.producer.write_chunk(count)
        {
            let (first, second) = chunk.as_mut_slices();
            let split = first.len();
            first.copy_from_slice(&bytes[..split]);
            second.copy_from_slice(&bytes[split..count]);
            chunk.commit_all();
        }

        stream.flags.primed.store(true, Ordering::Release);
        Ok(())
    }

    fn prepare(&mut self, handle: BackendHandle) -> Result<(), WriteError> {
        let stream = self.open_stream(handle)?;
        stream.flags.underrun.store(false, Ordering::Release);
        Ok(())
    }

    fn is_available(&mut self, handle: BackendHandle) -> bool {
        match self.stream.as_ref() {
            Some(stream) if stream.handle == handle => stream.producer.slots() >= stream.buffer_bytes,
            _ => false,
        }
    }

    fn close(&mut self, handle: BackendHandle) {
        if self.stream.as_ref().is_some_and(|s| s.handle == handle) {
            if let Some(mut stream) = self.stream.take() {
                stream.shut_down();
            }
            log::info!("cpal output closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mapping() {
        assert_eq!(sample_format_for(SoundcardFormat::S24), Some(SampleFormat::I32));
        assert_eq!(sample_format_for(SoundcardFormat::Complex), None);

        for format in [
            SoundcardFormat::S8,
            SoundcardFormat::S16,
            SoundcardFormat::S32,
            SoundcardFormat::S64,
            SoundcardFormat::Float,
            SoundcardFormat::Double,
        ] {
            let sample_format = sample_format_for(format).unwrap();
            assert!(formats_for(sample_format).contains(&format));
            assert_eq!(sample_format.sample_size(), format.word_size());
        }
    }

    #[test]
    fn test_oss_is_rejected() {
        assert!(matches!(host_id_for(BackendKind::Oss), Err(ConfigError::UnsupportedBackend(_))));
        assert!(matches!(host_id_for(BackendKind::Null), Err(ConfigError::UnsupportedBackend(_))));
    }

    #[test]
    fn test_unknown_buffer_size_falls_back() {
        assert_eq!(buffer_range(&SupportedBufferSize::Unknown), fallback_capabilities().buffer_size);
        assert_eq!(buffer_range(&SupportedBufferSize::Range { min: 64, max: 512 }), Range::new(64, 512));
    }
}
