//! Soundcard engine - device presets, timing and the play loop
//!
//! Provides:
//! - Presets (channels / samplerate / buffer size / format) kept consistent
//!   with the app buffer pool and the delay/attack tables
//! - Transport control and offset-change notification
//! - `play_init` / `play_step` / `stop` lifecycle driving a [`Backend`]
//!
//! The engine is `Sync`: one soundcard thread calls [`SoundcardEngine::play_step`]
//! in a loop while UI and render threads use setters, getters and the
//! buffer locking API of [`RingBufferPool`].

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use sc_core::{
    Capability, ConfigError, ConfigResult, DeviceId, EngineConfig, Presets, SoundcardFormat, UPTIME_ZERO,
    parse_segmentation, uptime_from_offset, validate_bpm, validate_delay_factor,
};

use crate::{
    Backend, BackendHandle, Capabilities, DeviceInfo, EngineError, EngineResult, InlineTaskLauncher, NativeLayout,
    NegotiationError, OpenRequest, RingBufferPool, Task, TaskKind, TaskLauncher, ThreadedTaskLauncher, TimingTable,
    TransportEvent, TransportState, backend_for, pack,
};

// ═══════════════════════════════════════════════════════════════════════════════
// STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine lifecycle: `Idle -> Initializing -> Playing -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Idle,
    Initializing,
    Playing,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// Result of one [`SoundcardEngine::play_step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Not playing, nothing was done
    Idle,
    /// A ring slot was handed to the backend
    Written {
        /// The availability wait hit its deadline
        timed_out: bool,
        /// The backend reported an underrun/suspend and was prepared again
        recovered: bool,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED STATE
// ═══════════════════════════════════════════════════════════════════════════════

struct SoundcardState {
    device: DeviceId,
    capability: Capability,
    presets: Presets,
    dsp_channels: u32,
    bpm: f64,
    delay_factor: f64,
    timing: TimingTable,
    transport: TransportState,
    status: EngineStatus,
    starting: bool,
    nonblocking: bool,
    exclusive: bool,
    ring_buffer_size: usize,
}

impl SoundcardState {
    fn recompute_timing(&mut self) -> ConfigResult<()> {
        self.timing
            .recompute(self.presets.samplerate, self.presets.buffer_size, self.bpm, self.delay_factor)
    }
}

/// State reachable from tasks and the soundcard thread
pub struct SoundcardShared {
    pool: RingBufferPool,
    state: Mutex<SoundcardState>,
    observers: Mutex<Vec<Sender<TransportEvent>>>,
}

impl SoundcardShared {
    /// Advance the transport by one buffer. Ignored unless playing, so a
    /// task arriving after `stop()` has no effect.
    pub(crate) fn tic(&self) {
        let mut events = Vec::new();

        {
            let mut state = self.state.lock();
            if state.status != EngineStatus::Playing {
                return;
            }

            let SoundcardState { timing, transport, .. } = &mut *state;
            transport.tic(timing, |event| events.push(event));
        }

        self.publish(&events);
    }

    pub(crate) fn clear_ahead(&self) {
        self.pool.clear(self.pool.ahead(2));
    }

    pub(crate) fn switch_buffer(&self) {
        self.pool.switch_current();
    }

    fn publish(&self, events: &[TransportEvent]) {
        if events.is_empty() {
            return;
        }

        // Drop observers whose receiver is gone
        self.observers
            .lock()
            .retain(|observer| events.iter().all(|event| observer.send(*event).is_ok()));
    }
}

/// Backend stream opened by `play_init`
struct OutputStream {
    handle: BackendHandle,
    /// Presets the stream was negotiated with
    presets: Presets,
    layout: NativeLayout,
    ring: Vec<Vec<u8>>,
    nth_ring_buffer: usize,
    poll_timeout: Duration,
}

impl OutputStream {
    fn new(handle: BackendHandle, layout: NativeLayout, request: &OpenRequest) -> Self {
        Self {
            handle,
            presets: Presets::new(request.channels, request.rate, request.buffer_size, request.format),
            layout,
            ring: vec![vec![0u8; request.buffer_bytes()]; request.ring_slots],
            nth_ring_buffer: 0,
            poll_timeout: Duration::from_secs_f64(request.buffer_size as f64 / request.rate as f64),
        }
    }
}

fn open_request(state: &SoundcardState) -> OpenRequest {
    OpenRequest {
        device: state.device.clone(),
        channels: state.presets.channels,
        rate: state.presets.samplerate,
        buffer_size: state.presets.buffer_size,
        format: state.presets.format,
        exclusive: state.exclusive,
        nonblocking: state.nonblocking,
        ring_slots: state.ring_buffer_size,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Soundcard output engine
pub struct SoundcardEngine {
    shared: Arc<SoundcardShared>,
    backend: Mutex<Box<dyn Backend>>,
    output: Mutex<Option<OutputStream>>,
    presets_lock: Mutex<()>,
    launcher: Arc<dyn TaskLauncher>,
}

impl SoundcardEngine {
    /// Build an engine from a validated configuration
    pub fn new(config: EngineConfig, backend: Box<dyn Backend>, launcher: Arc<dyn TaskLauncher>) -> EngineResult<Self> {
        config.validate()?;

        let device = match config.device_id()? {
            Some(device) => {
                if device.prefix() != backend.device_prefix() {
                    return Err(ConfigError::WrongDevicePrefix {
                        expected: backend.device_prefix().to_string(),
                        found: device.to_string(),
                    }
                    .into());
                }
                device
            }
            None => DeviceId::new(backend.device_prefix(), 0),
        };

        let presets = config.presets();
        let delay_factor = config.delay_factor()?;
        let timing = TimingTable::with_params(presets.samplerate, presets.buffer_size, config.bpm, delay_factor)?;

        let pool = RingBufferPool::new(
            config.app_buffer_count,
            presets.channels,
            config.sub_block_count,
            presets.buffer_bytes(),
        );

        let state = SoundcardState {
            device,
            capability: Capability::Playback,
            presets,
            dsp_channels: config.dsp_channels,
            bpm: config.bpm,
            delay_factor,
            timing,
            transport: TransportState::new(),
            status: EngineStatus::Idle,
            starting: false,
            nonblocking: config.nonblocking,
            exclusive: config.wasapi_share_mode == sc_core::ShareMode::Exclusive,
            ring_buffer_size: config.ring_buffer_size,
        };

        log::debug!("Soundcard engine created on {} backend", backend.name());

        Ok(Self {
            shared: Arc::new(SoundcardShared {
                pool,
                state: Mutex::new(state),
                observers: Mutex::new(Vec::new()),
            }),
            backend: Mutex::new(backend),
            output: Mutex::new(None),
            presets_lock: Mutex::new(()),
            launcher,
        })
    }

    /// Engine with the configured backend and a threaded task launcher
    pub fn from_config(config: EngineConfig) -> EngineResult<Self> {
        let backend = backend_for(&config)?;
        let launcher = ThreadedTaskLauncher::new().map_err(|e| EngineError::Backend(e.to_string()))?;
        Self::new(config, backend, Arc::new(launcher))
    }

    /// Engine running post-step tasks synchronously (offline rendering, tests)
    pub fn with_inline_tasks(config: EngineConfig, backend: Box<dyn Backend>) -> EngineResult<Self> {
        Self::new(config, backend, Arc::new(InlineTaskLauncher))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEVICE
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn device(&self) -> DeviceId {
        self.shared.state.lock().device.clone()
    }

    pub fn capability(&self) -> Capability {
        self.shared.state.lock().capability
    }

    /// Select the output device; takes effect at the next `play_init`
    pub fn set_device(&self, device: &str) -> EngineResult<()> {
        let mut backend = self.backend.lock();
        let id = DeviceId::parse_with_prefix(device, backend.device_prefix())?;

        if let Ok(devices) = backend.list_devices()
            && !devices.iter().any(|info| info.id == id)
        {
            return Err(ConfigError::UnknownDevice(device.to_string()).into());
        }
        drop(backend);

        log::debug!("Soundcard device set to {}", id);
        self.shared.state.lock().device = id;
        Ok(())
    }

    /// Output devices of the backend
    pub fn list_cards(&self) -> EngineResult<Vec<DeviceInfo>> {
        self.backend.lock().list_devices()
    }

    /// Capability ranges of one device
    pub fn pcm_info(&self, device: &DeviceId) -> EngineResult<Capabilities> {
        Ok(self.backend.lock().query_capabilities(device)?)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRESETS & TIMING
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn presets(&self) -> Presets {
        self.shared.state.lock().presets
    }

    pub fn dsp_channels(&self) -> u32 {
        self.shared.state.lock().dsp_channels
    }

    /// Change presets, reallocating the app buffers.
    ///
    /// Values are checked against the device's reported ranges when the
    /// backend can report them. The delay/attack tables are recomputed
    /// when samplerate or buffer size changed. While playing, the next
    /// `play_step` reopens the stream with the new presets.
    ///
    /// No engine lock is held while the pool reallocates, so a producer
    /// holding a buffer may keep calling engine getters.
    pub fn set_presets(&self, channels: u32, samplerate: u32, buffer_size: u32, format: SoundcardFormat) -> EngineResult<()> {
        let presets = Presets::new(channels, samplerate, buffer_size, format);
        presets.validate()?;

        let _serial = self.presets_lock.lock();

        let device = self.device();
        if let Ok(caps) = self.backend.lock().query_capabilities(&device) {
            check_range("pcm-channels", channels, caps.channels)?;
            check_range("samplerate", samplerate, caps.rate)?;
            check_range("buffer-size", buffer_size, caps.buffer_size)?;
        }

        let retime = {
            let state = self.shared.state.lock();
            let retime = state.presets.samplerate != samplerate || state.presets.buffer_size != buffer_size;

            if retime {
                // Fail before touching the pool
                let mut timing = state.timing.clone();
                timing.recompute(samplerate, buffer_size, state.bpm, state.delay_factor)?;
            }
            retime
        };

        self.shared.pool.realloc(channels, presets.buffer_bytes());

        {
            let mut state = self.shared.state.lock();
            state.presets = presets;
            if retime {
                state.recompute_timing()?;
            }
        }

        log::debug!(
            "Soundcard presets: {} ch @ {} Hz, {} frames, {}",
            channels,
            samplerate,
            buffer_size,
            format
        );
        Ok(())
    }

    pub fn bpm(&self) -> f64 {
        self.shared.state.lock().bpm
    }

    pub fn set_bpm(&self, bpm: f64) -> ConfigResult<()> {
        validate_bpm(bpm)?;

        let mut state = self.shared.state.lock();
        let previous = std::mem::replace(&mut state.bpm, bpm);
        state.recompute_timing().inspect_err(|_| state.bpm = previous)
    }

    pub fn delay_factor(&self) -> f64 {
        self.shared.state.lock().delay_factor
    }

    pub fn set_delay_factor(&self, delay_factor: f64) -> ConfigResult<()> {
        validate_delay_factor(delay_factor)?;

        let mut state = self.shared.state.lock();
        let previous = std::mem::replace(&mut state.delay_factor, delay_factor);
        state.recompute_timing().inspect_err(|_| state.delay_factor = previous)
    }

    /// Set the delay factor from a `"numerator/denominator"` time signature
    pub fn set_segmentation(&self, segmentation: &str) -> ConfigResult<()> {
        self.set_delay_factor(parse_segmentation(segmentation)?)
    }

    pub fn absolute_delay(&self) -> f64 {
        self.shared.state.lock().timing.absolute_delay()
    }

    pub fn get_delay(&self, tic_counter: usize) -> f64 {
        self.shared.state.lock().timing.get_delay(tic_counter)
    }

    pub fn get_attack(&self, tic_counter: usize) -> u32 {
        self.shared.state.lock().timing.get_attack(tic_counter)
    }

    /// Copy of the delay/attack tables
    pub fn timing(&self) -> TimingTable {
        self.shared.state.lock().timing.clone()
    }

    /// Override one slot's delay (swing); attack is re-derived
    pub fn override_delay(&self, slot: usize, delay: f64) -> ConfigResult<()> {
        self.shared.state.lock().timing.override_delay(slot, delay)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRANSPORT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Snapshot of the transport counters
    pub fn transport(&self) -> TransportState {
        self.shared.state.lock().transport.clone()
    }

    pub fn note_offset(&self) -> u32 {
        self.shared.state.lock().transport.note_offset()
    }

    pub fn set_note_offset(&self, note_offset: u32) {
        self.shared.state.lock().transport.set_note_offset(note_offset);
    }

    pub fn note_offset_absolute(&self) -> u64 {
        self.shared.state.lock().transport.note_offset_absolute()
    }

    pub fn set_note_offset_absolute(&self, note_offset_absolute: u64) {
        self.shared
            .state
            .lock()
            .transport
            .set_note_offset_absolute(note_offset_absolute);
    }

    pub fn set_start_note_offset(&self, start_note_offset: u32) {
        self.shared.state.lock().transport.set_start_note_offset(start_note_offset);
    }

    pub fn set_loop(&self, left: u32, right: u32, do_loop: bool) -> ConfigResult<()> {
        self.shared.state.lock().transport.set_loop(left, right, do_loop)
    }

    /// Receive every transport event from now on
    pub fn subscribe(&self) -> Receiver<TransportEvent> {
        let (sender, receiver) = unbounded();
        self.shared.observers.lock().push(sender);
        receiver
    }

    /// Elapsed playback as `"MMMM:SS.mmm"`
    pub fn uptime(&self) -> String {
        let state = self.shared.state.lock();

        if state.status != EngineStatus::Playing {
            return UPTIME_ZERO.to_string();
        }

        uptime_from_offset(state.transport.note_offset_absolute(), state.bpm, state.delay_factor)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BUFFERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// App buffer pool shared with producers
    pub fn buffers(&self) -> &RingBufferPool {
        &self.shared.pool
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn status(&self) -> EngineStatus {
        self.shared.state.lock().status
    }

    pub fn is_playing(&self) -> bool {
        self.status() == EngineStatus::Playing
    }

    /// True from `play_init` until the first completed step
    pub fn is_starting(&self) -> bool {
        self.shared.state.lock().starting
    }

    pub fn is_nonblocking(&self) -> bool {
        self.shared.state.lock().nonblocking
    }

    /// Negotiate with the backend and start playing.
    ///
    /// No-op while playing. On failure nothing is allocated and the engine
    /// stays `Idle`.
    pub fn play_init(&self) -> EngineResult<()> {
        let mut output = self.output.lock();

        let request = {
            let mut state = self.shared.state.lock();
            if state.status == EngineStatus::Playing {
                return Ok(());
            }

            state.presets.validate()?;
            state.status = EngineStatus::Initializing;
            open_request(&state)
        };

        let opened = {
            let mut backend = self.backend.lock();
            negotiate(backend.as_mut(), &request).map(|handle| (handle, backend.native_layout()))
        };

        let (handle, layout) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                log::warn!("Soundcard negotiation failed on {}: {}", request.device, e);
                self.shared.state.lock().status = EngineStatus::Idle;
                return Err(e.into());
            }
        };

        *output = Some(OutputStream::new(handle, layout, &request));

        {
            let mut state = self.shared.state.lock();
            state.transport.reset();
            state.status = EngineStatus::Playing;
            state.starting = true;
        }

        log::info!(
            "Soundcard started: {} ({} ch @ {} Hz, {} frames, {})",
            request.device,
            request.channels,
            request.rate,
            request.buffer_size,
            request.format
        );
        Ok(())
    }

    /// One cycle of the soundcard thread.
    ///
    /// Copies the current app buffer into the next ring slot, waits (at
    /// most one buffer period) for the backend, writes, advances the ring
    /// and queues `Tic`, `ClearBuffer` and `SwitchBufferFlag`.
    /// A preset change since the stream was opened reopens it first.
    /// Underrun/suspend is recovered locally; a lost device stops the
    /// engine and is returned.
    pub fn play_step(&self) -> EngineResult<StepOutcome> {
        let mut output_guard = self.output.lock();

        let Some(opened) = output_guard.as_ref().map(|output| output.presets) else {
            return Ok(StepOutcome::Idle);
        };

        let reopen = {
            let state = self.shared.state.lock();
            if state.status != EngineStatus::Playing {
                return Ok(StepOutcome::Idle);
            }
            (state.presets != opened).then(|| open_request(&state))
        };

        if let Some(request) = reopen
            && let Err(e) = self.reopen(&mut output_guard, &request)
        {
            log::warn!("Soundcard reopen failed on {}: {}", request.device, e);
            drop(output_guard);
            self.enter_idle();
            return Err(e.into());
        }

        let Some(output) = output_guard.as_mut() else {
            return Ok(StepOutcome::Idle);
        };

        let nth = output.nth_ring_buffer;

        // Copy current app buffer → ring slot, silence whatever was not packed
        {
            let pool = &self.shared.pool;
            let (format, layout) = (output.presets.format, output.layout);
            let slot = &mut output.ring[nth];

            let packed = match pool.lock(pool.current()) {
                Some(app) => app.read(|bytes| pack::fill_ring_buffer(bytes, format, layout, slot))?,
                None => 0,
            };
            slot[packed..].fill(0);
        }

        let mut backend = self.backend.lock();
        let handle = output.handle;

        let timed_out = wait_available(backend.as_mut(), handle, output.poll_timeout);
        if timed_out {
            log::debug!("Soundcard poll timed out after {:?}", output.poll_timeout);
        }

        let mut recovered = false;
        let written = match backend.write(handle, &output.ring[nth]) {
            Err(e) if e.is_recoverable() => {
                log::debug!("Soundcard {}, preparing device", e);
                recovered = true;
                backend.prepare(handle)
            }
            other => other,
        };

        if let Err(e) = written {
            log::error!("Soundcard device failure: {}", e);
            backend.close(handle);
            drop(backend);
            *output_guard = None;
            drop(output_guard);

            self.enter_idle();
            return Err(EngineError::Device(e));
        }

        output.nth_ring_buffer = (nth + 1) % output.ring.len();

        drop(backend);
        drop(output_guard);

        self.launcher.add_task_all(vec![
            Task::new(TaskKind::Tic, Arc::clone(&self.shared)),
            Task::new(TaskKind::ClearBuffer, Arc::clone(&self.shared)),
            Task::new(TaskKind::SwitchBufferFlag, Arc::clone(&self.shared)),
        ]);

        self.shared.state.lock().starting = false;

        Ok(StepOutcome::Written { timed_out, recovered })
    }

    /// Replace the open stream with one negotiated for `request`.
    /// Transport counters carry on.
    fn reopen(&self, output: &mut Option<OutputStream>, request: &OpenRequest) -> Result<(), NegotiationError> {
        let mut backend = self.backend.lock();

        if let Some(stream) = output.take() {
            backend.close(stream.handle);
        }

        let handle = negotiate(backend.as_mut(), request)?;
        *output = Some(OutputStream::new(handle, backend.native_layout(), request));

        log::info!(
            "Soundcard reopened: {} ({} ch @ {} Hz, {} frames, {})",
            request.device,
            request.channels,
            request.rate,
            request.buffer_size,
            request.format
        );
        Ok(())
    }

    /// Close the backend stream, free the ring and reset the transport.
    /// Safe to call at any time.
    pub fn stop(&self) {
        let mut output = self.output.lock();

        if let Some(stream) = output.take() {
            self.backend.lock().close(stream.handle);
        }
        drop(output);

        if self.enter_idle() {
            log::info!("Soundcard stopped");
        }
    }

    /// Block until queued post-step tasks have run
    pub fn wait_tasks(&self) {
        self.launcher.wait_idle();
    }

    /// Back to `Idle` with counters reset; false if already idle
    fn enter_idle(&self) -> bool {
        {
            let mut state = self.shared.state.lock();
            if state.status == EngineStatus::Idle {
                return false;
            }

            state.status = EngineStatus::Idle;
            state.starting = false;
            state.transport.reset();
        }

        self.shared.publish(&[TransportEvent::Stopped]);
        true
    }
}

impl Drop for SoundcardEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn check_range(what: &'static str, value: u32, range: crate::Range) -> ConfigResult<()> {
    if range.contains(value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            what,
            value,
            min: range.min,
            max: range.max,
        })
    }
}

fn negotiate(backend: &mut dyn Backend, request: &OpenRequest) -> Result<BackendHandle, NegotiationError> {
    if !pack::is_packable(request.format) {
        return Err(NegotiationError::UnsupportedFormat(request.format));
    }

    backend.query_capabilities(&request.device)?.check(request)?;
    backend.open(request)
}

/// Poll until the backend is ready or `timeout` elapses; true on timeout
fn wait_available(backend: &mut dyn Backend, handle: BackendHandle, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let interval = (timeout / 16).max(Duration::from_micros(100));

    while !backend.is_available(handle) {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(interval.min(deadline - now));
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullBackend;
    use sc_core::BackendKind;

    fn engine() -> SoundcardEngine {
        let config = EngineConfig {
            backend: BackendKind::Null,
            ..Default::default()
        };
        SoundcardEngine::with_inline_tasks(config, Box::new(NullBackend::new())).unwrap()
    }

    #[test]
    fn test_engine_creation() {
        let engine = engine();

        assert_eq!(engine.status(), EngineStatus::Idle);
        assert_eq!(engine.device().to_string(), "null-out-0");
        assert_eq!(engine.capability(), Capability::Playback);
        assert_eq!(engine.buffers().len(), 4);
        assert_eq!(engine.buffers().buffer_len(engine.buffers().current()), Some(2 * 512 * 2));
        assert_eq!(engine.uptime(), UPTIME_ZERO);
    }

    #[test]
    fn test_wrong_device_prefix_rejected() {
        let config = EngineConfig {
            device: Some("cpal-out-0".to_string()),
            ..Default::default()
        };
        let result = SoundcardEngine::with_inline_tasks(config, Box::new(NullBackend::new()));

        assert!(matches!(result, Err(EngineError::Config(ConfigError::WrongDevicePrefix { .. }))));
    }

    #[test]
    fn test_set_device() {
        let engine = engine();

        assert!(engine.set_device("null-out-0").is_ok());
        assert!(matches!(engine.set_device("null-out-3"), Err(EngineError::Config(ConfigError::UnknownDevice(_)))));
        assert!(matches!(engine.set_device("null-out"), Err(EngineError::Config(ConfigError::MalformedDeviceId(_)))));
        assert!(matches!(
            engine.set_device("cpal-out-0"),
            Err(EngineError::Config(ConfigError::WrongDevicePrefix { .. }))
        ));
    }

    #[test]
    fn test_format_change_skips_recompute() {
        let engine = engine();
        let before = engine.timing().recompute_count();

        engine.set_presets(2, 44100, 512, SoundcardFormat::Float).unwrap();
        assert_eq!(engine.timing().recompute_count(), before);
        assert_eq!(engine.buffers().buffer_len(engine.buffers().next()), Some(2 * 512 * 4));
    }

    #[test]
    fn test_channel_change_skips_recompute() {
        let engine = engine();
        let before = engine.timing().recompute_count();

        engine.set_presets(6, 44100, 512, SoundcardFormat::S16).unwrap();
        assert_eq!(engine.timing().recompute_count(), before);
        assert_eq!(engine.buffers().buffer_len(engine.buffers().current()), Some(6 * 512 * 2));

        engine.set_presets(6, 48000, 512, SoundcardFormat::S16).unwrap();
        assert_eq!(engine.timing().recompute_count(), before + 1);
        assert_eq!(engine.absolute_delay(), crate::absolute_delay(48000, 512, 120.0, 1.0));
    }

    #[test]
    fn test_preset_range_check() {
        let engine = engine();

        assert!(matches!(
            engine.set_presets(2, 44100, 8, SoundcardFormat::S16),
            Err(EngineError::Config(ConfigError::OutOfRange { what: "buffer-size", .. }))
        ));
        assert_eq!(engine.presets().buffer_size, 512);
    }

    #[test]
    fn test_tempo_setters() {
        let engine = engine();

        engine.set_bpm(60.0).unwrap();
        assert_eq!(engine.absolute_delay(), crate::absolute_delay(44100, 512, 60.0, 1.0));

        assert!(matches!(engine.set_delay_factor(0.0), Err(ConfigError::InvalidDelayFactor(_))));
        assert!(matches!(engine.set_bpm(-1.0), Err(ConfigError::InvalidBpm(_))));
        assert_eq!(engine.bpm(), 60.0);

        engine.set_segmentation("3/4").unwrap();
        assert_eq!(engine.delay_factor(), 1.0 / 3.0 * (3.0 / 4.0));
    }

    #[test]
    fn test_stop_before_init_is_noop() {
        let engine = engine();
        let events = engine.subscribe();

        engine.set_note_offset(12);
        engine.stop();

        assert_eq!(engine.status(), EngineStatus::Idle);
        assert_eq!(engine.note_offset(), 12);
        assert!(events.try_recv().is_err());
    }
}
