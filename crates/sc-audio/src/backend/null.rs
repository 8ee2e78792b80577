//! Backend that discards everything

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sc_core::DeviceId;

use super::{Backend, BackendHandle, Capabilities, DeviceInfo, OpenRequest, check_prefix, fallback_capabilities};
use crate::{EngineResult, NegotiationError, WriteError};

const NULL_PREFIX: &str = "null-out";

/// Counters shared with whoever holds a [`NullBackend::stats`] clone
#[derive(Debug, Default)]
pub struct NullStats {
    opens: AtomicU64,
    writes: AtomicU64,
    bytes: AtomicU64,
    closes: AtomicU64,
}

impl NullStats {
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }
}

/// One virtual device (`null-out-0`) accepting any stream inside its caps
pub struct NullBackend {
    caps: Capabilities,
    stats: Arc<NullStats>,
    open: Option<BackendHandle>,
    next_handle: u64,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::with_capabilities(fallback_capabilities())
    }

    pub fn with_capabilities(caps: Capabilities) -> Self {
        Self {
            caps,
            stats: Arc::new(NullStats::default()),
            open: None,
            next_handle: 1,
        }
    }

    pub fn stats(&self) -> Arc<NullStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn device_prefix(&self) -> &str {
        NULL_PREFIX
    }

    fn list_devices(&mut self) -> EngineResult<Vec<DeviceInfo>> {
        Ok(vec![DeviceInfo {
            id: DeviceId::new(NULL_PREFIX, 0),
            name: "Null output".to_string(),
            is_default: true,
        }])
    }

    fn query_capabilities(&mut self, device: &DeviceId) -> Result<Capabilities, NegotiationError> {
        if check_prefix(&*self, device).is_err() || device.index() != 0 {
            return Err(NegotiationError::DeviceLocked(device.to_string()));
        }
        Ok(self.caps.clone())
    }

    fn open(&mut self, request: &OpenRequest) -> Result<BackendHandle, NegotiationError> {
        if self.open.is_some() {
            return Err(NegotiationError::DeviceLocked(request.device.to_string()));
        }

        self.query_capabilities(&request.device)?.check(request)?;

        let handle = BackendHandle::new(self.next_handle);
        self.next_handle += 1;
        self.open = Some(handle);
        self.stats.opens.fetch_add(1, Ordering::Relaxed);

        log::debug!("Null output opened: {} ch @ {} Hz, {} frames", request.channels, request.rate, request.buffer_size);
        Ok(handle)
    }

    fn write(&mut self, handle: BackendHandle, bytes: &[u8]) -> Result<(), WriteError> {
        if self.open != Some(handle) {
            return Err(WriteError::DeviceRemoved(format!("{NULL_PREFIX}: stale handle {}", handle.id())));
        }

        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn close(&mut self, handle: BackendHandle) {
        if self.open == Some(handle) {
            self.open = None;
            self.stats.closes.fetch_add(1, Ordering::Relaxed);
        }
    }
}
