//! Streaming kit data to the device.
//!
//! Segments go out one at a time through a [`DeviceChannel`], each followed
//! by a fixed delay so the device can keep up. A [`CancelToken`] is checked
//! before every send; cancelling stops further sends and never touches the
//! source store.

use core::cell::Cell;
use std::{sync::Arc, time::Duration};

use critical_section::Mutex;
use log::{info, warn};

use crate::{
    address::{Address, Segment},
    context::FixedContainer,
    error::Result,
    schema::Schema,
    store::DataStore,
};

/// Failures reported by a [`DeviceChannel`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("device rejected data at {address}: {reason}")]
    Rejected { address: Address, reason: String },
    #[error("device disconnected")]
    Disconnected,
    #[error("{0}")]
    Other(String),
}

/// The external channel to the device.
pub trait DeviceChannel {
    fn send_data(&mut self, address: Address, bytes: &[u8]) -> core::result::Result<(), TransportError>;

    fn play_note(&mut self, channel: u8, note: u8, velocity: u8) -> core::result::Result<(), TransportError>;
}

/// Source of the pause between consecutive sends.
pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Cancellation flag shared with whoever may abort a transfer.
///
/// Safe to set from another thread or an interrupt handler. The flag stays
/// set until [`reset`](Self::reset).
pub struct CancelToken {
    cancelled: Mutex<Cell<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self {
            cancelled: Mutex::new(Cell::new(false)),
        }
    }
}

impl core::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        critical_section::with(|cs| self.cancelled.borrow(cs).set(true));
    }

    pub fn is_cancelled(&self) -> bool {
        critical_section::with(|cs| self.cancelled.borrow(cs).get())
    }

    pub fn reset(&self) {
        critical_section::with(|cs| self.cancelled.borrow(cs).set(false));
    }
}

/// Device sync settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    inter_write_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            inter_write_delay: Duration::from_millis(40),
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum pause after each segment send.
    pub fn inter_write_delay(mut self, delay: Duration) -> Self {
        self.inter_write_delay = delay;
        self
    }

    pub fn delay(&self) -> Duration {
        self.inter_write_delay
    }
}

/// How a transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed { sent: usize },
    Cancelled { sent: usize, remaining: usize },
}

/// Copies `context`'s data into a new store based at `new_base`.
pub fn clone_subtree(
    context: &FixedContainer,
    store: &DataStore,
    new_base: Address,
) -> Result<DataStore> {
    context.clone_data(store, new_base)
}

/// Sends segments to a device, one at a time.
#[derive(Debug)]
pub struct DeviceSync<C, D = StdDelay> {
    channel: C,
    delay: D,
    config: SyncConfig,
    cancel: Arc<CancelToken>,
}

impl<C: DeviceChannel> DeviceSync<C, StdDelay> {
    pub fn new(channel: C) -> Self {
        Self::with_delay(channel, StdDelay, SyncConfig::default())
    }
}

impl<C: DeviceChannel, D: Delay> DeviceSync<C, D> {
    pub fn with_delay(channel: C, delay: D, config: SyncConfig) -> Self {
        Self {
            channel,
            delay,
            config,
            cancel: Arc::new(CancelToken::new()),
        }
    }

    pub fn cancel_token(&self) -> Arc<CancelToken> {
        self.cancel.clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn delay_source(&self) -> &D {
        &self.delay
    }

    fn send(&mut self, segment: Segment, bytes: &[u8]) -> Result<()> {
        self.channel.send_data(segment.start(), bytes)?;
        self.delay.delay(self.config.inter_write_delay);
        Ok(())
    }

    /// Sends every segment of `store` in address order.
    ///
    /// The first transport failure aborts the transfer.
    pub fn send_segments(&mut self, store: &DataStore) -> Result<SyncOutcome> {
        let segments = store.get_segments();
        let total = segments.len();
        for (sent, data) in segments.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Device write cancelled after {sent} of {total} segments.");
                return Ok(SyncOutcome::Cancelled {
                    sent,
                    remaining: total - sent,
                });
            }
            self.send(data.segment(), data.bytes())?;
        }
        Ok(SyncOutcome::Completed { sent: total })
    }

    /// Writes the data under `context` to kit slot `kit_number` on the device.
    ///
    /// The data is cloned and shifted to the slot's root first; `store` is
    /// only read.
    pub fn copy_to_device(
        &mut self,
        schema: &Schema,
        context: &FixedContainer,
        store: &DataStore,
        kit_number: u32,
    ) -> Result<SyncOutcome> {
        let target = schema.kit_root(kit_number)?;
        let clone = clone_subtree(context, store, target)?;

        info!("Writing {} segments to the device.", clone.segments().len());
        let outcome = self.send_segments(&clone)?;
        if let SyncOutcome::Completed { .. } = outcome {
            info!("Finished writing segments to the device.");
        }
        Ok(outcome)
    }

    /// Sends only the dirty segments of `store`, clearing each dirty bit
    /// once its send succeeded.
    pub fn sync_dirty(&mut self, store: &mut DataStore) -> Result<SyncOutcome> {
        let mut pending = Vec::new();
        store.iter_dirty(|segment, bytes| {
            pending.push((segment, bytes.to_vec()));
            Ok(())
        })?;

        let total = pending.len();
        info!("Writing {total} changed segments to the device.");
        for (sent, (segment, bytes)) in pending.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Device sync cancelled after {sent} of {total} segments.");
                return Ok(SyncOutcome::Cancelled {
                    sent,
                    remaining: total - sent,
                });
            }
            self.send(segment, &bytes)?;
            store.clear_dirty(segment.start())?;
        }
        Ok(SyncOutcome::Completed { sent: total })
    }

    pub fn trigger_note(&mut self, channel: u8, note: u8, velocity: u8) -> Result<()> {
        self.channel.play_note(channel, note, velocity)?;
        Ok(())
    }
}
