//! Single-consumer ODP event batching (spec §4.9, §5), grounded on
//! `optimizely/odp/odp_event_manager.py` and the teacher's
//! `src/events/event_queue.rs` channel/batch shape.

use std::sync::mpsc::{self, RecvTimeoutError, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::odp::config::{OdpConfig, OdpConfigState};
use crate::odp::event::OdpEvent;
use crate::odp::event_api_client::EventApiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Flush,
    UpdateConfig,
}

enum QueueMessage {
    Event(OdpEvent),
    Signal(Signal),
}

pub struct OdpEventManagerOptions {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_retries: u32,
}

impl Default for OdpEventManagerOptions {
    fn default() -> Self {
        OdpEventManagerOptions {
            queue_capacity: 1000,
            batch_size: 10,
            flush_interval: Duration::from_secs(1),
            max_retries: 3,
        }
    }
}

/// Bounded, non-blocking producer handle plus the consumer thread's join
/// handle. `sender` uses a synchronous channel with a fixed bound so
/// `try_send`'s queue-full case is observable (spec §4.9: "queue-full logs a
/// warning and drops").
pub struct OdpEventManager {
    sender: mpsc::SyncSender<QueueMessage>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl OdpEventManager {
    pub fn start(odp_config: Arc<OdpConfig>, api_client: Box<dyn EventApiClient>, options: OdpEventManagerOptions) -> Self {
        let (tx, rx) = mpsc::sync_channel(options.queue_capacity);
        let handle = std::thread::Builder::new()
            .name("odp-event-manager".to_string())
            .spawn(move || consumer_loop(rx, odp_config, api_client, options))
            .expect("failed to spawn odp event manager thread");

        OdpEventManager {
            sender: tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Enqueues an event without blocking; a full queue drops the event and
    /// logs a warning (spec §4.9).
    pub fn dispatch(&self, event: OdpEvent) {
        self.try_send(QueueMessage::Event(event));
    }

    pub fn flush(&self) {
        self.try_send(QueueMessage::Signal(Signal::Flush));
    }

    /// Signals that ODP credentials may have changed; the consumer flushes
    /// the current batch before the new credentials take effect downstream.
    pub fn notify_config_update(&self) {
        self.try_send(QueueMessage::Signal(Signal::UpdateConfig));
    }

    fn try_send(&self, message: QueueMessage) {
        match self.sender.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("odp event queue is full; dropping message"),
            Err(TrySendError::Disconnected(_)) => error!("odp event queue consumer is gone"),
        }
    }

    /// Posts SHUTDOWN, then joins the consumer thread (spec §4.9, §5).
    pub fn stop(&self) {
        self.try_send(QueueMessage::Signal(Signal::Shutdown));
        if let Some(handle) = self.handle.lock().expect("odp event manager handle lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

fn consumer_loop(rx: mpsc::Receiver<QueueMessage>, odp_config: Arc<OdpConfig>, api_client: Box<dyn EventApiClient>, options: OdpEventManagerOptions) {
    let mut current_batch: Vec<OdpEvent> = Vec::new();
    let mut retry_count: u32 = 0;
    let mut flush_deadline = Instant::now() + options.flush_interval;

    loop {
        let timeout = flush_deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(timeout) {
            Ok(QueueMessage::Event(event)) => {
                current_batch.push(event);
                if current_batch.len() >= options.batch_size {
                    debug!("flushing odp events on batch size");
                    flush_batch(&odp_config, api_client.as_ref(), &mut current_batch, &mut retry_count, options.max_retries);
                    flush_deadline = Instant::now() + options.flush_interval;
                }
            }
            Ok(QueueMessage::Signal(Signal::Flush)) => {
                debug!("received odp event flush signal");
                flush_batch(&odp_config, api_client.as_ref(), &mut current_batch, &mut retry_count, options.max_retries);
                flush_deadline = Instant::now() + options.flush_interval;
            }
            Ok(QueueMessage::Signal(Signal::UpdateConfig)) => {
                debug!("received odp event update-config signal");
                flush_batch(&odp_config, api_client.as_ref(), &mut current_batch, &mut retry_count, options.max_retries);
                flush_deadline = Instant::now() + options.flush_interval;
            }
            Ok(QueueMessage::Signal(Signal::Shutdown)) => {
                debug!("received odp event shutdown signal");
                flush_batch(&odp_config, api_client.as_ref(), &mut current_batch, &mut retry_count, options.max_retries);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                if !current_batch.is_empty() {
                    debug!("flushing odp events on interval");
                    flush_batch(&odp_config, api_client.as_ref(), &mut current_batch, &mut retry_count, options.max_retries);
                }
                flush_deadline = Instant::now() + options.flush_interval;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("odp event queue sender dropped; exiting consumer loop");
                flush_batch(&odp_config, api_client.as_ref(), &mut current_batch, &mut retry_count, options.max_retries);
                break;
            }
        }
    }
}

/// Flushes `current_batch` (spec §4.9 "Flush"). Before the first config
/// update (`Undetermined`), the batch is held rather than dropped — it may
/// still turn out to be destined for a real integration once `update_config`
/// resolves the state. Only `NotIntegrated` (config resolved, but ODP isn't
/// configured) discards silently. Otherwise retries in place on a retryable
/// failure up to `max_retries`, or clears the batch on success.
fn flush_batch(
    odp_config: &OdpConfig,
    api_client: &dyn EventApiClient,
    current_batch: &mut Vec<OdpEvent>,
    retry_count: &mut u32,
    max_retries: u32,
) {
    if current_batch.is_empty() {
        return;
    }

    match odp_config.state() {
        OdpConfigState::Undetermined => {
            debug!("odp config not yet resolved; holding batch of {} events", current_batch.len());
            return;
        }
        OdpConfigState::NotIntegrated => {
            debug!("odp is not integrated; discarding batch");
            current_batch.clear();
            *retry_count = 0;
            return;
        }
        OdpConfigState::Integrated => {}
    }

    let api_key = odp_config.api_key();
    let api_host = odp_config.api_host();
    let (api_key, api_host) = match (api_key, api_host) {
        (Some(k), Some(h)) => (k, h),
        _ => {
            current_batch.clear();
            *retry_count = 0;
            return;
        }
    };

    let should_retry = api_client.send_odp_events(&api_key, &api_host, current_batch);

    if should_retry {
        *retry_count += 1;
        if *retry_count > max_retries {
            error!("exhausted retries sending odp event batch; dropping {} events", current_batch.len());
            current_batch.clear();
            *retry_count = 0;
        } else {
            debug!("odp event send failed; will retry on next flush");
        }
        return;
    }

    current_batch.clear();
    *retry_count = 0;
}

#[cfg(test)]
mod event_manager_tests;
