//! Per-channel liveness monitor.
//!
//! A monitor ticks every `interval` on its own task. Each tick it compares
//! the time since the last [`Beater::beat`] against `timeout`: under the
//! limit it emits [`HeartbeatSignal::Tick`] (the owner answers by sending a
//! heartbeat), over the limit it emits [`HeartbeatSignal::Timeout`] once and
//! stops.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::kind::ChannelKind;

static NEXT_MONITOR_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one monitor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorId(u64);

impl MonitorId {
    fn next() -> Self {
        Self(NEXT_MONITOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hb-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatSignal {
    /// Interval elapsed; send a heartbeat.
    Tick,
    /// Silence exceeded the timeout. The monitor has stopped.
    Timeout,
}

/// Event emitted by a running monitor.
///
/// Receivers check `monitor` against the monitor they currently own, so a
/// late event from a replaced monitor is never mistaken for a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatEvent {
    pub channel: ChannelKind,
    pub monitor: MonitorId,
    pub signal: HeartbeatSignal,
}

/// Cloneable handle that records inbound traffic for a monitor.
#[derive(Debug, Clone)]
pub struct Beater {
    last_beat: Arc<Mutex<Instant>>,
}

impl Beater {
    pub fn beat(&self) {
        *self.last_beat.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }
}

pub struct HeartbeatMonitor {
    id: MonitorId,
    channel: ChannelKind,
    interval: Duration,
    timeout: Duration,
    last_beat: Arc<Mutex<Instant>>,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatMonitor {
    /// Create a stopped monitor. `timeout` must be strictly greater than a
    /// non-zero `interval`.
    pub fn new(channel: ChannelKind, interval: Duration, timeout: Duration) -> Result<Self> {
        if interval.is_zero() || timeout <= interval {
            return Err(SessionError::InvalidConfig(format!(
                "heartbeat timeout ({timeout:?}) must exceed a non-zero interval ({interval:?})"
            )));
        }
        Ok(Self {
            id: MonitorId::next(),
            channel,
            interval,
            timeout,
            last_beat: Arc::new(Mutex::new(Instant::now())),
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        })
    }

    pub fn id(&self) -> MonitorId {
        self.id
    }

    pub fn channel(&self) -> ChannelKind {
        self.channel
    }

    /// Begin ticking. Resets the last beat to now. No-op while running.
    pub fn start(&mut self, events: mpsc::UnboundedSender<HeartbeatEvent>) {
        if self.is_running() {
            return;
        }
        self.beater().beat();
        self.running.store(true, Ordering::SeqCst);

        let id = self.id;
        let channel = self.channel;
        let interval = self.interval;
        let timeout = self.timeout;
        let last_beat = Arc::clone(&self.last_beat);
        let running = Arc::clone(&self.running);

        debug!(%channel, monitor = %id, ?interval, ?timeout, "heartbeat monitor started");
        self.task = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let silent = last_beat
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .elapsed();
                let signal = if silent > timeout {
                    HeartbeatSignal::Timeout
                } else {
                    HeartbeatSignal::Tick
                };
                if signal == HeartbeatSignal::Timeout {
                    running.store(false, Ordering::SeqCst);
                    debug!(%channel, monitor = %id, ?silent, "heartbeat timed out");
                }
                let delivered = events
                    .send(HeartbeatEvent {
                        channel,
                        monitor: id,
                        signal,
                    })
                    .is_ok();
                if !delivered || signal == HeartbeatSignal::Timeout {
                    running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }));
    }

    /// Record traffic from the peer.
    pub fn beat(&self) {
        self.beater().beat();
    }

    /// Handle for the receive path, which runs on another task.
    pub fn beater(&self) -> Beater {
        Beater {
            last_beat: Arc::clone(&self.last_beat),
        }
    }

    /// Stop ticking. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(channel = %self.channel, monitor = %self.id, "heartbeat monitor stopped");
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for HeartbeatMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeartbeatMonitor")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("running", &self.is_running())
            .finish()
    }
}
