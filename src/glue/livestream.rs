use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::models::DeviceRecord;
use crate::glue::error::GlueError;
use crate::glue::registry::Registry;

pub const DEFAULT_MAX_LIVESTREAM_DURATION: Duration = Duration::from_secs(30);

pub type ExpirySender = mpsc::UnboundedSender<LivestreamExpiry>;
pub type ExpiryReceiver = mpsc::UnboundedReceiver<LivestreamExpiry>;

/// Fired by an auto-stop timer. Only honoured while `generation` is still the armed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivestreamExpiry {
    pub device_sn: String,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Started,
    Stopped,
    AlreadyStreaming,
    StationDisconnected,
    NotStreaming,
}

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Starts livestreams on demand and stops each one after `max_duration`.
///
/// A timer is armed exactly while the guard believes a stream it started is
/// live. Expiries are delivered through the channel given to [`LivestreamGuard::new`]
/// and must be fed back via [`LivestreamGuard::on_expiry`].
#[derive(Debug)]
pub struct LivestreamGuard {
    max_duration: Duration,
    timers: HashMap<String, ArmedTimer>,
    expiries: ExpirySender,
    next_generation: u64,
}

impl LivestreamGuard {
    pub fn new(max_duration: Duration, expiries: ExpirySender) -> Self {
        Self {
            max_duration,
            timers: HashMap::new(),
            expiries,
            next_generation: 0,
        }
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    pub async fn start(
        &mut self,
        registry: &Registry,
        device: &DeviceRecord,
    ) -> Result<StreamOutcome, GlueError> {
        let station = registry.get_station(device.station_serial())?;

        if !station.is_connected() {
            tracing::warn!(
                device_sn = %device.serial(),
                station_sn = %station.serial(),
                "cannot start livestream, station is not connected"
            );
            return Ok(StreamOutcome::StationDisconnected);
        }

        if station.station().is_live_streaming(device) {
            tracing::warn!(
                device_sn = %device.serial(),
                "cannot start livestream, device is already streaming"
            );
            return Ok(StreamOutcome::AlreadyStreaming);
        }

        station.station().start_livestream(device).await?;
        // A timer left over from a stream that ended unnoticed is replaced here.
        self.arm(device.serial());

        tracing::info!(
            device_sn = %device.serial(),
            max_duration_secs = self.max_duration.as_secs(),
            "livestream started"
        );
        Ok(StreamOutcome::Started)
    }

    pub async fn stop(
        &mut self,
        registry: &Registry,
        device: &DeviceRecord,
    ) -> Result<StreamOutcome, GlueError> {
        let station = registry.get_station(device.station_serial())?;
        self.disarm(device.serial());

        if !station.is_connected() {
            tracing::debug!(
                device_sn = %device.serial(),
                "skipping livestream stop, station is not connected"
            );
            return Ok(StreamOutcome::StationDisconnected);
        }

        if !station.station().is_live_streaming(device) {
            tracing::debug!(
                device_sn = %device.serial(),
                "skipping livestream stop, device is not streaming"
            );
            return Ok(StreamOutcome::NotStreaming);
        }

        station.station().stop_livestream(device).await?;
        tracing::info!(device_sn = %device.serial(), "livestream stopped");
        Ok(StreamOutcome::Stopped)
    }

    /// Stops the stream whose timer fired. Stale expiries (timer replaced or
    /// cleared since it fired) are ignored and yield `None`.
    pub async fn on_expiry(
        &mut self,
        registry: &Registry,
        expiry: LivestreamExpiry,
    ) -> Result<Option<StreamOutcome>, GlueError> {
        match self.timers.get(&expiry.device_sn) {
            Some(timer) if timer.generation == expiry.generation => {}
            _ => {
                tracing::debug!(device_sn = %expiry.device_sn, "ignoring stale livestream expiry");
                return Ok(None);
            }
        }

        self.timers.remove(&expiry.device_sn);
        tracing::info!(
            device_sn = %expiry.device_sn,
            "maximum livestream duration reached"
        );

        let device = registry.get_device(&expiry.device_sn)?;
        self.stop(registry, device).await.map(Some)
    }

    /// Forgets the timer of a stream that ended without going through `stop`.
    pub fn release(&mut self, device_sn: &str) -> bool {
        self.disarm(device_sn)
    }

    pub fn is_armed(&self, device_sn: &str) -> bool {
        self.timers.contains_key(device_sn)
    }

    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }

    fn arm(&mut self, device_sn: &str) {
        self.disarm(device_sn);

        self.next_generation += 1;
        let expiry = LivestreamExpiry {
            device_sn: device_sn.to_string(),
            generation: self.next_generation,
        };
        let expiries = self.expiries.clone();
        let deadline = tokio::time::Instant::now() + self.max_duration;

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if expiries.send(expiry).is_err() {
                tracing::debug!("livestream expiry receiver dropped");
            }
        });

        self.timers.insert(
            device_sn.to_string(),
            ArmedTimer {
                generation: self.next_generation,
                handle,
            },
        );
    }

    fn disarm(&mut self, device_sn: &str) -> bool {
        match self.timers.remove(device_sn) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for LivestreamGuard {
    fn drop(&mut self) {
        for timer in self.timers.values() {
            timer.handle.abort();
        }
    }
}
