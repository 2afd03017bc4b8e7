//! Orchestration over the cloud client: session bootstrap, device discovery
//! and livestream lifecycle.
//!
//! Everything runs on one task. [`EufyGlue::next_event`] is the event loop:
//! it applies API snapshots, relays station events and handles livestream
//! expiries in arrival order. Snapshots emitted while an awaited cloud call is
//! in flight stay queued and are applied once that call settles.

pub mod error;
pub mod livestream;
pub mod registry;
pub mod relay;

use std::time::Duration;

use tokio::sync::mpsc;

use crate::adapters::cloud::{
    ApiEvent, ApiEventReceiver, CloudApi, ConnectMode, StationEvent, StationEventReceiver,
    StationEventSender,
};
use crate::adapters::session_file::SessionCache;
use crate::domain::auth::{AuthResult, AuthState};
use crate::domain::models::TrustDevice;

pub use error::GlueError;
pub use livestream::{LivestreamExpiry, StreamOutcome};
pub use relay::GlueEvent;

use livestream::{ExpiryReceiver, LivestreamGuard};
use registry::Registry;
use relay::relay;

/// Station `connect` never forces a fresh P2P session.
pub const STATION_CONNECT_MODE: ConnectMode = ConnectMode::Reuse;

enum LoopInput {
    Api(ApiEvent),
    Station(StationEvent),
    Expiry(LivestreamExpiry),
}

pub struct EufyGlue {
    api: Box<dyn CloudApi>,
    api_events: ApiEventReceiver,
    cache: SessionCache,
    registry: Registry,
    guard: LivestreamGuard,
    auth_state: AuthState,
    station_events_tx: StationEventSender,
    station_events: StationEventReceiver,
    expiries: ExpiryReceiver,
}

impl EufyGlue {
    /// `api_events` must be the receiving end of the channel `api` emits into.
    pub fn new(
        mut api: Box<dyn CloudApi>,
        api_events: ApiEventReceiver,
        cache: SessionCache,
        max_livestream_duration: Duration,
    ) -> Self {
        let record = cache.load();

        if let Some(api_base) = record.api_base.as_deref() {
            api.set_api_base(api_base);
        }
        if let Some((token, expiration)) = record.cached_token() {
            tracing::debug!(token_expiration = %expiration, "restoring cached cloud token");
            api.set_token(token);
            api.set_token_expiration(expiration);
        }
        api.set_openudid(&record.openudid);
        api.set_serial_number(&record.serial_number);

        let (station_events_tx, station_events) = mpsc::unbounded_channel();
        let (expiry_tx, expiries) = mpsc::unbounded_channel();

        Self {
            api,
            api_events,
            cache,
            registry: Registry::new(),
            guard: LivestreamGuard::new(max_livestream_duration, expiry_tx),
            auth_state: AuthState::Unauthenticated,
            station_events_tx,
            station_events,
            expiries,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth_state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn api(&self) -> &dyn CloudApi {
        self.api.as_ref()
    }

    pub fn is_livestream_armed(&self, device_sn: &str) -> bool {
        self.guard.is_armed(device_sn)
    }

    /// Authenticates, or submits a trusted-device verification code when one is given.
    pub async fn logon(&mut self, verify_code: Option<u32>) -> AuthState {
        match verify_code {
            Some(code) => self.submit_verify_code(code).await,
            None => self.authenticate_flow().await,
        }

        if self.auth_state.is_authenticated() {
            self.on_connect().await;
        }

        self.auth_state
    }

    async fn submit_verify_code(&mut self, code: u32) {
        match self.api.add_trust_device(code).await {
            Ok(true) => {
                tracing::info!("verification code accepted");
                self.auth_state = AuthState::Authenticated;
            }
            Ok(false) => {
                tracing::warn!("verification code invalid");
            }
            Err(error) => {
                tracing::error!(error = %error, "failed to submit verification code");
            }
        }
    }

    async fn authenticate_flow(&mut self) {
        self.auth_state = match self.authenticate().await {
            AuthResult::Ok => {
                tracing::info!("authenticated");
                AuthState::Authenticated
            }
            AuthResult::SendVerifyCode => {
                tracing::info!("verification code sent, call logon again with the code");
                AuthState::AwaitingVerification
            }
            AuthResult::Renew => {
                tracing::debug!("token renewal requested, authenticating once more");
                match self.authenticate().await {
                    AuthResult::Ok => AuthState::Authenticated,
                    other => {
                        tracing::warn!(result = ?other, "authentication after renewal did not succeed");
                        AuthState::Unauthenticated
                    }
                }
            }
            AuthResult::Error => {
                tracing::error!("authentication failed");
                AuthState::Failed
            }
        };
    }

    async fn authenticate(&mut self) -> AuthResult {
        match self.api.authenticate().await {
            Ok(result) => result,
            Err(error) => {
                tracing::error!(error = %error, "authenticate call failed");
                AuthResult::Error
            }
        }
    }

    /// Pulls fresh station/device info and applies the snapshots it produced.
    pub async fn refresh_data(&mut self) {
        if let Err(error) = self.api.update_device_info().await {
            tracing::warn!(error = %error, "failed to update device info");
        }
        self.drain_api_events();

        for station in self.registry.stations() {
            if !station.is_connected() {
                continue;
            }
            if let Err(error) = station.station().get_camera_info().await {
                tracing::warn!(
                    station_sn = %station.serial(),
                    error = %error,
                    "failed to refresh camera info"
                );
            }
        }
    }

    async fn on_connect(&mut self) {
        tracing::debug!("running post-authentication setup");
        self.refresh_data().await;
        self.extend_token_if_trusted().await;

        self.cache.save_from_api(self.api.as_ref());

        for station in self.registry.stations() {
            if let Err(error) = station.station().connect(STATION_CONNECT_MODE).await {
                tracing::warn!(
                    station_sn = %station.serial(),
                    error = %error,
                    "failed to connect station"
                );
            }
        }
    }

    async fn extend_token_if_trusted(&mut self) {
        let Some(trusted_expiration) = self.api.trusted_token_expiration() else {
            return;
        };
        if self.api.token_expiration() == Some(trusted_expiration) {
            return;
        }

        match self.api.list_trust_devices().await {
            Ok(devices) if devices.iter().any(TrustDevice::is_current) => {
                self.api.set_token_expiration(trusted_expiration);
                tracing::debug!(
                    token_expiration = %trusted_expiration,
                    "this device is trusted, token expiration extended"
                );
            }
            Ok(_) => {}
            Err(error) => {
                tracing::error!(error = %error, "failed to list trusted devices");
            }
        }
    }

    pub async fn start_livestream(&mut self, device_sn: &str) -> Result<StreamOutcome, GlueError> {
        let camera = self.registry.get_camera(device_sn)?;
        self.guard.start(&self.registry, camera).await
    }

    pub async fn stop_livestream(&mut self, device_sn: &str) -> Result<StreamOutcome, GlueError> {
        let device = self.registry.get_device(device_sn)?;
        self.guard.stop(&self.registry, device).await
    }

    /// Runs the loop until a relayed event is ready. API snapshots are applied
    /// before station events that arrived in the same turn.
    ///
    /// The glue owns the station and expiry senders, so this never runs out of
    /// sources; callers stop by dropping the glue. Not cancel-safe: dropping the
    /// future while an expired livestream is being stopped loses that stop
    /// request, so follow up with [`EufyGlue::stop_livestream`] if needed.
    pub async fn next_event(&mut self) -> GlueEvent {
        loop {
            let input = tokio::select! {
                biased;
                Some(event) = self.api_events.recv() => LoopInput::Api(event),
                Some(event) = self.station_events.recv() => LoopInput::Station(event),
                Some(expiry) = self.expiries.recv() => LoopInput::Expiry(expiry),
                // station and expiry senders live in `self`
                else => std::future::pending::<LoopInput>().await,
            };

            match input {
                LoopInput::Api(event) => self.handle_api_event(event),
                LoopInput::Station(event) => {
                    if let Some(event) = self.handle_station_event(event) {
                        return event;
                    }
                }
                LoopInput::Expiry(expiry) => {
                    if let Err(error) = self.guard.on_expiry(&self.registry, expiry).await {
                        tracing::warn!(error = %error, "failed to stop expired livestream");
                    }
                }
            }
        }
    }

    fn drain_api_events(&mut self) {
        while let Ok(event) = self.api_events.try_recv() {
            self.handle_api_event(event);
        }
    }

    fn handle_api_event(&mut self, event: ApiEvent) {
        match event {
            ApiEvent::Hubs(hubs) => {
                self.registry.apply_station_snapshot(
                    hubs,
                    self.api.as_ref(),
                    &self.station_events_tx,
                );
            }
            ApiEvent::Devices(devices) => {
                self.registry.apply_device_snapshot(devices);
            }
            ApiEvent::Connect => tracing::debug!("cloud api connected"),
            ApiEvent::Close => tracing::debug!("cloud api closed"),
        }
    }

    fn handle_station_event(&mut self, event: StationEvent) -> Option<GlueEvent> {
        match relay(&self.registry, event) {
            Ok(event) => {
                if let GlueEvent::StopLivestream { device, .. } = &event {
                    self.guard.release(device.serial());
                }
                tracing::debug!(event = ?event, "relaying station event");
                Some(event)
            }
            Err(error) => {
                tracing::warn!(error = %error, "dropping station event");
                None
            }
        }
    }
}
