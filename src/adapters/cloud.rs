use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use crate::domain::auth::AuthResult;
use crate::domain::models::{
    DeviceRecord, DeviceSnapshot, StationSnapshot, StreamMetadata, TrustDevice,
};

pub type MediaStream = Pin<Box<dyn AsyncRead + Send>>;

pub type ApiEventSender = mpsc::UnboundedSender<ApiEvent>;
pub type ApiEventReceiver = mpsc::UnboundedReceiver<ApiEvent>;
pub type StationEventSender = mpsc::UnboundedSender<StationEvent>;
pub type StationEventReceiver = mpsc::UnboundedReceiver<StationEvent>;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("cloud request failed: {0}")]
    Request(String),
    #[error("station {0} is not connected")]
    StationDisconnected(String),
    #[error("invalid debug script: {0}")]
    Script(String),
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse debug script: {0}")]
    Json(#[from] serde_json::Error),
}

/// Emissions of the cloud API client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiEvent {
    Hubs(Vec<StationSnapshot>),
    Devices(Vec<DeviceSnapshot>),
    Connect,
    Close,
}

/// Emissions of a single station. Livestream events only know the channel.
pub enum StationEvent {
    Connect {
        station_sn: String,
    },
    Close {
        station_sn: String,
    },
    StartLivestream {
        station_sn: String,
        channel: u32,
        metadata: StreamMetadata,
        video: MediaStream,
        audio: MediaStream,
    },
    StopLivestream {
        station_sn: String,
        channel: u32,
    },
}

impl StationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Close { .. } => "close",
            Self::StartLivestream { .. } => "start_livestream",
            Self::StopLivestream { .. } => "stop_livestream",
        }
    }

    pub fn station_sn(&self) -> &str {
        match self {
            Self::Connect { station_sn }
            | Self::Close { station_sn }
            | Self::StartLivestream { station_sn, .. }
            | Self::StopLivestream { station_sn, .. } => station_sn,
        }
    }
}

impl std::fmt::Debug for StationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("StationEvent");
        out.field("name", &self.name())
            .field("station_sn", &self.station_sn());
        match self {
            Self::StartLivestream {
                channel, metadata, ..
            } => out.field("channel", channel).field("metadata", metadata),
            Self::StopLivestream { channel, .. } => out.field("channel", channel),
            _ => &mut out,
        };
        out.finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Keep an existing P2P session if the station already has one.
    Reuse,
    ForceReconnect,
}

#[async_trait]
pub trait Station: Send + Sync {
    fn serial(&self) -> &str;
    fn is_connected(&self) -> bool;
    fn is_live_streaming(&self, device: &DeviceRecord) -> bool;
    async fn start_livestream(&self, device: &DeviceRecord) -> Result<(), CloudError>;
    async fn stop_livestream(&self, device: &DeviceRecord) -> Result<(), CloudError>;
    async fn connect(&self, mode: ConnectMode) -> Result<(), CloudError>;
    async fn get_camera_info(&self) -> Result<(), CloudError>;
    fn update(&mut self, snapshot: &StationSnapshot, is_new: bool);
}

/// The vendor cloud client. Implementations deliver `hubs`/`devices`/`connect`/`close`
/// through the `ApiEventSender` they were built with.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn authenticate(&mut self) -> Result<AuthResult, CloudError>;
    async fn add_trust_device(&mut self, verify_code: u32) -> Result<bool, CloudError>;
    async fn list_trust_devices(&self) -> Result<Vec<TrustDevice>, CloudError>;
    async fn update_device_info(&mut self) -> Result<(), CloudError>;

    fn token(&self) -> Option<String>;
    fn set_token(&mut self, token: &str);
    fn token_expiration(&self) -> Option<DateTime<Utc>>;
    fn set_token_expiration(&mut self, expiration: DateTime<Utc>);
    fn trusted_token_expiration(&self) -> Option<DateTime<Utc>>;
    fn api_base(&self) -> Option<String>;
    fn set_api_base(&mut self, api_base: &str);
    fn set_openudid(&mut self, openudid: &str);
    fn set_serial_number(&mut self, serial_number: &str);

    fn open_station(
        &self,
        snapshot: &StationSnapshot,
        events: StationEventSender,
    ) -> Box<dyn Station>;
}
