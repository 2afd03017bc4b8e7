use thiserror::Error;

use crate::adapters::cloud::CloudError;
use crate::domain::models::DeviceKind;

#[derive(Debug, Error)]
pub enum GlueError {
    #[error("unknown station serial: {0}")]
    StationNotFound(String),
    #[error("unknown device serial: {0}")]
    DeviceNotFound(String),
    #[error("no device with channel {channel} found on station {station_sn}")]
    ChannelNotFound { station_sn: String, channel: u32 },
    #[error("device {serial} is a {kind}, not a camera")]
    NotACamera { serial: String, kind: DeviceKind },
    #[error("station call failed: {0}")]
    Cloud(#[from] CloudError),
}

impl GlueError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StationNotFound(_) | Self::DeviceNotFound(_) | Self::ChannelNotFound { .. }
        )
    }
}
