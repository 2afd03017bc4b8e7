use thiserror::Error;

use crate::adapters::cloud::{MediaStream, StationEvent};
use crate::domain::models::{DeviceRecord, StreamMetadata};
use crate::glue::error::GlueError;
use crate::glue::registry::Registry;

/// Station events with the channel number replaced by the resolved device.
pub enum GlueEvent {
    Connect {
        station_sn: String,
    },
    Close {
        station_sn: String,
    },
    StartLivestream {
        station_sn: String,
        device: DeviceRecord,
        metadata: StreamMetadata,
        video: MediaStream,
        audio: MediaStream,
    },
    StopLivestream {
        station_sn: String,
        device: DeviceRecord,
    },
}

impl GlueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Close { .. } => "close",
            Self::StartLivestream { .. } => "start_livestream",
            Self::StopLivestream { .. } => "stop_livestream",
        }
    }

    pub fn device(&self) -> Option<&DeviceRecord> {
        match self {
            Self::StartLivestream { device, .. } | Self::StopLivestream { device, .. } => {
                Some(device)
            }
            Self::Connect { .. } | Self::Close { .. } => None,
        }
    }
}

impl std::fmt::Debug for GlueEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("GlueEvent");
        out.field("name", &self.name());
        match self {
            Self::Connect { station_sn } | Self::Close { station_sn } => {
                out.field("station_sn", station_sn);
            }
            Self::StartLivestream {
                station_sn,
                device,
                metadata,
                ..
            } => {
                out.field("station_sn", station_sn)
                    .field("device_sn", &device.serial())
                    .field("metadata", metadata);
            }
            Self::StopLivestream { station_sn, device } => {
                out.field("station_sn", station_sn)
                    .field("device_sn", &device.serial());
            }
        }
        out.finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
#[error("cannot relay {event} from station {station_sn}: {source}")]
pub struct RelayError {
    pub event: &'static str,
    pub station_sn: String,
    #[source]
    pub source: GlueError,
}

/// Maps one station event against the current registry contents.
pub fn relay(registry: &Registry, event: StationEvent) -> Result<GlueEvent, RelayError> {
    let resolve = |station_sn: &str, channel: u32, name: &'static str| {
        registry
            .get_device_by_channel(station_sn, channel)
            .cloned()
            .map_err(|source| RelayError {
                event: name,
                station_sn: station_sn.to_string(),
                source,
            })
    };

    match event {
        StationEvent::Connect { station_sn } => Ok(GlueEvent::Connect { station_sn }),
        StationEvent::Close { station_sn } => Ok(GlueEvent::Close { station_sn }),
        StationEvent::StartLivestream {
            station_sn,
            channel,
            metadata,
            video,
            audio,
        } => {
            let device = resolve(&station_sn, channel, "start_livestream")?;
            Ok(GlueEvent::StartLivestream {
                station_sn,
                device,
                metadata,
                video,
                audio,
            })
        }
        StationEvent::StopLivestream {
            station_sn,
            channel,
        } => {
            let device = resolve(&station_sn, channel, "stop_livestream")?;
            Ok(GlueEvent::StopLivestream { station_sn, device })
        }
    }
}
