use std::collections::HashMap;

use crate::adapters::cloud::{CloudApi, Station, StationEventSender};
use crate::domain::models::{DeviceRecord, DeviceSnapshot, StationSnapshot};
use crate::glue::error::GlueError;

pub struct StationRecord {
    snapshot: StationSnapshot,
    station: Box<dyn Station>,
}

impl StationRecord {
    pub fn serial(&self) -> &str {
        &self.snapshot.station_sn
    }

    pub fn snapshot(&self) -> &StationSnapshot {
        &self.snapshot
    }

    pub fn station(&self) -> &dyn Station {
        self.station.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.station.is_connected()
    }

    /// Channel the station reports for `device_sn`, if it hosts that device.
    pub fn channel_of(&self, device_sn: &str) -> Option<u32> {
        self.snapshot
            .devices
            .iter()
            .find(|link| link.device_sn == device_sn)
            .map(|link| link.device_channel)
    }

    fn update(&mut self, snapshot: StationSnapshot) {
        self.station.update(&snapshot, false);
        self.snapshot = snapshot;
    }
}

impl std::fmt::Debug for StationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationRecord")
            .field("snapshot", &self.snapshot)
            .field("connected", &self.station.is_connected())
            .finish()
    }
}

/// Stations and devices discovered during this run, keyed by serial.
#[derive(Debug, Default)]
pub struct Registry {
    stations: HashMap<String, StationRecord>,
    devices: HashMap<String, DeviceRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates known stations in place and opens new ones wired to `events`.
    /// Returns the number of newly registered stations.
    pub fn apply_station_snapshot(
        &mut self,
        snapshots: Vec<StationSnapshot>,
        cloud: &dyn CloudApi,
        events: &StationEventSender,
    ) -> usize {
        tracing::debug!(stations = snapshots.len(), "applying station snapshot");

        let mut created = 0;
        for snapshot in snapshots {
            if let Some(record) = self.stations.get_mut(&snapshot.station_sn) {
                record.update(snapshot);
                continue;
            }

            let mut station = cloud.open_station(&snapshot, events.clone());
            station.update(&snapshot, true);
            tracing::info!(
                station_sn = %snapshot.station_sn,
                station_name = %snapshot.station_name,
                "registered station"
            );
            self.stations
                .insert(snapshot.station_sn.clone(), StationRecord { snapshot, station });
            created += 1;
        }

        created
    }

    /// Same update-or-create policy as stations. Returns the number of new devices.
    pub fn apply_device_snapshot(&mut self, snapshots: Vec<DeviceSnapshot>) -> usize {
        tracing::debug!(devices = snapshots.len(), "applying device snapshot");

        let mut created = 0;
        for snapshot in snapshots {
            if let Some(record) = self.devices.get_mut(&snapshot.device_sn) {
                record.update(snapshot);
                continue;
            }

            let record = DeviceRecord::new(snapshot);
            tracing::info!(
                device_sn = %record.serial(),
                station_sn = %record.station_serial(),
                kind = %record.kind(),
                "registered device"
            );
            self.devices.insert(record.serial().to_string(), record);
            created += 1;
        }

        created
    }

    pub fn get_station(&self, serial: &str) -> Result<&StationRecord, GlueError> {
        self.stations
            .get(serial)
            .ok_or_else(|| GlueError::StationNotFound(serial.to_string()))
    }

    pub fn get_device(&self, serial: &str) -> Result<&DeviceRecord, GlueError> {
        self.devices
            .get(serial)
            .ok_or_else(|| GlueError::DeviceNotFound(serial.to_string()))
    }

    pub fn get_camera(&self, serial: &str) -> Result<&DeviceRecord, GlueError> {
        let device = self.get_device(serial)?;
        if !device.is_camera() {
            return Err(GlueError::NotACamera {
                serial: serial.to_string(),
                kind: device.kind(),
            });
        }
        Ok(device)
    }

    /// Resolves the device behind a station channel. A station that is its own
    /// device (standalone cameras) matches on any channel.
    pub fn get_device_by_channel(
        &self,
        station_sn: &str,
        channel: u32,
    ) -> Result<&DeviceRecord, GlueError> {
        let mut own_device = None;
        for device in self
            .devices
            .values()
            .filter(|device| device.station_serial() == station_sn)
        {
            if device.channel() == channel {
                return Ok(device);
            }
            if device.serial() == station_sn {
                own_device = Some(device);
            }
        }

        own_device.ok_or_else(|| GlueError::ChannelNotFound {
            station_sn: station_sn.to_string(),
            channel,
        })
    }

    pub fn stations(&self) -> impl Iterator<Item = &StationRecord> {
        self.stations.values()
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}
