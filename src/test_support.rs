use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::adapters::cloud::{
    ApiEvent, ApiEventSender, CloudApi, CloudError, ConnectMode, Station, StationEvent,
    StationEventSender,
};
use crate::domain::auth::AuthResult;
use crate::domain::models::{
    ChannelLink, DeviceRecord, DeviceSnapshot, StationSnapshot, StreamMetadata, TrustDevice,
};

pub fn station_snapshot(station_sn: &str) -> StationSnapshot {
    StationSnapshot {
        station_sn: station_sn.to_string(),
        station_name: format!("Station {station_sn}"),
        station_model: "T8010".to_string(),
        device_type: 0,
        main_sw_version: "2.1.7.9".to_string(),
        ip_addr: None,
        devices: Vec::new(),
    }
}

/// A camera (device type 9) on `channel` of `station_sn`.
pub fn device_snapshot(device_sn: &str, station_sn: &str, channel: u32) -> DeviceSnapshot {
    DeviceSnapshot {
        device_sn: device_sn.to_string(),
        station_sn: station_sn.to_string(),
        device_type: 9,
        device_channel: channel,
        device_name: format!("Camera {device_sn}"),
        device_model: "T8113".to_string(),
        main_sw_version: String::new(),
    }
}

pub fn linked_station_snapshot(station_sn: &str, devices: &[(&str, u32)]) -> StationSnapshot {
    let mut snapshot = station_snapshot(station_sn);
    snapshot.devices = devices
        .iter()
        .map(|(device_sn, channel)| ChannelLink {
            device_sn: device_sn.to_string(),
            device_channel: *channel,
        })
        .collect();
    snapshot
}

/// Lets spawned tasks and due timers run on the current-thread test runtime.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Default)]
struct FakeStationState {
    connected: bool,
    streaming: HashSet<String>,
    start_calls: usize,
    stop_calls: usize,
    connect_modes: Vec<ConnectMode>,
    camera_info_calls: usize,
    update_flags: Vec<bool>,
}

/// Test-side view of a station opened by [`FakeCloud`].
#[derive(Debug, Clone, Default)]
pub struct FakeStationHandle {
    state: Arc<Mutex<FakeStationState>>,
}

impl FakeStationHandle {
    fn state(&self) -> MutexGuard<'_, FakeStationState> {
        self.state.lock().expect("fake station lock")
    }

    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    /// Ends a stream on the station side without emitting any event.
    pub fn end_stream(&self, device_sn: &str) {
        self.state().streaming.remove(device_sn);
    }

    pub fn start_calls(&self) -> usize {
        self.state().start_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.state().stop_calls
    }

    pub fn connect_modes(&self) -> Vec<ConnectMode> {
        self.state().connect_modes.clone()
    }

    pub fn camera_info_calls(&self) -> usize {
        self.state().camera_info_calls
    }

    pub fn update_flags(&self) -> Vec<bool> {
        self.state().update_flags.clone()
    }
}

struct FakeStation {
    serial: String,
    handle: FakeStationHandle,
    events: StationEventSender,
}

impl FakeStation {
    fn emit(&self, event: StationEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Station for FakeStation {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn is_connected(&self) -> bool {
        self.handle.state().connected
    }

    fn is_live_streaming(&self, device: &DeviceRecord) -> bool {
        self.handle.state().streaming.contains(device.serial())
    }

    async fn start_livestream(&self, device: &DeviceRecord) -> Result<(), CloudError> {
        {
            let mut state = self.handle.state();
            state.start_calls += 1;
            state.streaming.insert(device.serial().to_string());
        }
        self.emit(StationEvent::StartLivestream {
            station_sn: self.serial.clone(),
            channel: device.channel(),
            metadata: StreamMetadata::default(),
            video: Box::pin(tokio::io::empty()),
            audio: Box::pin(tokio::io::empty()),
        });
        Ok(())
    }

    async fn stop_livestream(&self, device: &DeviceRecord) -> Result<(), CloudError> {
        {
            let mut state = self.handle.state();
            state.stop_calls += 1;
            state.streaming.remove(device.serial());
        }
        self.emit(StationEvent::StopLivestream {
            station_sn: self.serial.clone(),
            channel: device.channel(),
        });
        Ok(())
    }

    async fn connect(&self, mode: ConnectMode) -> Result<(), CloudError> {
        {
            let mut state = self.handle.state();
            state.connect_modes.push(mode);
            state.connected = true;
        }
        self.emit(StationEvent::Connect {
            station_sn: self.serial.clone(),
        });
        Ok(())
    }

    async fn get_camera_info(&self) -> Result<(), CloudError> {
        self.handle.state().camera_info_calls += 1;
        Ok(())
    }

    fn update(&mut self, _snapshot: &StationSnapshot, is_new: bool) {
        self.handle.state().update_flags.push(is_new);
    }
}

#[derive(Debug, Default)]
struct FakeCloudState {
    auth_results: VecDeque<AuthResult>,
    auth_calls: usize,
    accepted_codes: Vec<u32>,
    issued_token: Option<(String, DateTime<Utc>)>,
    trust_devices: Vec<TrustDevice>,
    trust_devices_error: Option<String>,
    list_trust_calls: usize,
    hubs: Vec<StationSnapshot>,
    devices: Vec<DeviceSnapshot>,
    update_calls: usize,
    token: Option<String>,
    token_expiration: Option<DateTime<Utc>>,
    trusted_token_expiration: Option<DateTime<Utc>>,
    api_base: Option<String>,
    openudid: Option<String>,
    serial_number: Option<String>,
    stations: HashMap<String, FakeStationHandle>,
}

/// In-memory cloud client. Clones share state, so tests keep a handle after
/// boxing one into the glue.
#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<FakeCloudState>>,
    events: Option<ApiEventSender>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: ApiEventSender) -> Self {
        Self {
            state: Arc::default(),
            events: Some(events),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeCloudState> {
        self.state.lock().expect("fake cloud lock")
    }

    fn emit(&self, event: ApiEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    pub fn set_session(&self, api_base: &str, token: &str, expiration: DateTime<Utc>) {
        let mut state = self.state();
        state.api_base = Some(api_base.to_string());
        state.token = Some(token.to_string());
        state.token_expiration = Some(expiration);
    }

    /// Results returned by successive `authenticate` calls; `Error` once exhausted.
    pub fn script_auth(&self, results: &[AuthResult]) {
        self.state().auth_results = results.iter().copied().collect();
    }

    pub fn issue_token_on_success(&self, token: &str, expiration: DateTime<Utc>) {
        self.state().issued_token = Some((token.to_string(), expiration));
    }

    pub fn accept_codes(&self, codes: &[u32]) {
        self.state().accepted_codes = codes.to_vec();
    }

    pub fn set_trusted_token_expiration(&self, expiration: DateTime<Utc>) {
        self.state().trusted_token_expiration = Some(expiration);
    }

    pub fn set_trust_devices(&self, devices: Vec<TrustDevice>) {
        self.state().trust_devices = devices;
    }

    pub fn fail_trust_devices(&self, message: &str) {
        self.state().trust_devices_error = Some(message.to_string());
    }

    pub fn set_inventory(&self, hubs: Vec<StationSnapshot>, devices: Vec<DeviceSnapshot>) {
        let mut state = self.state();
        state.hubs = hubs;
        state.devices = devices;
    }

    pub fn station(&self, station_sn: &str) -> Option<FakeStationHandle> {
        self.state().stations.get(station_sn).cloned()
    }

    pub fn opened_station_count(&self) -> usize {
        self.state().stations.len()
    }

    pub fn auth_calls(&self) -> usize {
        self.state().auth_calls
    }

    pub fn update_calls(&self) -> usize {
        self.state().update_calls
    }

    pub fn list_trust_calls(&self) -> usize {
        self.state().list_trust_calls
    }

    pub fn identity(&self) -> (Option<String>, Option<String>) {
        let state = self.state();
        (state.openudid.clone(), state.serial_number.clone())
    }

    fn issue_token(&self) {
        let mut state = self.state();
        if let Some((token, expiration)) = state.issued_token.clone() {
            state.token = Some(token);
            state.token_expiration = Some(expiration);
        }
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn authenticate(&mut self) -> Result<AuthResult, CloudError> {
        let result = {
            let mut state = self.state();
            state.auth_calls += 1;
            state.auth_results.pop_front().unwrap_or(AuthResult::Error)
        };
        if result == AuthResult::Ok {
            self.issue_token();
            self.emit(ApiEvent::Connect);
        }
        Ok(result)
    }

    async fn add_trust_device(&mut self, verify_code: u32) -> Result<bool, CloudError> {
        let accepted = self.state().accepted_codes.contains(&verify_code);
        if accepted {
            self.issue_token();
        }
        Ok(accepted)
    }

    async fn list_trust_devices(&self) -> Result<Vec<TrustDevice>, CloudError> {
        let mut state = self.state();
        state.list_trust_calls += 1;
        match &state.trust_devices_error {
            Some(message) => Err(CloudError::Request(message.clone())),
            None => Ok(state.trust_devices.clone()),
        }
    }

    async fn update_device_info(&mut self) -> Result<(), CloudError> {
        let (hubs, devices) = {
            let mut state = self.state();
            state.update_calls += 1;
            (state.hubs.clone(), state.devices.clone())
        };
        self.emit(ApiEvent::Hubs(hubs));
        self.emit(ApiEvent::Devices(devices));
        Ok(())
    }

    fn token(&self) -> Option<String> {
        self.state().token.clone()
    }

    fn set_token(&mut self, token: &str) {
        self.state().token = Some(token.to_string());
    }

    fn token_expiration(&self) -> Option<DateTime<Utc>> {
        self.state().token_expiration
    }

    fn set_token_expiration(&mut self, expiration: DateTime<Utc>) {
        self.state().token_expiration = Some(expiration);
    }

    fn trusted_token_expiration(&self) -> Option<DateTime<Utc>> {
        self.state().trusted_token_expiration
    }

    fn api_base(&self) -> Option<String> {
        self.state().api_base.clone()
    }

    fn set_api_base(&mut self, api_base: &str) {
        self.state().api_base = Some(api_base.to_string());
    }

    fn set_openudid(&mut self, openudid: &str) {
        self.state().openudid = Some(openudid.to_string());
    }

    fn set_serial_number(&mut self, serial_number: &str) {
        self.state().serial_number = Some(serial_number.to_string());
    }

    fn open_station(
        &self,
        snapshot: &StationSnapshot,
        events: StationEventSender,
    ) -> Box<dyn Station> {
        let handle = FakeStationHandle::default();
        self.state()
            .stations
            .insert(snapshot.station_sn.clone(), handle.clone());

        Box::new(FakeStation {
            serial: snapshot.station_sn.clone(),
            handle,
            events,
        })
    }
}
