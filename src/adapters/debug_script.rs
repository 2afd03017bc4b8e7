use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::adapters::cloud::{
    ApiEvent, ApiEventSender, CloudApi, CloudError, ConnectMode, MediaStream, Station,
    StationEvent, StationEventSender,
};
use crate::domain::auth::AuthResult;
use crate::domain::models::{
    DeviceRecord, DeviceSnapshot, StationSnapshot, StreamMetadata, TrustDevice,
};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ScriptAuth {
    Ok,
    SendVerifyCode,
    Renew,
    Error,
}

impl From<ScriptAuth> for AuthResult {
    fn from(value: ScriptAuth) -> Self {
        match value {
            ScriptAuth::Ok => Self::Ok,
            ScriptAuth::SendVerifyCode => Self::SendVerifyCode,
            ScriptAuth::Renew => Self::Renew,
            ScriptAuth::Error => Self::Error,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ScriptFile {
    auth: Vec<ScriptAuth>,
    #[serde(default)]
    verify_codes: Vec<u32>,
    #[serde(default)]
    api_base: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    token_expiration: Option<i64>,
    #[serde(default)]
    trusted_token_expiration: Option<i64>,
    #[serde(default)]
    trust_devices: Vec<TrustDevice>,
    #[serde(default)]
    trust_devices_error: Option<String>,
    #[serde(default)]
    hubs: Vec<StationSnapshot>,
    #[serde(default)]
    devices: Vec<DeviceSnapshot>,
    #[serde(default)]
    livestreams: HashMap<String, LivestreamScript>,
}

#[derive(Debug, Clone, Deserialize)]
struct LivestreamScript {
    payload: PathBuf,
    #[serde(default)]
    metadata: StreamMetadata,
}

/// Replays a JSON script in place of the vendor cloud client.
pub struct ScriptedCloudApi {
    script: ScriptFile,
    auth_queue: VecDeque<AuthResult>,
    last_auth: AuthResult,
    events: ApiEventSender,
    token: Option<String>,
    token_expiration: Option<DateTime<Utc>>,
    api_base: Option<String>,
    openudid: Option<String>,
    serial_number: Option<String>,
}

impl ScriptedCloudApi {
    pub fn from_file(path: &Path, events: ApiEventSender) -> Result<Self, CloudError> {
        let content = fs::read_to_string(path)?;
        let mut script: ScriptFile = serde_json::from_str(&content)?;

        if script.auth.is_empty() {
            return Err(CloudError::Script(
                "script must contain at least one auth result".to_string(),
            ));
        }

        let hub_serials: HashSet<&str> = script
            .hubs
            .iter()
            .map(|hub| hub.station_sn.as_str())
            .collect();
        if let Some(orphan) = script
            .devices
            .iter()
            .find(|device| !hub_serials.contains(device.station_sn.as_str()))
        {
            return Err(CloudError::Script(format!(
                "device {} references unknown station {}",
                orphan.device_sn, orphan.station_sn
            )));
        }

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        for livestream in script.livestreams.values_mut() {
            if livestream.payload.is_relative() {
                livestream.payload = base_dir.join(&livestream.payload);
            }
        }

        let auth_queue: VecDeque<AuthResult> =
            script.auth.iter().copied().map(AuthResult::from).collect();
        let last_auth = auth_queue.back().copied().unwrap_or(AuthResult::Error);

        Ok(Self {
            api_base: script.api_base.clone(),
            script,
            auth_queue,
            last_auth,
            events,
            token: None,
            token_expiration: None,
            openudid: None,
            serial_number: None,
        })
    }

    fn next_auth(&mut self) -> AuthResult {
        self.auth_queue.pop_front().unwrap_or(self.last_auth)
    }

    fn issue_token(&mut self) {
        if let Some(token) = self.script.token.clone() {
            self.token = Some(token);
        }
        if let Some(expiration) = self
            .script
            .token_expiration
            .and_then(DateTime::<Utc>::from_timestamp_millis)
        {
            self.token_expiration = Some(expiration);
        }
    }

    fn emit(&self, event: ApiEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("api event receiver dropped");
        }
    }
}

#[async_trait]
impl CloudApi for ScriptedCloudApi {
    async fn authenticate(&mut self) -> Result<AuthResult, CloudError> {
        let result = self.next_auth();
        tracing::debug!(
            result = ?result,
            openudid = ?self.openudid,
            serial_number = ?self.serial_number,
            "scripted authenticate"
        );

        if result == AuthResult::Ok {
            self.issue_token();
            self.emit(ApiEvent::Connect);
        }

        Ok(result)
    }

    async fn add_trust_device(&mut self, verify_code: u32) -> Result<bool, CloudError> {
        let accepted = self.script.verify_codes.contains(&verify_code);
        if accepted {
            self.issue_token();
            self.emit(ApiEvent::Connect);
        }
        Ok(accepted)
    }

    async fn list_trust_devices(&self) -> Result<Vec<TrustDevice>, CloudError> {
        match &self.script.trust_devices_error {
            Some(error) => Err(CloudError::Request(error.clone())),
            None => Ok(self.script.trust_devices.clone()),
        }
    }

    async fn update_device_info(&mut self) -> Result<(), CloudError> {
        self.emit(ApiEvent::Hubs(self.script.hubs.clone()));
        self.emit(ApiEvent::Devices(self.script.devices.clone()));
        Ok(())
    }

    fn token(&self) -> Option<String> {
        self.token.clone()
    }

    fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    fn token_expiration(&self) -> Option<DateTime<Utc>> {
        self.token_expiration
    }

    fn set_token_expiration(&mut self, expiration: DateTime<Utc>) {
        self.token_expiration = Some(expiration);
    }

    fn trusted_token_expiration(&self) -> Option<DateTime<Utc>> {
        self.script
            .trusted_token_expiration
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    fn api_base(&self) -> Option<String> {
        self.api_base.clone()
    }

    fn set_api_base(&mut self, api_base: &str) {
        self.api_base = Some(api_base.to_string());
    }

    fn set_openudid(&mut self, openudid: &str) {
        self.openudid = Some(openudid.to_string());
    }

    fn set_serial_number(&mut self, serial_number: &str) {
        self.serial_number = Some(serial_number.to_string());
    }

    fn open_station(
        &self,
        snapshot: &StationSnapshot,
        events: StationEventSender,
    ) -> Box<dyn Station> {
        let livestreams = self
            .script
            .devices
            .iter()
            .filter(|device| device.station_sn == snapshot.station_sn)
            .filter_map(|device| {
                self.script
                    .livestreams
                    .get(&device.device_sn)
                    .map(|livestream| (device.device_sn.clone(), livestream.clone()))
            })
            .collect();

        Box::new(ScriptedStation {
            serial: snapshot.station_sn.clone(),
            snapshot: snapshot.clone(),
            livestreams,
            events,
            state: Arc::new(Mutex::new(ScriptedStationState::default())),
        })
    }
}

#[derive(Debug, Default)]
struct ScriptedStationState {
    connected: bool,
    streaming: HashSet<String>,
}

struct ScriptedStation {
    serial: String,
    snapshot: StationSnapshot,
    livestreams: HashMap<String, LivestreamScript>,
    events: StationEventSender,
    state: Arc<Mutex<ScriptedStationState>>,
}

impl ScriptedStation {
    fn state(&self) -> MutexGuard<'_, ScriptedStationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StationEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!(station_sn = %self.serial, "station event receiver dropped");
        }
    }

    async fn open_payload(
        &self,
        device: &DeviceRecord,
    ) -> Result<(StreamMetadata, MediaStream), CloudError> {
        match self.livestreams.get(device.serial()) {
            Some(livestream) => {
                let file = tokio::fs::File::open(&livestream.payload).await?;
                Ok((livestream.metadata.clone(), Box::pin(file)))
            }
            None => Ok((StreamMetadata::default(), Box::pin(tokio::io::empty()))),
        }
    }
}

#[async_trait]
impl Station for ScriptedStation {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn is_live_streaming(&self, device: &DeviceRecord) -> bool {
        self.state().streaming.contains(device.serial())
    }

    async fn start_livestream(&self, device: &DeviceRecord) -> Result<(), CloudError> {
        if !self.is_connected() {
            return Err(CloudError::StationDisconnected(self.serial.clone()));
        }

        let (metadata, video) = self.open_payload(device).await?;
        self.state().streaming.insert(device.serial().to_string());

        self.emit(StationEvent::StartLivestream {
            station_sn: self.serial.clone(),
            channel: device.channel(),
            metadata,
            video,
            audio: Box::pin(tokio::io::empty()),
        });
        Ok(())
    }

    async fn stop_livestream(&self, device: &DeviceRecord) -> Result<(), CloudError> {
        if !self.is_connected() {
            return Err(CloudError::StationDisconnected(self.serial.clone()));
        }

        if self.state().streaming.remove(device.serial()) {
            self.emit(StationEvent::StopLivestream {
                station_sn: self.serial.clone(),
                channel: device.channel(),
            });
        }
        Ok(())
    }

    async fn connect(&self, mode: ConnectMode) -> Result<(), CloudError> {
        let already_connected = {
            let mut state = self.state();
            let already_connected = state.connected;
            state.connected = true;
            already_connected
        };

        if !already_connected || mode == ConnectMode::ForceReconnect {
            self.emit(StationEvent::Connect {
                station_sn: self.serial.clone(),
            });
        }
        Ok(())
    }

    async fn get_camera_info(&self) -> Result<(), CloudError> {
        tracing::debug!(
            station_sn = %self.serial,
            station_name = %self.snapshot.station_name,
            "scripted camera info refresh"
        );
        Ok(())
    }

    fn update(&mut self, snapshot: &StationSnapshot, is_new: bool) {
        tracing::trace!(station_sn = %self.serial, is_new, "scripted station update");
        self.snapshot = snapshot.clone();
    }
}
