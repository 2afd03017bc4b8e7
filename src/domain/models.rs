use serde::{Deserialize, Serialize};

/// Links one device hosted by a station to the channel it streams on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLink {
    pub device_sn: String,
    pub device_channel: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub station_sn: String,
    #[serde(default)]
    pub station_name: String,
    #[serde(default)]
    pub station_model: String,
    #[serde(default)]
    pub device_type: u32,
    #[serde(default)]
    pub main_sw_version: String,
    #[serde(default)]
    pub ip_addr: Option<String>,
    #[serde(default)]
    pub devices: Vec<ChannelLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub device_sn: String,
    pub station_sn: String,
    pub device_type: u32,
    #[serde(default)]
    pub device_channel: u32,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub device_model: String,
    #[serde(default)]
    pub main_sw_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Camera,
    Lock,
    MotionSensor,
    EntrySensor,
    Keypad,
    Unknown,
}

impl DeviceKind {
    pub fn from_device_type(device_type: u32) -> Self {
        match device_type {
            1 | 4 | 5 | 7 | 8 | 9 | 14 | 15 | 16 | 30..=35 | 60..=67 | 90 | 91 | 93 | 94 | 100
            | 101 | 104 | 110 | 131 | 201 | 202 => Self::Camera,
            2 => Self::EntrySensor,
            10 => Self::MotionSensor,
            11 => Self::Keypad,
            50..=59 | 180 | 181 | 184 => Self::Lock,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Lock => "lock",
            Self::MotionSensor => "motion_sensor",
            Self::EntrySensor => "entry_sensor",
            Self::Keypad => "keypad",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered device. The kind is fixed when the record is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    kind: DeviceKind,
    snapshot: DeviceSnapshot,
}

impl DeviceRecord {
    pub fn new(snapshot: DeviceSnapshot) -> Self {
        Self {
            kind: DeviceKind::from_device_type(snapshot.device_type),
            snapshot,
        }
    }

    pub fn update(&mut self, snapshot: DeviceSnapshot) {
        self.snapshot = snapshot;
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn is_camera(&self) -> bool {
        self.kind == DeviceKind::Camera
    }

    pub fn serial(&self) -> &str {
        &self.snapshot.device_sn
    }

    pub fn station_serial(&self) -> &str {
        &self.snapshot.station_sn
    }

    pub fn channel(&self) -> u32 {
        self.snapshot.device_channel
    }

    pub fn name(&self) -> &str {
        &self.snapshot.device_name
    }

    pub fn snapshot(&self) -> &DeviceSnapshot {
        &self.snapshot
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(default)]
    pub video_codec: String,
    #[serde(default)]
    pub video_fps: u32,
    #[serde(default)]
    pub video_width: u32,
    #[serde(default)]
    pub video_height: u32,
    #[serde(default)]
    pub audio_codec: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustDevice {
    pub open_udid: String,
    #[serde(default)]
    pub phone_model: String,
    #[serde(default)]
    pub is_current_device: u8,
}

impl TrustDevice {
    pub fn is_current(&self) -> bool {
        self.is_current_device == 1
    }
}
