use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use rand::RngCore;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SERIAL_NUMBER_LENGTH: usize = 12;

/// On-disk session state: generated client identity plus the cached cloud token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_token: Option<String>,
    /// Epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_token_expiration: Option<i64>,
    #[serde(default)]
    pub openudid: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_hash: Option<String>,
}

/// Fields merged into the stored record by a save. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub api_base: Option<String>,
    pub cloud_token: Option<String>,
    pub cloud_token_expiration: Option<i64>,
    pub login_hash: Option<String>,
}

impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        self.api_base.is_none()
            && self.cloud_token.is_none()
            && self.cloud_token_expiration.is_none()
            && self.login_hash.is_none()
    }
}

impl SessionRecord {
    pub fn apply(&mut self, update: SessionUpdate) {
        if let Some(api_base) = update.api_base {
            self.api_base = Some(api_base);
        }
        if let Some(token) = update.cloud_token {
            self.cloud_token = Some(token);
        }
        if let Some(expiration) = update.cloud_token_expiration {
            self.cloud_token_expiration = Some(expiration);
        }
        if let Some(login_hash) = update.login_hash {
            self.login_hash = Some(login_hash);
        }
    }

    pub fn token_expiration(&self) -> Option<DateTime<Utc>> {
        self.cloud_token_expiration
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    /// Token and expiry are only usable together.
    pub fn cached_token(&self) -> Option<(&str, DateTime<Utc>)> {
        match (self.cloud_token.as_deref(), self.token_expiration()) {
            (Some(token), Some(expiration)) => Some((token, expiration)),
            _ => None,
        }
    }

    /// Drops the cached token when it was obtained with other credentials.
    /// Returns `true` when something was cleared.
    pub fn invalidate_if_credentials_changed(&mut self, current_login_hash: &str) -> bool {
        let has_auth_state = self.login_hash.is_some()
            || self.cloud_token.is_some()
            || self.cloud_token_expiration.is_some();

        if !has_auth_state || self.login_hash.as_deref() == Some(current_login_hash) {
            return false;
        }

        self.login_hash = None;
        self.cloud_token = None;
        self.cloud_token_expiration = None;
        true
    }

    /// Fills in missing identifiers. Returns `true` when one was generated.
    pub fn ensure_identity(&mut self, serial_number_length: usize) -> bool {
        let mut generated = false;

        if self.openudid.is_empty() {
            self.openudid = generate_openudid();
            tracing::debug!(openudid = %self.openudid, "generated new openudid");
            generated = true;
        }

        if self.serial_number.is_empty() {
            self.serial_number = generate_serial_number(serial_number_length);
            tracing::debug!(serial_number = %self.serial_number, "generated new serial number");
            generated = true;
        }

        generated
    }
}

pub fn login_hash(username: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(username.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn generate_openudid() -> String {
    format!("{:016x}", rand::random::<u64>())
}

pub fn generate_serial_number(length: usize) -> String {
    let mut bytes = vec![0_u8; length.div_ceil(2)];
    rand::rng().fill_bytes(&mut bytes);
    let mut serial = hex::encode(bytes);
    serial.truncate(length);
    serial
}

#[cfg(test)]
mod tests {
    use super::{
        SessionRecord, SessionUpdate, generate_openudid, generate_serial_number, login_hash,
    };

    fn is_lower_hex(value: &str) -> bool {
        value
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }

    #[test]
    fn login_hash_is_md5_of_joined_credentials() {
        assert_eq!(
            login_hash("user", "pass"),
            "21a39285884a268d6458e3fdeb08beac"
        );
        assert_ne!(login_hash("user", "pass"), login_hash("user", "pass2"));
    }

    #[test]
    fn generated_identifiers_have_expected_shape() {
        let openudid = generate_openudid();
        assert_eq!(openudid.len(), 16);
        assert!(is_lower_hex(&openudid));

        let serial = generate_serial_number(12);
        assert_eq!(serial.len(), 12);
        assert!(is_lower_hex(&serial));

        assert_eq!(generate_serial_number(7).len(), 7);
    }

    #[test]
    fn keeps_token_when_login_hash_matches() {
        let hash = login_hash("user", "pass");
        let mut record = SessionRecord {
            cloud_token: Some("token".to_string()),
            cloud_token_expiration: Some(1_700_000_000_000),
            login_hash: Some(hash.clone()),
            ..SessionRecord::default()
        };

        assert!(!record.invalidate_if_credentials_changed(&hash));
        assert_eq!(record.cloud_token.as_deref(), Some("token"));
    }

    #[test]
    fn clears_token_but_not_identity_when_login_hash_differs() {
        let mut record = SessionRecord {
            cloud_token: Some("token".to_string()),
            cloud_token_expiration: Some(1_700_000_000_000),
            login_hash: Some(login_hash("user", "old")),
            openudid: "0123456789abcdef".to_string(),
            serial_number: "a1b2c3d4e5f6".to_string(),
            ..SessionRecord::default()
        };

        assert!(record.invalidate_if_credentials_changed(&login_hash("user", "new")));
        assert_eq!(record.cloud_token, None);
        assert_eq!(record.cloud_token_expiration, None);
        assert_eq!(record.login_hash, None);
        assert_eq!(record.openudid, "0123456789abcdef");
        assert_eq!(record.serial_number, "a1b2c3d4e5f6");
    }

    #[test]
    fn token_without_stored_hash_is_invalidated() {
        let mut record = SessionRecord {
            cloud_token: Some("token".to_string()),
            ..SessionRecord::default()
        };

        assert!(record.invalidate_if_credentials_changed(&login_hash("user", "pass")));
        assert_eq!(record.cloud_token, None);
    }

    #[test]
    fn ensure_identity_generates_only_missing_fields() {
        let mut record = SessionRecord {
            openudid: "0123456789abcdef".to_string(),
            ..SessionRecord::default()
        };

        assert!(record.ensure_identity(12));
        assert_eq!(record.openudid, "0123456789abcdef");
        assert_eq!(record.serial_number.len(), 12);

        let serial = record.serial_number.clone();
        assert!(!record.ensure_identity(12));
        assert_eq!(record.serial_number, serial);
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let mut record = SessionRecord {
            api_base: Some("https://a.example".to_string()),
            cloud_token: Some("old".to_string()),
            ..SessionRecord::default()
        };

        record.apply(SessionUpdate {
            cloud_token: Some("new".to_string()),
            ..SessionUpdate::default()
        });

        assert_eq!(record.api_base.as_deref(), Some("https://a.example"));
        assert_eq!(record.cloud_token.as_deref(), Some("new"));
        assert!(SessionUpdate::default().is_empty());
    }

    #[test]
    fn serializes_with_persisted_field_names() {
        let record = SessionRecord {
            cloud_token: Some("token".to_string()),
            cloud_token_expiration: Some(1_700_000_000_000),
            openudid: "0123456789abcdef".to_string(),
            serial_number: "a1b2c3d4e5f6".to_string(),
            ..SessionRecord::default()
        };

        let value = serde_json::to_value(&record).expect("record should serialize");
        assert_eq!(value["cloud_token"], "token");
        assert_eq!(value["cloud_token_expiration"], 1_700_000_000_000_i64);
        assert_eq!(value["openudid"], "0123456789abcdef");
        assert_eq!(value["serial_number"], "a1b2c3d4e5f6");
        assert!(value.get("api_base").is_none());
        assert!(value.get("login_hash").is_none());
    }
}
