use crate::app::AppError;
use crate::domain::session_record::DEFAULT_SERIAL_NUMBER_LENGTH;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub username: String,
    pub password: String,
    pub target_device_id: String,
    pub max_livestream_duration_secs: u64,
    pub verify_code: Option<u32>,
    pub persistent_path: String,
    pub serial_number_length: usize,
    pub output_path: String,
    pub script_path: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        if let Err(error) = dotenvy::dotenv()
            && !error.not_found()
        {
            return Err(AppError::config(format!("failed to read .env file: {error}")));
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            username: required(&lookup, "EUFY_USERNAME")?,
            password: required(&lookup, "EUFY_PASSWORD")?,
            target_device_id: required(&lookup, "EUFY_TARGET_DEVICE_ID")?,
            max_livestream_duration_secs: parse_or_default(
                &lookup,
                "EUFY_MAX_LIVESTREAM_DURATION_SECS",
                30_u64,
            )?,
            verify_code: parse_optional(&lookup, "EUFY_VERIFY_CODE")?,
            persistent_path: optional(&lookup, "EUFY_PERSISTENT_PATH")
                .unwrap_or_else(|| "data/persistent.json".to_string()),
            serial_number_length: parse_or_default(
                &lookup,
                "EUFY_SERIAL_LENGTH",
                DEFAULT_SERIAL_NUMBER_LENGTH,
            )?,
            output_path: optional(&lookup, "EUFY_OUTPUT_PATH")
                .unwrap_or_else(|| "output/test-stream.dump".to_string()),
            script_path: required(&lookup, "EUFY_SCRIPT_PATH")?,
        })
    }
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or_else(|| AppError::config(format!("{key} is required")))
}

fn parse_optional<T, F>(lookup: &F, key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| AppError::config(format!("{key} must be a valid number")))
        })
        .transpose()
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_optional(lookup, key)?.unwrap_or(default))
}
