mod config;
mod error;
mod logging;
mod runtime;

pub use config::AppConfig;
pub use error::AppError;
pub use runtime::run_livestream_dump;

pub fn run() -> Result<(), AppError> {
    logging::init()?;

    let config = config::AppConfig::from_env()?;

    tracing::info!(
        target_device_id = %config.target_device_id,
        max_livestream_duration_secs = config.max_livestream_duration_secs,
        persistent_path = %config.persistent_path,
        output_path = %config.output_path,
        script_path = %config.script_path,
        verify_code_set = config.verify_code.is_some(),
        "application bootstrap initialized"
    );

    runtime::run(config)
}
