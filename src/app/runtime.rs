use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::adapters::cloud::MediaStream;
use crate::adapters::debug_script::ScriptedCloudApi;
use crate::adapters::session_file::SessionCache;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::domain::auth::AuthState;
use crate::glue::{EufyGlue, GlueEvent};

const EXIT_GRACE_PERIOD: Duration = Duration::from_secs(1);

type DumpResult = Result<u64, std::io::Error>;

enum RuntimeInput {
    Glue(GlueEvent),
    DumpFinished(DumpResult),
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::runtime)?;

    runtime.block_on(run_livestream_dump(config))
}

/// Logs on, starts the target camera's livestream as soon as its station
/// connects and writes the video stream to `config.output_path`.
pub async fn run_livestream_dump(config: AppConfig) -> Result<(), AppError> {
    let (api_tx, api_rx) = mpsc::unbounded_channel();
    let api = ScriptedCloudApi::from_file(Path::new(&config.script_path), api_tx)
        .map_err(AppError::runtime)?;
    let cache = SessionCache::new(
        &config.persistent_path,
        &config.username,
        &config.password,
        config.serial_number_length,
    );
    let mut glue = EufyGlue::new(
        Box::new(api),
        api_rx,
        cache,
        Duration::from_secs(config.max_livestream_duration_secs),
    );

    authenticate(&mut glue, config.verify_code).await?;
    dump_target_livestream(&mut glue, &config).await
}

async fn dump_target_livestream(glue: &mut EufyGlue, config: &AppConfig) -> Result<(), AppError> {
    let output_path = PathBuf::from(&config.output_path);
    let (dump_tx, mut dump_rx) = mpsc::unbounded_channel::<DumpResult>();

    loop {
        let input = tokio::select! {
            event = glue.next_event() => RuntimeInput::Glue(event),
            Some(result) = dump_rx.recv() => RuntimeInput::DumpFinished(result),
        };

        match input {
            RuntimeInput::Glue(event) => {
                handle_event(glue, config, event, &output_path, &dump_tx).await?;
            }
            RuntimeInput::DumpFinished(result) => {
                match result {
                    Ok(bytes) => {
                        tracing::info!(
                            bytes,
                            path = %output_path.display(),
                            "video stream dump finished"
                        );
                        tracing::info!(
                            "manually test the output by running: ffplay {}",
                            output_path.display()
                        );
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "video stream dump failed");
                    }
                }

                // The select above may have cut off an auto-stop in flight.
                match glue.stop_livestream(&config.target_device_id).await {
                    Ok(outcome) => tracing::debug!(outcome = ?outcome, "livestream stop requested"),
                    Err(error) => tracing::warn!(error = %error, "failed to stop livestream"),
                }

                tokio::time::sleep(EXIT_GRACE_PERIOD).await;
                return Ok(());
            }
        }
    }
}

async fn authenticate(glue: &mut EufyGlue, verify_code: Option<u32>) -> Result<(), AppError> {
    let mut state = glue.logon(None).await;

    if state == AuthState::AwaitingVerification {
        match verify_code {
            Some(code) => state = glue.logon(Some(code)).await,
            None => tracing::warn!(
                "a verification code was sent, set EUFY_VERIFY_CODE and restart"
            ),
        }
    }

    if state.is_authenticated() {
        Ok(())
    } else {
        Err(AppError::runtime(format!(
            "authentication did not complete, state: {state:?}"
        )))
    }
}

async fn handle_event(
    glue: &mut EufyGlue,
    config: &AppConfig,
    event: GlueEvent,
    output_path: &Path,
    dump_tx: &mpsc::UnboundedSender<DumpResult>,
) -> Result<(), AppError> {
    match event {
        GlueEvent::Connect { station_sn } => {
            tracing::info!(station_sn = %station_sn, "station connected");

            let camera = glue.registry().get_camera(&config.target_device_id)?;
            if camera.station_serial() != station_sn {
                return Ok(());
            }

            match glue.start_livestream(&config.target_device_id).await {
                Ok(outcome) => tracing::debug!(outcome = ?outcome, "livestream start requested"),
                Err(error) if error.is_not_found() => return Err(error.into()),
                Err(error) => tracing::warn!(error = %error, "failed to start livestream"),
            }
        }
        GlueEvent::StartLivestream {
            station_sn,
            device,
            metadata,
            video,
            audio: _,
        } if device.serial() == config.target_device_id => {
            tracing::debug!(
                station_sn = %station_sn,
                device_sn = %device.serial(),
                metadata = ?metadata,
                "livestream started, dumping video stream"
            );

            let path = output_path.to_path_buf();
            let dump_tx = dump_tx.clone();
            tokio::spawn(async move {
                let result = dump_stream(video, &path).await;
                if dump_tx.send(result).is_err() {
                    tracing::debug!("dump result receiver dropped");
                }
            });
        }
        GlueEvent::StopLivestream { station_sn, device } => {
            tracing::info!(
                station_sn = %station_sn,
                device_sn = %device.serial(),
                "livestream stopped"
            );
        }
        other => tracing::debug!(event = ?other, "ignoring event"),
    }

    Ok(())
}

async fn dump_stream(mut video: MediaStream, path: &Path) -> DumpResult {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::File::create(path).await?;
    let bytes = tokio::io::copy(&mut video, &mut file).await?;
    file.flush().await?;
    Ok(bytes)
}
