use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tiny_preview_core::error::AppError;
use tiny_preview_core::ffmpeg::{FfmpegEngineFactory, FfmpegFrameSource, probe_title};
use tiny_preview_core::{EncodeJob, PreviewConfig, PreviewDelegate, PreviewGenerator, temp};

const STARTUP_CLEANUP_MAX_AGE_HOURS: u64 = 24;

type Generator = PreviewGenerator<FfmpegFrameSource, FfmpegEngineFactory>;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcSuccess {
    id: u64,
    result: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcFailure {
    id: u64,
    error: RpcErrorPayload,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcErrorPayload {
    summary: String,
    detail: String,
}

#[derive(Debug, serde::Serialize)]
struct RpcEvent {
    event: String,
    payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProbeParams {
    input_path: PathBuf,
    #[serde(default = "default_title_index")]
    title_index: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigureParams {
    job: EncodeJob,
    config: Option<PreviewConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StillParams {
    index: u32,
    #[serde(default = "default_true")]
    cache: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MovieParams {
    index: u32,
    duration_secs: u32,
}

fn default_title_index() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

type SharedWriter = Arc<Mutex<io::Stdout>>;

fn write_json_line<T: serde::Serialize>(writer: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| io::Error::other(format!("serialize response: {}", e)))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn write_json_line_shared<T: serde::Serialize>(writer: &SharedWriter, value: &T) -> io::Result<()> {
    let mut guard = writer.lock();
    write_json_line(&mut *guard, value)
}

fn emit_rpc_event(writer: &SharedWriter, event: &str, payload: Value) {
    let message = RpcEvent {
        event: event.to_string(),
        payload,
    };
    let _ = write_json_line_shared(writer, &message);
}

fn parse_error_payload(err: &AppError) -> RpcErrorPayload {
    match err {
        AppError::FfmpegFailed { code, stderr } if *code == -1 => RpcErrorPayload {
            summary: stderr.clone(),
            detail: stderr.clone(),
        },
        AppError::FfmpegFailed { code, stderr } => {
            let parsed = tiny_preview_core::ffmpeg::parse_ffmpeg_error(stderr, Some(*code));
            RpcErrorPayload {
                summary: parsed.summary,
                detail: parsed.detail,
            }
        }
        _ => {
            let text = err.to_string();
            RpcErrorPayload {
                summary: text.clone(),
                detail: text,
            }
        }
    }
}

/// Forwards session callbacks as unsolicited event lines.
struct EventDelegate {
    writer: SharedWriter,
}

impl PreviewDelegate for EventDelegate {
    fn on_progress(&self, percent: f64, info: &str) {
        emit_rpc_event(
            &self.writer,
            "preview.progress",
            json!({ "percent": percent, "info": info }),
        );
    }

    fn on_movie_ready(&self, path: &Path) {
        emit_rpc_event(&self.writer, "preview.ready", json!({ "path": path }));
    }

    fn on_movie_cancelled(&self) {
        emit_rpc_event(&self.writer, "preview.cancelled", json!({}));
    }

    fn on_movie_failed(&self, error: &AppError) {
        let payload = parse_error_payload(error);
        emit_rpc_event(
            &self.writer,
            "preview.failed",
            json!({ "summary": payload.summary, "detail": payload.detail }),
        );
    }
}

struct SidecarState {
    writer: SharedWriter,
    config: PreviewConfig,
    source: Arc<FfmpegFrameSource>,
    generator: Option<Generator>,
    /// Every support root used this run, cleaned on exit.
    support_dirs: Vec<PathBuf>,
}

fn params_from_value<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, AppError> {
    serde_json::from_value(params)
        .map_err(|e| AppError::from(format!("Invalid params payload: {}", e)))
}

fn to_result_value<T: serde::Serialize>(value: T, what: &str) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::from(format!("Failed to serialize {}: {}", what, e)))
}

impl SidecarState {
    fn new(writer: SharedWriter) -> Self {
        let config = PreviewConfig::default();
        let source = Arc::new(FfmpegFrameSource::new(config.effective_images_count()));
        let support_dirs = vec![config.effective_support_dir()];
        Self {
            writer,
            config,
            source,
            generator: None,
            support_dirs,
        }
    }

    fn generator(&mut self) -> Result<&mut Generator, AppError> {
        self.generator
            .as_mut()
            .ok_or_else(|| AppError::from("No job configured; call preview.configure first"))
    }

    fn configure(&mut self, params: ConfigureParams) -> Result<Value, AppError> {
        if let Some(config) = params.config {
            if self.generator.as_ref().is_some_and(|g| g.movie_state().is_busy()) {
                return Err(AppError::AlreadyRunning);
            }
            // Rebuilt below with the new settings.
            self.generator = None;
            let support_dir = config.effective_support_dir();
            if !self.support_dirs.contains(&support_dir) {
                self.support_dirs.push(support_dir);
            }
            self.config = config;
        }

        match self.generator.as_mut() {
            Some(generator) => {
                generator.set_job(params.job);
                generator.purge_image_cache();
            }
            None => {
                let delegate = Arc::new(EventDelegate {
                    writer: Arc::clone(&self.writer),
                });
                self.generator = Some(PreviewGenerator::new(
                    params.job,
                    Arc::clone(&self.source),
                    FfmpegEngineFactory::new(),
                    &self.config,
                    delegate,
                )?);
            }
        }
        let images_count = self.generator()?.images_count();
        Ok(json!({ "imagesCount": images_count }))
    }

    fn still(&mut self, params: StillParams) -> Result<Value, AppError> {
        let generator = self.generator()?;
        let Some(image) = generator.image_at(params.index, params.cache)? else {
            return Ok(json!({ "available": false }));
        };
        let path = temp::prepare_still_output(generator.support_dir(), params.index)?;
        image.save_png(&path)?;
        Ok(json!({
            "available": true,
            "path": path,
            "width": image.width(),
            "height": image.height(),
        }))
    }

    fn state(&self) -> Result<Value, AppError> {
        match self.generator.as_ref() {
            Some(generator) => Ok(json!({
                "state": generator.movie_state(),
                "imagesCount": generator.images_count(),
                "cachedImages": generator.cached_image_count(),
            })),
            None => Ok(json!({
                "state": Value::Null,
                "imagesCount": self.config.effective_images_count(),
                "cachedImages": 0,
            })),
        }
    }

    fn dispatch(&mut self, method: &str, params: Value) -> Result<Value, AppError> {
        match method {
            "preview.probe" => {
                let parsed: ProbeParams = params_from_value(params)?;
                let title = probe_title(&parsed.input_path, parsed.title_index)?;
                self.source.add_title(title.clone());
                to_result_value(title, "title")
            }
            "preview.configure" => {
                let parsed: ConfigureParams = params_from_value(params)?;
                self.configure(parsed)
            }
            "preview.still" => {
                let parsed: StillParams = params_from_value(params)?;
                self.still(parsed)
            }
            "preview.purge" => {
                self.generator()?.purge_image_cache();
                Ok(json!({ "purged": true }))
            }
            "preview.movie" => {
                let parsed: MovieParams = params_from_value(params)?;
                let path = self
                    .generator()?
                    .create_movie(parsed.index, parsed.duration_secs)?;
                Ok(json!({ "path": path }))
            }
            "preview.cancel" => {
                let generator = self.generator()?;
                let active = generator.movie_state().is_busy();
                generator.cancel_movie();
                Ok(json!({ "cancelled": active }))
            }
            "preview.state" => self.state(),
            _ => Err(AppError::from(format!("Unknown method: {}", method))),
        }
    }

    fn shutdown(mut self) {
        // Dropping the generator stops any running encode first.
        self.generator = None;
        for dir in &self.support_dirs {
            temp::cleanup_preview_dir(dir);
        }
    }
}

fn handle_request(request: RpcRequest, state: &mut SidecarState) {
    let writer = Arc::clone(&state.writer);
    let response = match state.dispatch(&request.method, request.params) {
        Ok(result) => serde_json::to_value(RpcSuccess {
            id: request.id,
            result,
        })
        .map_err(|e| io::Error::other(format!("serialize success: {}", e))),
        Err(err) => {
            log::warn!(
                target: "tiny_preview::sidecar",
                "{} failed: {}",
                request.method,
                err
            );
            let payload = parse_error_payload(&err);
            serde_json::to_value(RpcFailure {
                id: request.id,
                error: payload,
            })
            .map_err(|e| io::Error::other(format!("serialize failure: {}", e)))
        }
    };

    match response {
        Ok(value) => {
            let _ = write_json_line_shared(&writer, &value);
        }
        Err(err) => {
            let failure = RpcFailure {
                id: request.id,
                error: RpcErrorPayload {
                    summary: "Serialization error".to_string(),
                    detail: err.to_string(),
                },
            };
            let _ = write_json_line_shared(&writer, &failure);
        }
    }
}

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));
    let mut state = SidecarState::new(Arc::clone(&stdout));
    for dir in &state.support_dirs {
        temp::cleanup_stale_preview_dirs(
            dir,
            Duration::from_secs(STARTUP_CLEANUP_MAX_AGE_HOURS * 3600),
        );
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid input stream".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid request".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        handle_request(request, &mut state);
    }

    state.shutdown();
    Ok(())
}
