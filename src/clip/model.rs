//! CLIP visual encoder using ONNX Runtime

use image::DynamicImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing::{debug, info};

use super::device::{Device, DevicePreference};
use super::preprocess::{preprocess, INPUT_SIZE};
use super::ImageEncoder;
use crate::config::ModelConfig;
use crate::embedding::{normalize_in_place, ImageEmbedding};
use crate::error::{EmbedError, Result};

const RUNTIME_HINT: &str = "Install ONNX Runtime (https://onnxruntime.ai) and set ORT_DYLIB_PATH to the libonnxruntime shared library.";

struct LoadedModel {
    session: Mutex<Session>,
    device: Device,
}

/// CLIP visual encoder, loaded lazily on first use and reused afterwards.
pub struct ClipModel {
    config: ModelConfig,
    loaded: OnceLock<LoadedModel>,
    init_lock: Mutex<()>,
}

impl ClipModel {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            loaded: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Load the model once. Later calls return the device chosen the first time.
    ///
    /// `device` overrides the configured preference for the first load only.
    pub fn initialize(&self, device: Option<DevicePreference>) -> Result<Device> {
        if let Some(loaded) = self.loaded.get() {
            return Ok(loaded.device);
        }

        let _guard = self
            .init_lock
            .lock()
            .map_err(|e| EmbedError::Inference(format!("Failed to lock model: {}", e)))?;

        // Another caller may have finished while we waited
        if let Some(loaded) = self.loaded.get() {
            return Ok(loaded.device);
        }

        let loaded = self.load(device.unwrap_or(self.config.device))?;
        let device = loaded.device;
        let _ = self.loaded.set(loaded);
        Ok(device)
    }

    /// Check if the session is loaded
    pub fn is_ready(&self) -> bool {
        self.loaded.get().is_some()
    }

    /// Device in use, once initialized
    pub fn device(&self) -> Option<Device> {
        self.loaded.get().map(|l| l.device)
    }

    fn load(&self, preference: DevicePreference) -> Result<LoadedModel> {
        // Weights that cannot be fetched fail before the runtime is touched
        if !self.config.auto_download && !self.config.model_path().is_file() {
            return Err(missing_weights(&self.config));
        }

        // The runtime must load before anything is downloaded
        load_runtime(&self.config)?;
        let model_path = ensure_model(&self.config)?;
        let device = preference.resolve()?;

        info!(%device, path = ?model_path, "Loading CLIP visual encoder");

        let builder = Session::builder()
            .map_err(|e| EmbedError::model_unavailable(format!("ONNX Runtime ({})", e), RUNTIME_HINT))?;

        #[allow(unused_mut)]
        let mut builder = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_err)?
            .with_intra_threads(self.config.intra_threads)
            .map_err(ort_err)?;

        if device == Device::Cuda {
            #[cfg(feature = "cuda")]
            {
                use ort::ep::CUDA;
                builder = builder
                    .with_execution_providers([CUDA::default().build()])
                    .map_err(ort_err)?;
            }
        }

        let session = builder.commit_from_file(&model_path).map_err(ort_err)?;

        debug!(%device, "CLIP session ready");

        Ok(LoadedModel {
            session: Mutex::new(session),
            device,
        })
    }

    fn run_visual_encoder(&self, loaded: &LoadedModel, img: &DynamicImage) -> Result<ImageEmbedding> {
        let input_data = preprocess(img)?;

        let input_tensor = Tensor::from_array((
            [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize],
            input_data.into_boxed_slice(),
        ))
        .map_err(ort_err)?;

        let mut session = loaded
            .session
            .lock()
            .map_err(|e| EmbedError::Inference(format!("Failed to lock model: {}", e)))?;

        let outputs = session
            .run(ort::inputs!["pixel_values" => input_tensor])
            .map_err(ort_err)?;

        // The projected image embedding is the first output of the export
        let embedding_output = outputs
            .iter()
            .next()
            .ok_or_else(|| EmbedError::Inference("No embedding output".to_string()))?;

        let (_shape, embedding_data) = embedding_output
            .1
            .try_extract_tensor::<f32>()
            .map_err(ort_err)?;

        if embedding_data.is_empty() {
            return Err(EmbedError::Inference("Empty embedding output".to_string()));
        }

        let mut embedding: ImageEmbedding = embedding_data.to_vec();
        normalize_in_place(&mut embedding);
        Ok(embedding)
    }
}

impl ImageEncoder for ClipModel {
    fn embed(&self, image: &DynamicImage) -> Result<ImageEmbedding> {
        self.initialize(None)?;
        let loaded = self
            .loaded
            .get()
            .ok_or_else(|| EmbedError::Inference("Visual model not initialized".to_string()))?;

        self.run_visual_encoder(loaded, image)
    }
}

fn ort_err(e: impl std::fmt::Display) -> EmbedError {
    EmbedError::Inference(e.to_string())
}

#[cfg(target_os = "windows")]
const DEFAULT_RUNTIME: &str = "onnxruntime.dll";
#[cfg(target_os = "macos")]
const DEFAULT_RUNTIME: &str = "libonnxruntime.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const DEFAULT_RUNTIME: &str = "libonnxruntime.so";

/// Shared library to load: `model.runtime_path`, then `ORT_DYLIB_PATH`, then the
/// platform name resolved by the system loader.
fn runtime_library(config: &ModelConfig) -> PathBuf {
    if let Some(path) = &config.runtime_path {
        return path.clone();
    }
    match std::env::var_os("ORT_DYLIB_PATH") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_RUNTIME),
    }
}

/// Load ONNX Runtime and commit the process environment.
///
/// Without this, a missing library only shows up as a panic inside the first
/// session builder.
fn load_runtime(config: &ModelConfig) -> Result<()> {
    let library = runtime_library(config);
    let missing = || format!("ONNX Runtime library {}", library.display());

    // A bare file name is left to the system search path
    if library.components().count() > 1 && !library.is_file() {
        return Err(EmbedError::model_unavailable(missing(), RUNTIME_HINT));
    }

    let environment = ort::init_from(&library).map_err(|e| {
        EmbedError::model_unavailable(format!("{} ({})", missing(), e), RUNTIME_HINT)
    })?;
    if !environment.commit() {
        debug!("ONNX Runtime environment already committed");
    }

    debug!(library = ?library, "ONNX Runtime loaded");
    Ok(())
}

fn missing_weights(config: &ModelConfig) -> EmbedError {
    EmbedError::model_unavailable(
        format!("CLIP weights {}", config.model_path().display()),
        format!(
            "Download {} to that path or enable model.auto_download.",
            config.model_url
        ),
    )
}

/// Resolve the weights file, downloading it if allowed.
fn ensure_model(config: &ModelConfig) -> Result<PathBuf> {
    let model_path = config.model_path();
    if model_path.is_file() {
        return Ok(model_path);
    }

    if !config.auto_download {
        return Err(missing_weights(config));
    }

    download_model(&config.model_url, &model_path).map_err(|e| {
        EmbedError::model_unavailable(
            format!("CLIP weights {}", model_path.display()),
            format!("Download from {} failed: {}", config.model_url, e),
        )
    })?;

    Ok(model_path)
}

fn download_model(url: &str, model_path: &Path) -> std::result::Result<(), String> {
    if let Some(parent) = model_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }

    info!(%url, "Downloading CLIP model...");
    let response = ureq::get(url).call().map_err(|e| e.to_string())?;

    // Write next to the target and rename so a partial file is never picked up
    let partial = model_path.with_extension("part");
    let mut file = std::fs::File::create(&partial).map_err(|e| e.to_string())?;
    std::io::copy(&mut response.into_reader(), &mut file).map_err(|e| e.to_string())?;
    std::fs::rename(&partial, model_path).map_err(|e| e.to_string())?;

    info!(path = ?model_path, "CLIP model downloaded");
    Ok(())
}
