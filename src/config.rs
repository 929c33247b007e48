use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::clip::DevicePreference;
use crate::pipeline::DecodePolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub recommend: RecommendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub device: DevicePreference,

    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    #[serde(default = "default_model_file")]
    pub model_file: String,

    /// Where to fetch the visual encoder when `model_file` is missing
    #[serde(default = "default_model_url")]
    pub model_url: String,

    #[serde(default = "default_auto_download")]
    pub auto_download: bool,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// ONNX Runtime shared library; falls back to `ORT_DYLIB_PATH`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_path: Option<PathBuf>,
}

fn default_models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("memeclip")
        .join("models")
}

fn default_model_file() -> String {
    "clip-vit-b32-vision.onnx".to_string()
}

fn default_model_url() -> String {
    // Qdrant's CLIP ViT-B/32 visual encoder export
    "https://huggingface.co/Qdrant/clip-ViT-B-32-vision/resolve/main/model.onnx".to_string()
}

fn default_auto_download() -> bool {
    true
}

fn default_intra_threads() -> usize {
    4
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            device: DevicePreference::default(),
            models_dir: default_models_dir(),
            model_file: default_model_file(),
            model_url: default_model_url(),
            auto_download: default_auto_download(),
            intra_threads: default_intra_threads(),
            runtime_path: None,
        }
    }
}

impl ModelConfig {
    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(&self.model_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    #[serde(default)]
    pub decode_policy: DecodePolicy,
}

fn default_image_extensions() -> Vec<String> {
    vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()]
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
            decode_policy: DecodePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_npy_file")]
    pub npy_file: String,

    #[serde(default = "default_csv_file")]
    pub csv_file: String,

    #[serde(default = "default_paths_file")]
    pub paths_file: String,

    /// Liked and skipped indices recorded by `memeclip like` / `skip`
    #[serde(default = "default_likes_file")]
    pub likes_file: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_npy_file() -> String {
    "embeddings.npy".to_string()
}

fn default_csv_file() -> String {
    "embeddings.csv".to_string()
}

fn default_paths_file() -> String {
    "meme_paths.json".to_string()
}

fn default_likes_file() -> String {
    "likes.json".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            npy_file: default_npy_file(),
            csv_file: default_csv_file(),
            paths_file: default_paths_file(),
            likes_file: default_likes_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// L2-normalize the preference vector before ranking
    #[serde(default = "default_normalize")]
    pub normalize: bool,
}

fn default_top_k() -> usize {
    10
}

fn default_normalize() -> bool {
    true
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            normalize: default_normalize(),
        }
    }
}

impl Config {
    /// Load from `MEMECLIP_CONFIG` or the default location, writing defaults on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("MEMECLIP_CONFIG") {
            return PathBuf::from(path);
        }

        Self::config_dir().join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("memeclip")
    }
}
