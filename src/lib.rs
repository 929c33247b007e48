//! Image embeddings for a meme collection and preference-based ranking.
//!
//! - [`clip`]: CLIP visual encoder behind the [`clip::ImageEncoder`] trait
//! - [`pipeline`]: embed every image in a folder, in a stable order
//! - [`preference`]: mean of liked embeddings
//! - [`recommend`]: rank the collection against a preference vector
//! - [`store`]: `.npy`, CSV and JSON artifacts
//! - [`feedback`]: likes and skips persisted between runs

pub mod clip;
pub mod config;
pub mod embedding;
pub mod error;
pub mod feedback;
pub mod logging;
pub mod pipeline;
pub mod preference;
pub mod recommend;
pub mod store;

pub use clip::{ClipModel, ImageEncoder};
pub use embedding::{EmbeddingSet, ImageEmbedding, PreferenceVector};
pub use error::EmbedError;
pub use pipeline::embed_folder;
pub use preference::compute_preference;
