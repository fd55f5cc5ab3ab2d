//! Access to the photo library that owns the assets being classified.
//!
//! The pipeline only talks to [`AssetSource`]; [`FolderLibrary`] is the
//! filesystem-backed implementation used by the binaries.

mod folder;

use std::fmt;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use folder::FolderLibrary;
pub(crate) use folder::{is_hidden, is_image_file};

/// Opaque identifier of an asset inside its library.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetRef(String);

impl AssetRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How eagerly the library should produce pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Lowest-cost local rendition, never fetched over the network.
    Fast,
    /// Whatever good-enough rendition is available locally.
    Opportunistic,
    /// Full-quality rendition at exactly the requested size.
    Exact,
}

/// How the source image is fitted into the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFit {
    /// Scale to fit inside the box, keeping aspect ratio.
    AspectFit,
    /// Scale and crop to cover the box exactly.
    AspectFill,
}

/// Parameters of a single image retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRequest {
    pub width: u32,
    pub height: u32,
    pub fit: ContentFit,
    pub mode: DeliveryMode,
}

impl ImageRequest {
    /// Square request of `size` pixels per edge.
    pub fn square(size: u32, fit: ContentFit, mode: DeliveryMode) -> Self {
        Self {
            width: size,
            height: size,
            fit,
            mode,
        }
    }
}

/// Errors reported by an asset source.
#[derive(Debug, Error)]
pub enum AssetError {
    /// The library itself could not be enumerated.
    #[error("Failed to enumerate library {location}: {reason}")]
    Enumerate { location: String, reason: String },
    /// The named group does not exist.
    #[error("Unknown group: {0}")]
    UnknownGroup(String),
    /// No image could be produced for the asset.
    #[error("Image unavailable for {asset}: {reason}")]
    ImageUnavailable { asset: AssetRef, reason: String },
}

/// Enumeration and image retrieval for a photo library.
///
/// Implementations are shared across worker threads; `fetch_image` may block
/// the calling thread for decoding or I/O.
pub trait AssetSource: Send + Sync {
    /// Names of the top-level groups (albums) in the library.
    fn list_groups(&self) -> Result<Vec<String>, AssetError>;

    /// Every image asset in the library.
    fn list_assets(&self) -> Result<Vec<AssetRef>, AssetError>;

    /// Assets that belong to `group`.
    fn list_group_items(&self, group: &str) -> Result<Vec<AssetRef>, AssetError>;

    /// Produce pixels for `asset` according to `request`.
    fn fetch_image(
        &self,
        asset: &AssetRef,
        request: ImageRequest,
    ) -> Result<DynamicImage, AssetError>;
}
