use std::path::PathBuf;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use uuid::Uuid;

use crate::{constants::MAX_UPLOAD_BYTES, database::error::Error};

/// Directory images are stored under, relative to the asset root.
pub const IMAGE_DIRECTORY: &str = "recipes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Decodes `data:image/<subtype>;base64,<data>`. The subtype becomes the file extension.
pub fn decode_data_uri(uri: &str) -> Result<DecodedImage, Error> {
    let (format, data) = uri
        .split_once(";base64,")
        .ok_or_else(|| Error::validation("Image must be a base64 data URI"))?;

    let extension = format
        .strip_prefix("data:image/")
        .ok_or_else(|| Error::validation("Only image uploads are accepted"))?;

    if extension.is_empty()
        || extension.len() > 10
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(Error::validation("Invalid image type"));
    }

    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| Error::Validation(format!("Invalid image data: {e}")))?;

    if bytes.is_empty() {
        return Err(Error::validation("Image is empty"));
    }
    if bytes.len() as u64 > MAX_UPLOAD_BYTES {
        return Err(Error::validation("Image is too large"));
    }

    Ok(DecodedImage {
        extension: extension.to_ascii_lowercase(),
        bytes,
    })
}

/// Blob storage for uploaded images.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Stores the image and returns a reference it can be retrieved by.
    async fn store(&self, image: DecodedImage) -> Result<String, Error>;
}

pub async fn save_image(uri: &str, assets: &dyn AssetStore) -> Result<String, Error> {
    let image = decode_data_uri(uri)?;
    assets.store(image).await
}

/// Writes images to `<root>/recipes/<uuid>.<ext>`.
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn store(&self, image: DecodedImage) -> Result<String, Error> {
        let directory = self.root.join(IMAGE_DIRECTORY);
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| Error::Transaction(format!("Failed to create media directory: {e}")))?;

        let file_name = format!("{}.{}", Uuid::new_v4(), image.extension);
        tokio::fs::write(directory.join(&file_name), &image.bytes)
            .await
            .map_err(|e| Error::Transaction(format!("Failed to store image: {e}")))?;

        log::info!("Stored image {file_name} ({} bytes)", image.bytes.len());

        Ok(format!("{IMAGE_DIRECTORY}/{file_name}"))
    }
}
