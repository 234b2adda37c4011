//! # Image Service
//!
//! User avatars and profile photos. The local cache keeps each image
//! stamped with the remote `updated_at` it was downloaded at, so a
//! refresh costs one metadata call when nothing changed.

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader};
use jb_core::{
    profile_image_path, user_image_path, AppError, BlobMeta, CachedImage, LocalCache, Result,
};
use tracing::{debug, info, warn};

use crate::gateway::RemoteGateway;

/// Long edge of the stored profile photo.
pub const PROFILE_MAX_EDGE: u32 = 1024;
/// Long edge of the avatar shown beside content.
pub const AVATAR_MAX_EDGE: u32 = 256;
const JPEG_QUALITY: u8 = 85;
const JPEG_MIME: &str = "image/jpeg";

/// Decodes any supported format and re-encodes it as a JPEG no larger
/// than `max_edge` on either side. Smaller images keep their size.
pub fn encode_jpeg(raw: &[u8], max_edge: u32) -> Result<Vec<u8>> {
    let img = ImageReader::new(Cursor::new(raw))
        .with_guessed_format()
        .map_err(|e| AppError::Image(e.to_string()))?
        .decode()
        .map_err(|e| AppError::Image(e.to_string()))?;

    let img = if img.width() > max_edge || img.height() > max_edge {
        img.thumbnail(max_edge, max_edge)
    } else {
        img
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))
        .map_err(|e| AppError::Image(e.to_string()))?;
    Ok(out)
}

pub struct ImageService {
    gateway: Arc<RemoteGateway>,
    cache: Arc<dyn LocalCache>,
}

impl ImageService {
    pub fn new(gateway: Arc<RemoteGateway>, cache: Arc<dyn LocalCache>) -> Self {
        Self { gateway, cache }
    }

    /// Brings the cached avatar of every listed user up to date.
    /// Returns how many were downloaded; failures are logged per image.
    pub async fn prefetch_user_images(&self, user_ids: &[String]) -> usize {
        let mut downloaded = 0;
        for user_id in user_ids {
            match self.refresh(&user_image_path(user_id)).await {
                Ok((_, true)) => downloaded += 1,
                Ok(_) => {}
                Err(err) => warn!(user = %user_id, error = %err, "avatar prefetch failed"),
            }
        }
        debug!(requested = user_ids.len(), downloaded, "avatar prefetch finished");
        downloaded
    }

    pub async fn user_image(&self, user_id: &str) -> Option<Vec<u8>> {
        self.cached_or_remote(&user_image_path(user_id)).await
    }

    pub async fn profile_image(&self, user_id: &str) -> Option<Vec<u8>> {
        self.cached_or_remote(&profile_image_path(user_id)).await
    }

    /// Stores a new profile photo and the matching avatar, remotely and in the cache.
    pub async fn upload_profile_image(&self, user_id: &str, raw: &[u8]) -> Result<BlobMeta> {
        let profile = encode_jpeg(raw, PROFILE_MAX_EDGE)?;
        let avatar = encode_jpeg(raw, AVATAR_MAX_EDGE)?;

        let profile_path = profile_image_path(user_id);
        let avatar_path = user_image_path(user_id);
        let profile_meta = self
            .gateway
            .upload_blob(&profile_path, profile.clone(), JPEG_MIME)
            .await?;
        let avatar_meta = self
            .gateway
            .upload_blob(&avatar_path, avatar.clone(), JPEG_MIME)
            .await?;

        self.remember(&profile_path, profile, &profile_meta).await;
        self.remember(&avatar_path, avatar, &avatar_meta).await;
        info!(user = user_id, bytes = profile_meta.size, "profile image uploaded");
        Ok(profile_meta)
    }

    /// Cache when current, remote when newer, cache again when the remote is down.
    async fn cached_or_remote(&self, path: &str) -> Option<Vec<u8>> {
        match self.refresh(path).await {
            Ok((image, _)) => image.map(|i| i.bytes),
            Err(err) => {
                warn!(path, error = %err, "image refresh failed, using cached copy");
                self.cache.load_image(path).map(|i| i.bytes)
            }
        }
    }

    /// Returns the current image at `path` and whether it had to be downloaded.
    async fn refresh(&self, path: &str) -> Result<(Option<CachedImage>, bool)> {
        let cached = self.cache.load_image(path);
        let Some(meta) = self.gateway.blob_metadata(path).await? else {
            return Ok((None, false));
        };
        if let Some(cached) = cached {
            if cached.updated_at >= meta.updated_at {
                return Ok((Some(cached), false));
            }
        }

        let Some(bytes) = self.gateway.download_blob(path).await? else {
            return Ok((None, false));
        };
        let image = CachedImage {
            bytes,
            updated_at: meta.updated_at,
        };
        if let Err(err) = self.cache.store_image(path, &image).await {
            warn!(path, error = %err, "failed to cache image");
        }
        Ok((Some(image), true))
    }

    async fn remember(&self, path: &str, bytes: Vec<u8>, meta: &BlobMeta) {
        let image = CachedImage {
            bytes,
            updated_at: meta.updated_at,
        };
        if let Err(err) = self.cache.store_image(path, &image).await {
            warn!(path, error = %err, "failed to cache uploaded image");
        }
    }
}
