//! Snippet image store
//!
//! Snippet images live in a directory the host serves statically. Images
//! arrive either as an upload or by downloading a URL (typically the first
//! image of a post). Every image is decoded, scaled to the configured snippet
//! size and saved as `sn-{unix time}.{ext}`.

use anyhow::Context;
use chrono::Utc;
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::CmsSettings;

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Largest image accepted, uploaded or downloaded
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SnippetImageError {
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("Not a readable image: {0}")]
    InvalidImage(String),

    #[error("Image is larger than {} bytes", MAX_IMAGE_BYTES)]
    TooLarge,

    #[error("Failed to download image: {0}")]
    Download(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// How an image whose shape differs from the snippet box is fitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// Fill the box and crop the overflow
    Crop,
    /// Like `Crop`, except images taller than the box are scaled to its
    /// height and padded left and right
    PadWhenTall,
}

pub struct SnippetStore {
    dir: PathBuf,
    url_prefix: String,
    site_url: String,
    width: u32,
    height: u32,
    client: reqwest::Client,
}

impl SnippetStore {
    pub fn new(settings: &CmsSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            dir: settings.snippet_image_dir.clone(),
            url_prefix: settings.snippet_image_url_prefix.trim_end_matches('/').to_string(),
            site_url: settings.site_url.clone(),
            width: settings.snippet_image_width.max(1),
            height: settings.snippet_image_height.max(1),
            client,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the image directory if it is missing
    pub async fn ensure_dir(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create snippet image directory {}", self.dir.display()))
    }

    /// Save an uploaded image. The extension comes from the file name, else
    /// from the content type. Tall uploads are padded rather than cropped.
    pub async fn save_upload(
        &self,
        file_name: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, SnippetImageError> {
        let ext = file_name
            .and_then(extension_from_path)
            .or_else(|| content_type.and_then(extension_from_content_type))
            .ok_or_else(|| {
                SnippetImageError::UnsupportedType(
                    file_name.or(content_type).unwrap_or("unknown").to_string(),
                )
            })?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(SnippetImageError::TooLarge);
        }
        self.save(ext, bytes.to_vec(), Fit::PadWhenTall).await
    }

    /// Download `url` into the store. Site-relative URLs are resolved
    /// against the configured site URL.
    pub async fn import_from_url(&self, url: &str) -> Result<String, SnippetImageError> {
        let absolute = if url.starts_with('/') {
            format!("{}{}", self.site_url.trim_end_matches('/'), url)
        } else {
            url.to_string()
        };

        let mut response = self
            .client
            .get(&absolute)
            .send()
            .await
            .map_err(|e| SnippetImageError::Download(format!("{}: {}", absolute, e)))?;
        if !response.status().is_success() {
            return Err(SnippetImageError::Download(format!(
                "{} returned {}",
                absolute,
                response.status()
            )));
        }
        if response.content_length().is_some_and(|len| len > MAX_IMAGE_BYTES as u64) {
            return Err(SnippetImageError::TooLarge);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let path = absolute.split(['?', '#']).next().unwrap_or_default().to_string();
        let ext = extension_from_path(&path)
            .or_else(|| content_type.as_deref().and_then(extension_from_content_type))
            .ok_or_else(|| SnippetImageError::UnsupportedType(absolute.clone()))?;

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SnippetImageError::Download(format!("{}: {}", absolute, e)))?
        {
            if bytes.len() + chunk.len() > MAX_IMAGE_BYTES {
                return Err(SnippetImageError::TooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }
        self.save(ext, bytes, Fit::Crop).await
    }

    async fn save(&self, ext: &'static str, bytes: Vec<u8>, fit: Fit) -> Result<String, SnippetImageError> {
        let (width, height) = (self.width, self.height);
        let encoded = tokio::task::spawn_blocking(move || resize_and_encode(&bytes, ext, width, height, fit))
            .await
            .context("Image processing task failed")??;

        self.ensure_dir().await?;
        let stamp = Utc::now().timestamp();
        let mut name = format!("sn-{}.{}", stamp, ext);
        let mut n = 1;
        while tokio::fs::try_exists(self.dir.join(&name)).await.unwrap_or(false) {
            name = format!("sn-{}-{}.{}", stamp, n, ext);
            n += 1;
        }

        tokio::fs::write(self.dir.join(&name), encoded)
            .await
            .with_context(|| format!("Failed to write snippet image {}", name))?;
        tracing::info!("Saved snippet image {} ({}x{})", name, width, height);
        Ok(format!("{}/{}", self.url_prefix, name))
    }
}

/// Decode `bytes`, fit them into `width` x `height` and encode as `ext`
pub fn resize_and_encode(
    bytes: &[u8],
    ext: &str,
    width: u32,
    height: u32,
    fit: Fit,
) -> Result<Vec<u8>, SnippetImageError> {
    let decoded = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("Failed to read image")?
        .decode()
        .map_err(|e| SnippetImageError::InvalidImage(e.to_string()))?;

    let fitted = fit_image(&decoded, width, height, fit);
    let format = ImageFormat::from_extension(ext).ok_or_else(|| SnippetImageError::UnsupportedType(ext.to_string()))?;
    let fitted = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(fitted.to_rgb8()),
        _ => fitted,
    };

    let mut out = Cursor::new(Vec::new());
    fitted
        .write_to(&mut out, format)
        .with_context(|| format!("Failed to encode {} image", ext))?;
    Ok(out.into_inner())
}

pub fn fit_image(image: &DynamicImage, width: u32, height: u32, fit: Fit) -> DynamicImage {
    let (w, h) = image.dimensions();
    let tall = u64::from(h) * u64::from(width) > u64::from(w) * u64::from(height);
    if fit == Fit::PadWhenTall && tall {
        let scaled = image.resize(width, height, FilterType::Lanczos3);
        let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        let x = (width - scaled.width()) / 2;
        let y = (height - scaled.height()) / 2;
        image::imageops::overlay(&mut canvas, &scaled.to_rgba8(), i64::from(x), i64::from(y));
        DynamicImage::ImageRgba8(canvas)
    } else {
        image.resize_to_fill(width, height, FilterType::Lanczos3)
    }
}

/// Allowed image extension of a path or URL path, lower-cased
pub fn extension_from_path(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_lowercase();
    ALLOWED_EXTENSIONS.iter().copied().find(|allowed| *allowed == ext)
}

pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// PNG of the given size, for tests that need real image bytes
#[cfg(test)]
pub(crate) fn test_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image).write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
