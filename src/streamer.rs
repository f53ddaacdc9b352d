//! File delivery: whole bodies, single byte ranges, and thumbnails.

use std::io::{Cursor, SeekFrom};
use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use crate::error::ApiError;
use crate::media::{sniff_file, Sniffed};

/// Edge length of the square thumbnail.
pub const THUMBNAIL_SIZE: u32 = 100;
const THUMBNAIL_QUALITY: u8 = 80;

/// Inclusive byte range, always within the file: `start <= end < size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Parses a `Range` header value of the form `bytes=<start>-<end>` against
    /// a file of `size` bytes.
    ///
    /// A missing or unparsable end means "to the last byte"; an end past the
    /// file is clamped. Anything else that cannot be satisfied is rejected.
    pub fn parse(header: &str, size: u64) -> Result<Self, ApiError> {
        let unsatisfiable = || ApiError::RangeNotSatisfiable { size };

        let spec = header.trim().strip_prefix("bytes=").ok_or_else(unsatisfiable)?;
        let (start, end) = spec.split_once('-').ok_or_else(unsatisfiable)?;
        if end.contains('-') {
            return Err(unsatisfiable());
        }

        let start: u64 = start.trim().parse().map_err(|_| unsatisfiable())?;
        if size == 0 || start >= size {
            return Err(unsatisfiable());
        }
        let last = size - 1;
        let end = end
            .trim()
            .parse::<u64>()
            .map_or(last, |end| end.min(last));
        if start > end {
            return Err(unsatisfiable());
        }

        Ok(Self { start, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

/// Serves the file at `path`, which must already have passed the guard.
///
/// The response body owns the open file; it is closed when the body is
/// dropped, whether the transfer finished, failed, or the client went away.
pub async fn serve_file(
    path: &Path,
    range: Option<&str>,
    thumbnail: bool,
) -> Result<Response, ApiError> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        error!("Failed to open file {}: {}", path.display(), e);
        ApiError::from_io(path, &e, "Unable to open file")
    })?;
    let metadata = file
        .metadata()
        .await
        .map_err(|e| ApiError::from_io(path, &e, "Unable to get file info"))?;
    if metadata.is_dir() {
        return Err(ApiError::Unreadable {
            path: path.to_path_buf(),
            message: "Unable to open file".to_string(),
        });
    }
    let size = metadata.len();

    let sniffed = sniff_file(path)
        .await
        .map_err(|e| ApiError::from_io(path, &e, "Unable to detect mime type"))?;

    if thumbnail {
        drop(file);
        return serve_thumbnail(path.to_path_buf(), sniffed).await;
    }

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(&sniffed.mime));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let Some(range) = range else {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
        let body = Body::from_stream(ReaderStream::new(file));
        return Ok((StatusCode::OK, headers, body).into_response());
    };

    let range = ByteRange::parse(range, size)?;
    file.seek(SeekFrom::Start(range.start)).await.map_err(|e| {
        error!("Failed to seek {} to {}: {}", path.display(), range.start, e);
        ApiError::Unreadable {
            path: path.to_path_buf(),
            message: "Unable to seek file".to_string(),
        }
    })?;
    debug!("Serving {} bytes {}-{}", path.display(), range.start, range.end);

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.len()));
    headers.insert(header::CONTENT_RANGE, header_value(&range.content_range(size)));
    let body = Body::from_stream(ReaderStream::new(file.take(range.len())));
    Ok((StatusCode::PARTIAL_CONTENT, headers, body).into_response())
}

async fn serve_thumbnail(path: PathBuf, sniffed: Sniffed) -> Result<Response, ApiError> {
    if !sniffed.is_image() {
        return Err(ApiError::UnsupportedMediaType(sniffed.mime));
    }

    let jpeg = tokio::task::spawn_blocking(move || render_thumbnail(&path))
        .await
        .map_err(|e| ApiError::Thumbnail(e.to_string()))??;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"))],
        jpeg,
    )
        .into_response())
}

/// Decodes the image at `path`, crops it to a centered square, scales it to
/// [`THUMBNAIL_SIZE`] and encodes it as JPEG.
pub fn render_thumbnail(path: &Path) -> Result<Vec<u8>, ApiError> {
    let data = std::fs::read(path).map_err(|e| ApiError::from_io(path, &e, "Unable to open file"))?;
    // Format comes from the content, not the extension.
    let img = image::load_from_memory(&data).map_err(|e| {
        error!("Failed to open image {}: {}", path.display(), e);
        ApiError::Thumbnail(e.to_string())
    })?;
    encode_thumbnail(&img)
}

fn encode_thumbnail(img: &DynamicImage) -> Result<Vec<u8>, ApiError> {
    let thumb = img.resize_to_fill(THUMBNAIL_SIZE, THUMBNAIL_SIZE, FilterType::Lanczos3);
    // JPEG has no alpha channel.
    let rgb = thumb.to_rgb8();

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, THUMBNAIL_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| {
            error!("Failed to encode thumbnail: {}", e);
            ApiError::Thumbnail(e.to_string())
        })?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use image::{GenericImageView, ImageFormat, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn hundred_bytes(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("data.bin");
        let bytes: Vec<u8> = (0..100u8).collect();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(
            ByteRange::parse("bytes=10-19", 100).unwrap(),
            ByteRange { start: 10, end: 19 }
        );
        assert_eq!(
            ByteRange::parse("bytes=95-200", 100).unwrap(),
            ByteRange { start: 95, end: 99 }
        );
        assert_eq!(
            ByteRange::parse("bytes=40-", 100).unwrap(),
            ByteRange { start: 40, end: 99 }
        );
        assert_eq!(ByteRange::parse("bytes=0-0", 100).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_range_unsatisfiable() {
        for header in [
            "bytes=150-",
            "bytes=100-100",
            "bytes=20-10",
            "bytes=-10",
            "bytes=abc-10",
            "items=0-10",
            "bytes=0-1-2",
            "bytes=5",
        ] {
            assert!(
                matches!(
                    ByteRange::parse(header, 100),
                    Err(ApiError::RangeNotSatisfiable { size: 100 })
                ),
                "{header} should be unsatisfiable"
            );
        }
        assert!(ByteRange::parse("bytes=0-", 0).is_err());
    }

    #[test]
    fn test_content_range() {
        let range = ByteRange { start: 10, end: 19 };
        assert_eq!(range.content_range(100), "bytes 10-19/100");
        assert_eq!(range.len(), 10);
    }

    #[tokio::test]
    async fn test_serve_full_body() {
        let dir = TempDir::new().unwrap();
        let path = hundred_bytes(&dir);

        let response = serve_file(&path, None, false).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), 100);
    }

    #[tokio::test]
    async fn test_serve_range() {
        let dir = TempDir::new().unwrap();
        let path = hundred_bytes(&dir);

        let response = serve_file(&path, Some("bytes=10-19"), false).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 10-19/100");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), &(10..20u8).collect::<Vec<_>>()[..]);
    }

    #[tokio::test]
    async fn test_serve_range_clamped() {
        let dir = TempDir::new().unwrap();
        let path = hundred_bytes(&dir);

        let response = serve_file(&path, Some("bytes=95-200"), false).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 95-99/100");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), &[95, 96, 97, 98, 99]);
    }

    #[tokio::test]
    async fn test_serve_range_past_end() {
        let dir = TempDir::new().unwrap();
        let path = hundred_bytes(&dir);

        let result = serve_file(&path, Some("bytes=150-"), false).await;
        assert!(matches!(result, Err(ApiError::RangeNotSatisfiable { size: 100 })));
    }

    #[tokio::test]
    async fn test_serve_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = serve_file(&dir.path().join("nope"), None, false).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_thumbnail_of_text_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "not an image").unwrap();

        let result = serve_file(&path, None, true).await;
        assert!(matches!(result, Err(ApiError::UnsupportedMediaType(_))));
    }

    #[tokio::test]
    async fn test_thumbnail_of_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wide.png");
        let img = RgbaImage::from_pixel(300, 150, Rgba([200, 10, 10, 128]));
        img.save_with_format(&path, ImageFormat::Png).unwrap();

        let response = serve_file(&path, None, true).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let thumb = image::load_from_memory_with_format(&body, ImageFormat::Jpeg).unwrap();
        assert_eq!(thumb.dimensions(), (THUMBNAIL_SIZE, THUMBNAIL_SIZE));
    }

    #[tokio::test]
    async fn test_thumbnail_of_corrupt_image() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0, 0x00]).unwrap();

        let result = serve_file(&path, None, true).await;
        assert!(matches!(result, Err(ApiError::Thumbnail(_))));
    }
}
