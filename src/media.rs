//! Content-based media detection.
//!
//! Files are classified by their leading bytes, never by extension. The
//! extension is only consulted afterwards to pick a more precise subtype for
//! content that sniffs as plain text.

use std::path::Path;

use serde::Serialize;
use tokio::io::AsyncReadExt;

/// Number of leading bytes read for sniffing.
const SNIFF_LEN: usize = 512;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

/// Result of sniffing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sniffed {
    pub mime: String,
    pub kind: Option<MediaKind>,
}

impl Sniffed {
    fn new(mime: &str, kind: Option<MediaKind>) -> Self {
        Self {
            mime: mime.to_string(),
            kind,
        }
    }

    pub fn is_image(&self) -> bool {
        self.kind == Some(MediaKind::Image)
    }
}

/// A magic-number signature. `None` bytes match anything.
struct Signature {
    offset: usize,
    bytes: &'static [Option<u8>],
    mime: &'static str,
    kind: Option<MediaKind>,
}

macro_rules! sig {
    (@byte _) => { None };
    (@byte $b:tt) => { Some($b) };
    ($mime:expr, $kind:expr, $offset:expr, [$($b:tt),+ $(,)?]) => {
        Signature {
            offset: $offset,
            bytes: &[$(sig!(@byte $b)),+],
            mime: $mime,
            kind: $kind,
        }
    };
}

use MediaKind::{Audio, Image, Video};

// Order matters: RIFF containers are told apart by the fourcc at offset 8.
static SIGNATURES: &[Signature] = &[
    sig!("image/jpeg", Some(Image), 0, [0xFF, 0xD8, 0xFF]),
    sig!("image/png", Some(Image), 0, [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
    sig!("image/gif", Some(Image), 0, [0x47, 0x49, 0x46, 0x38, _, 0x61]),
    sig!("image/webp", Some(Image), 0, [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50]),
    sig!("image/bmp", Some(Image), 0, [0x42, 0x4D]),
    sig!("video/avi", Some(Video), 0, [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x41, 0x56, 0x49, 0x20]),
    sig!("audio/wav", Some(Audio), 0, [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x41, 0x56, 0x45]),
    sig!("video/webm", Some(Video), 0, [0x1A, 0x45, 0xDF, 0xA3]),
    sig!("audio/flac", Some(Audio), 0, [0x66, 0x4C, 0x61, 0x43]),
    sig!("audio/mpeg", Some(Audio), 0, [0x49, 0x44, 0x33]),
    sig!("audio/mpeg", Some(Audio), 0, [0xFF, 0xFB]),
    sig!("audio/mpeg", Some(Audio), 0, [0xFF, 0xF3]),
    sig!("audio/aac", Some(Audio), 0, [0xFF, 0xF1]),
    sig!("audio/aac", Some(Audio), 0, [0xFF, 0xF9]),
    sig!("application/pdf", None, 0, [0x25, 0x50, 0x44, 0x46, 0x2D]),
    sig!("application/zip", None, 0, [0x50, 0x4B, 0x03, 0x04]),
    sig!("application/gzip", None, 0, [0x1F, 0x8B]),
];

/// ISO base media files (`....ftyp<brand>`) share one box layout; the major
/// brand says whether the file is a movie, an M4A, or a HEIF/AVIF still.
fn sniff_ftyp(head: &[u8]) -> Option<Sniffed> {
    if head.get(4..8) != Some(b"ftyp".as_slice()) {
        return None;
    }
    let sniffed = match head.get(8..12)? {
        b"isom" | b"iso2" | b"mp41" | b"mp42" | b"avc1" | b"dash" | b"M4V " => {
            Sniffed::new("video/mp4", Some(Video))
        }
        b"qt  " => Sniffed::new("video/quicktime", Some(Video)),
        b"3gp4" | b"3gp5" | b"3gp6" => Sniffed::new("video/3gpp", Some(Video)),
        b"M4A " | b"M4B " => Sniffed::new("audio/mp4", Some(Audio)),
        // The thumbnail decoder cannot read these, so they are not listed as images.
        b"heic" | b"heix" | b"mif1" | b"msf1" => Sniffed::new("image/heic", None),
        b"avif" | b"avis" => Sniffed::new("image/avif", None),
        _ => Sniffed::new("application/octet-stream", None),
    };
    Some(sniffed)
}

impl Signature {
    fn matches(&self, head: &[u8]) -> bool {
        let Some(window) = head.get(self.offset..self.offset + self.bytes.len()) else {
            return false;
        };
        window
            .iter()
            .zip(self.bytes)
            .all(|(actual, expected)| expected.map_or(true, |b| b == *actual))
    }
}

/// Classifies `head` (the first bytes of a file). `path` only refines text types.
pub fn sniff_bytes(head: &[u8], path: &Path) -> Sniffed {
    if let Some(sniffed) = sniff_ftyp(head) {
        return sniffed;
    }
    if let Some(sig) = SIGNATURES.iter().find(|sig| sig.matches(head)) {
        return Sniffed::new(sig.mime, sig.kind);
    }

    // Ogg carries audio or video; peek at the first codec header.
    if head.starts_with(b"OggS") {
        let is_video = head.windows(6).any(|w| w == b"theora") || head.windows(3).any(|w| w == b"VP8");
        return if is_video {
            Sniffed::new("video/ogg", Some(Video))
        } else {
            Sniffed::new("audio/ogg", Some(Audio))
        };
    }

    if looks_like_text(head) {
        let guess = mime_guess::from_path(path).first();
        return match guess {
            Some(mime) if mime.type_().as_str() == "text" => {
                Sniffed::new(&format!("{}; charset=utf-8", mime.essence_str()), None)
            }
            Some(mime) if mime.essence_str() == "application/json" => {
                Sniffed::new("application/json", None)
            }
            _ => Sniffed::new("text/plain; charset=utf-8", None),
        };
    }

    Sniffed::new("application/octet-stream", None)
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte character may be cut off at the end of the sniff window.
        Err(e) => e.error_len().is_none(),
    }
}

/// Reads the head of the file at `path` and classifies it.
pub async fn sniff_file(path: &Path) -> std::io::Result<Sniffed> {
    let file = tokio::fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
    Ok(sniff_bytes(&head, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sniff(bytes: &[u8]) -> Sniffed {
        sniff_bytes(bytes, Path::new("blob"))
    }

    #[test]
    fn test_images() {
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10]).mime, "image/jpeg");
        assert!(sniff(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR").is_image());
        assert_eq!(sniff(b"GIF89a\x01\x00").mime, "image/gif");
        assert_eq!(sniff(b"RIFF\x24\0\0\0WEBPVP8 ").mime, "image/webp");
        assert_eq!(sniff(b"BM\x36\0\0\0").kind, Some(MediaKind::Image));
    }

    #[test]
    fn test_riff_variants() {
        assert_eq!(sniff(b"RIFF\x24\0\0\0WAVEfmt ").kind, Some(MediaKind::Audio));
        assert_eq!(sniff(b"RIFF\x24\0\0\0AVI LIST").kind, Some(MediaKind::Video));
    }

    #[test]
    fn test_video_and_audio() {
        assert_eq!(sniff(b"\0\0\0\x20ftypisom\0\0\x02\0").mime, "video/mp4");
        assert_eq!(sniff(b"\0\0\0\x14ftypqt  ").mime, "video/quicktime");
        assert_eq!(sniff(b"\0\0\0\x20ftypM4A \0\0").kind, Some(MediaKind::Audio));
        assert_eq!(sniff(&[0x1A, 0x45, 0xDF, 0xA3, 0x9F]).kind, Some(MediaKind::Video));
        assert_eq!(sniff(b"ID3\x04\0\0").mime, "audio/mpeg");
        assert_eq!(sniff(b"fLaC\0\0\0\x22").mime, "audio/flac");
        assert_eq!(sniff(b"OggS\0\x02\0\0\x01vorbis").kind, Some(MediaKind::Audio));
        assert_eq!(sniff(b"OggS\0\x02\0\0\x80theora").kind, Some(MediaKind::Video));
    }

    #[test]
    fn test_ftyp_brands() {
        let boxed = |brand: &[u8; 4]| {
            let mut head = b"\0\0\0\x18ftyp".to_vec();
            head.extend_from_slice(brand);
            head.extend_from_slice(b"\0\0\0\0mif1heic");
            head
        };

        for brand in [b"isom", b"iso2", b"mp41", b"mp42", b"avc1", b"dash", b"M4V "] {
            let sniffed = sniff(&boxed(brand));
            assert_eq!(sniffed.mime, "video/mp4");
            assert_eq!(sniffed.kind, Some(MediaKind::Video));
        }
        for brand in [b"heic", b"heix", b"mif1", b"msf1"] {
            let sniffed = sniff_bytes(&boxed(brand), Path::new("IMG_0001.HEIC"));
            assert_eq!(sniffed, Sniffed::new("image/heic", None));
        }
        for brand in [b"avif", b"avis"] {
            assert_eq!(sniff(&boxed(brand)), Sniffed::new("image/avif", None));
        }
        assert_eq!(sniff(&boxed(b"crx ")).mime, "application/octet-stream");
        // Truncated before the brand.
        assert_eq!(sniff(b"\0\0\0\x18ftyp").kind, None);
    }

    #[test]
    fn test_content_wins_over_extension() {
        let sniffed = sniff_bytes(b"just some words", Path::new("photo.jpg"));
        assert_eq!(sniffed.kind, None);
        assert_eq!(sniffed.mime, "text/plain; charset=utf-8");

        let sniffed = sniff_bytes(&[0xFF, 0xD8, 0xFF, 0xDB], Path::new("notes.txt"));
        assert!(sniffed.is_image());
    }

    #[test]
    fn test_text_subtype_from_extension() {
        assert_eq!(
            sniff_bytes(b"<html></html>", Path::new("index.html")).mime,
            "text/html; charset=utf-8"
        );
        assert_eq!(
            sniff_bytes(b"{\"a\":1}", Path::new("data.json")).mime,
            "application/json"
        );
    }

    #[test]
    fn test_binary_and_empty() {
        assert_eq!(sniff(&[0x00, 0x01, 0x02, 0xFE]).mime, "application/octet-stream");
        assert_eq!(sniff(b"").mime, "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn test_sniff_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pic");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F']).unwrap();
        assert!(sniff_file(&path).await.unwrap().is_image());

        assert!(sniff_file(&dir.path().join("missing")).await.is_err());
    }
}
