use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Image formats the resolver can recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Avif,
    Svg,
}

impl ImageFormat {
    /// Canonical file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Svg => "svg",
        }
    }

    /// Sniff from magic bytes, falling back to the URL path extension (SVG is
    /// text and has no magic signature).
    pub fn detect(bytes: &[u8], url_path: &str) -> Option<Self> {
        if let Ok(format) = image::guess_format(bytes) {
            return match format {
                image::ImageFormat::Jpeg => Some(Self::Jpeg),
                image::ImageFormat::Png => Some(Self::Png),
                image::ImageFormat::Gif => Some(Self::Gif),
                image::ImageFormat::WebP => Some(Self::Webp),
                image::ImageFormat::Avif => Some(Self::Avif),
                _ => None,
            };
        }
        Self::from_extension(url_path.rsplit('.').next().unwrap_or(""))
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            "avif" => Some(Self::Avif),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }

    /// Whether an `allowedFormats` policy list (extension strings) admits
    /// this format. "jpg" and "jpeg" are interchangeable.
    pub fn allowed_by(self, allowed: &[String]) -> bool {
        allowed.iter().any(|a| {
            let a = a.to_ascii_lowercase();
            a == self.extension() || (self == Self::Jpeg && a == "jpeg")
        })
    }
}

/// One downloaded image: the original reference and where it lives now.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub original_url: String,
    pub local_path: PathBuf,
    pub new_public_url: String,
    pub format: ImageFormat,
    pub bytes: u64,
}

/// The set of all resolved images for a run, keyed by normalized original
/// URL. BTreeMap keeps the persisted artifact deterministically ordered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewriteMap {
    refs: BTreeMap<String, ImageRef>,
}

impl RewriteMap {
    pub fn insert(&mut self, image: ImageRef) {
        self.refs.insert(image.original_url.clone(), image);
    }

    pub fn get(&self, original_url: &str) -> Option<&ImageRef> {
        self.refs.get(original_url)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRef> {
        self.refs.values()
    }
}
