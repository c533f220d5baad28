/// Identity of a source image in the surrounding content system. The
/// pipeline only ever reads it and folds it into cache keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ImageId(pub u64);

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Focal region of a source image, normalized to 0..1 in both axes.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FocalPoint {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A source asset as handed over by the content system. Bytes live behind
/// the [`SourceFiles`](crate::store::SourceFiles) collaborator, not here.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SourceImage {
    pub id: ImageId,
    pub file_name: String, // stored name, e.g. "originals/beach-sunset.jpg"
    pub focal_point: Option<FocalPoint>,
}

impl SourceImage {
    pub fn new(id: ImageId, file_name: impl Into<String>) -> Self {
        Self {
            id,
            file_name: file_name.into(),
            focal_point: None,
        }
    }

    pub fn with_focal_point(mut self, focal_point: FocalPoint) -> Self {
        self.focal_point = Some(focal_point);
        self
    }

    /// File name without directories or extension.
    pub fn stem(&self) -> &str {
        let base = self
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.file_name);
        match base.rfind('.') {
            Some(i) if i > 0 => &base[..i],
            _ => base,
        }
    }

    /// Lowercased file extension, with `jpg` normalized to `jpeg`.
    pub fn native_format_name(&self) -> String {
        let ext = self
            .file_name
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        if ext == "jpg" { "jpeg".to_string() } else { ext }
    }
}

/// Encoded output format of a rendition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    WebpLossless,
}

impl ImageFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            "webp-lossless" => Some(Self::WebpLossless),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::WebpLossless => "webp-lossless",
        }
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp | Self::WebpLossless => "webp",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp | Self::WebpLossless => "image/webp",
        }
    }

    pub fn is_webp(self) -> bool {
        matches!(self, Self::Webp | Self::WebpLossless)
    }
}

/// A persisted derived image. The natural key is
/// `(image_id, filter_spec, focal_point_key)`; `id` is assigned by the
/// store at persistence and stays `None` for not-found placeholders.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rendition {
    pub id: Option<u64>,
    pub image_id: ImageId,
    pub filter_spec: String,
    pub focal_point_key: String,
    pub file_name: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl Rendition {
    /// Zero-size substitute returned when the source file is unreadable.
    /// Never persisted, never cached.
    pub fn not_found(image_id: ImageId, filter_spec: impl Into<String>) -> Self {
        Self {
            id: None,
            image_id,
            filter_spec: filter_spec.into(),
            focal_point_key: String::new(),
            file_name: "not-found".to_string(),
            url: "not-found".to_string(),
            width: 0,
            height: 0,
            format: ImageFormat::Png,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.id.is_none() && self.width == 0 && self.height == 0
    }

    /// `srcset` entry with a width descriptor.
    pub fn srcset_entry(&self) -> String {
        format!("{} {}w", self.url, self.width)
    }
}

/// Generator output that has not been persisted yet. Carries the encoded
/// bytes so the store can batch file writes with the row insert.
#[derive(Clone, Debug)]
pub struct NewRendition {
    pub image_id: ImageId,
    pub filter_spec: String,
    pub focal_point_key: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_strips_directories_and_extension() {
        let img = SourceImage::new(ImageId(1), "originals/beach-sunset.jpg");
        assert_eq!(img.stem(), "beach-sunset");

        let no_ext = SourceImage::new(ImageId(1), "beach");
        assert_eq!(no_ext.stem(), "beach");

        let dotfile = SourceImage::new(ImageId(1), ".hidden");
        assert_eq!(dotfile.stem(), ".hidden");
    }

    #[test]
    fn native_format_normalizes_jpg() {
        assert_eq!(
            SourceImage::new(ImageId(1), "a/b.JPG").native_format_name(),
            "jpeg"
        );
        assert_eq!(
            SourceImage::new(ImageId(1), "a/b.webp").native_format_name(),
            "webp"
        );
    }

    #[test]
    fn format_extension_and_mime() {
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::WebpLossless.extension(), "webp");
        assert_eq!(ImageFormat::WebpLossless.mime(), "image/webp");
        assert_eq!(
            ImageFormat::from_name("webp-lossless"),
            Some(ImageFormat::WebpLossless)
        );
        assert_eq!(ImageFormat::from_name("bmp"), None);
    }

    #[test]
    fn not_found_placeholder_is_zero_size() {
        let r = Rendition::not_found(ImageId(7), "width-400");
        assert!(r.is_not_found());
        assert_eq!(r.width, 0);
        assert_eq!(r.height, 0);
        assert_eq!(r.url, "not-found");
    }
}
