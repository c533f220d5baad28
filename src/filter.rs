use xxhash_rust::xxh3::xxh3_64;

use crate::{
    error::{PicturaError, PicturaResult},
    model::SourceImage,
};

/// One normalized image-transform pipeline, e.g.
/// `width-400|format-webp|webpquality-85`. Structural validation of the
/// individual operations is the codec's job; this type only guarantees
/// well-formed syntax. Two filters are equal iff their spec strings are.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Filter {
    spec: String,
}

impl Filter {
    pub fn new(spec: impl Into<String>) -> PicturaResult<Self> {
        let spec = spec.into();
        if spec.is_empty() {
            return Err(PicturaError::malformed_spec("empty filter spec"));
        }
        for op in spec.split('|') {
            if op.is_empty() {
                return Err(PicturaError::malformed_spec(format!(
                    "empty operation in filter spec '{spec}'"
                )));
            }
            if !op
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            {
                return Err(PicturaError::malformed_spec(format!(
                    "invalid operation '{op}' in filter spec '{spec}'"
                )));
            }
        }
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.spec.split('|')
    }

    /// Whether any operation varies with the image's focal point. Only
    /// `fill` crops toward the focal region.
    fn varies_with_focal_point(&self) -> bool {
        self.operations().any(|op| op.starts_with("fill-"))
    }

    /// Per-image component of this filter's identity. Empty for filters
    /// whose output does not depend on image-specific parameters; an
    /// 8-hex-char digest of the focal point otherwise.
    pub fn cache_key(&self, image: &SourceImage) -> String {
        let Some(fp) = image.focal_point else {
            return String::new();
        };
        if !self.varies_with_focal_point() {
            return String::new();
        }

        let mut buf = [0u8; 32];
        buf[0..8].copy_from_slice(&fp.x.to_bits().to_le_bytes());
        buf[8..16].copy_from_slice(&fp.y.to_bits().to_le_bytes());
        buf[16..24].copy_from_slice(&fp.width.to_bits().to_le_bytes());
        buf[24..32].copy_from_slice(&fp.height.to_bits().to_le_bytes());
        format!("{:08x}", xxh3_64(&buf) & 0xffff_ffff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FocalPoint, ImageId};

    fn focal_image() -> SourceImage {
        SourceImage::new(ImageId(1), "a.jpg").with_focal_point(FocalPoint {
            x: 0.5,
            y: 0.25,
            width: 0.1,
            height: 0.1,
        })
    }

    #[test]
    fn equality_is_spec_equality() {
        let a = Filter::new("width-400|format-webp").unwrap();
        let b = Filter::new("width-400|format-webp").unwrap();
        let c = Filter::new("width-401|format-webp").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn rejects_empty_and_malformed_specs() {
        assert!(Filter::new("").is_err());
        assert!(Filter::new("width-400||format-webp").is_err());
        assert!(Filter::new("width-{400}").is_err());
    }

    #[test]
    fn size_only_filter_has_empty_cache_key() {
        let f = Filter::new("width-400").unwrap();
        assert_eq!(f.cache_key(&focal_image()), "");
    }

    #[test]
    fn fill_filter_keys_on_focal_point() {
        let f = Filter::new("fill-400x300-c80").unwrap();
        let key = f.cache_key(&focal_image());
        assert_eq!(key.len(), 8);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));

        // Stable for the same image, empty without a focal point.
        assert_eq!(key, f.cache_key(&focal_image()));
        assert_eq!(f.cache_key(&SourceImage::new(ImageId(1), "a.jpg")), "");

        let mut other = focal_image();
        other.focal_point = Some(FocalPoint {
            x: 0.9,
            y: 0.9,
            width: 0.2,
            height: 0.2,
        });
        assert_ne!(key, f.cache_key(&other));
    }
}
