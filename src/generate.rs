use crate::{
    codec::ImageProcessor,
    error::PicturaResult,
    filter::Filter,
    model::{ImageFormat, NewRendition, SourceImage},
};

/// Longest file name a rendition may get. Storage backends with tighter
/// limits than this exist; 60 matches the narrowest one supported.
const MAX_FILE_NAME_CHARS: usize = 60;

/// Derives the rendition file name:
/// `{stem}.{spec with '|' replaced by '.'}[.{focal key}].{extension}`.
///
/// When the result would exceed [`MAX_FILE_NAME_CHARS`], only the source
/// stem is truncated. The generated suffix is what distinguishes sibling
/// filters of one image, so it is never cut.
pub fn derive_file_name(
    stem: &str,
    filter_spec: &str,
    focal_point_key: &str,
    format: ImageFormat,
) -> String {
    let mut suffix = String::new();
    if !focal_point_key.is_empty() {
        suffix.push_str(focal_point_key);
        suffix.push('.');
    }
    suffix.push_str(&filter_spec.replace('|', "."));
    suffix.push('.');
    suffix.push_str(format.extension());

    // One char of the budget goes to the dot joining stem and suffix.
    let budget = (MAX_FILE_NAME_CHARS - 1).saturating_sub(suffix.chars().count());
    let stem: String = stem.chars().take(budget).collect();
    format!("{stem}.{suffix}")
}

/// Produces one in-memory rendition for `(image, filter)`. Persistence is
/// the caller's job; renditions are batched into a single bulk create.
/// Codec failures propagate untouched.
pub fn generate(
    image: &SourceImage,
    filter: &Filter,
    focal_point_key: &str,
    source: &[u8],
    codec: &dyn ImageProcessor,
) -> PicturaResult<NewRendition> {
    let encoded = codec.apply(source, filter.spec())?;
    let file_name = derive_file_name(image.stem(), filter.spec(), focal_point_key, encoded.format);
    Ok(NewRendition {
        image_id: image.id,
        filter_spec: filter.spec().to_string(),
        focal_point_key: focal_point_key.to_string(),
        file_name,
        bytes: encoded.bytes,
        width: encoded.width,
        height: encoded.height,
        format: encoded.format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_joins_stem_spec_and_extension() {
        assert_eq!(
            derive_file_name("beach", "width-400|format-webp", "", ImageFormat::Webp),
            "beach.width-400.format-webp.webp"
        );
    }

    #[test]
    fn focal_point_key_sits_between_stem_and_spec() {
        assert_eq!(
            derive_file_name("beach", "fill-100x100", "a1b2c3d4", ImageFormat::Jpeg),
            "beach.a1b2c3d4.fill-100x100.jpg"
        );
    }

    #[test]
    fn long_stem_is_truncated_to_sixty_chars_total() {
        let stem = "a".repeat(100);
        let name = derive_file_name(&stem, "width-400", "", ImageFormat::Png);
        assert_eq!(name.chars().count(), MAX_FILE_NAME_CHARS);
        assert!(name.ends_with(".width-400.png"));
    }

    #[test]
    fn suffix_survives_even_when_stem_budget_is_exhausted() {
        let stem = "a".repeat(100);
        let spec = "fill-1600x900-c80|format-webp|webpquality-85";
        let name = derive_file_name(&stem, spec, "a1b2c3d4", ImageFormat::Webp);
        assert!(name.ends_with(".a1b2c3d4.fill-1600x900-c80.format-webp.webpquality-85.webp"));
        assert!(name.chars().count() <= MAX_FILE_NAME_CHARS);
    }

    #[test]
    fn sibling_filters_of_one_image_stay_distinct() {
        let stem = "a-very-long-photograph-name-from-the-content-editor".repeat(2);
        let a = derive_file_name(&stem, "fill-100x100-c80", "", ImageFormat::Png);
        let b = derive_file_name(&stem, "fill-200x200-c80", "", ImageFormat::Png);
        assert_ne!(a, b);
        assert!(a.chars().count() <= MAX_FILE_NAME_CHARS);
        assert!(b.chars().count() <= MAX_FILE_NAME_CHARS);
    }
}
