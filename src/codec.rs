use std::io::Cursor;

use image::{
    DynamicImage, GenericImageView,
    codecs::{jpeg::JpegEncoder, webp::WebPEncoder},
    imageops::FilterType,
};

use crate::{
    error::{PicturaError, PicturaResult},
    model::ImageFormat,
};

/// Output of one codec invocation.
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// The image-processing collaborator. Takes the raw source bytes and a
/// canonical filter spec, returns the encoded derived image. Unsupported
/// specs and corrupt input fail with [`PicturaError::Codec`], which the
/// pipeline propagates untouched.
pub trait ImageProcessor: Send + Sync {
    fn apply(&self, source: &[u8], filter_spec: &str) -> PicturaResult<EncodedImage>;
}

/// Built-in processor backed by the `image` crate.
///
/// Understands `original`, `width-N`, `height-N`, `max-WxH`, `min-WxH`,
/// `fill-WxH[-cN]`, `scale-N`, `format-*`, `jpegquality-N`,
/// `webpquality-N` and `q-N`/`quality-N`. The `image` crate only encodes
/// lossless webp, so webp quality values are accepted but the output is
/// lossless either way; supply your own [`ImageProcessor`] for lossy webp.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ResizeRule {
    Original,
    Width(u32),
    Height(u32),
    Max(u32, u32),
    Min(u32, u32),
    Fill(u32, u32),
    Scale(f64),
}

#[derive(Debug)]
struct ParsedSpec {
    rule: ResizeRule,
    format: Option<ImageFormat>,
    jpeg_quality: u8,
}

const DEFAULT_JPEG_QUALITY: u8 = 85;

fn parse_size(op: &str, value: &str) -> PicturaResult<(u32, u32)> {
    value
        .split_once('x')
        .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)))
        .filter(|&(w, h)| w > 0 && h > 0)
        .ok_or_else(|| PicturaError::codec(format!("invalid size in operation '{op}'")))
}

fn parse_quality(op: &str, value: &str) -> PicturaResult<u8> {
    value
        .parse::<u8>()
        .ok()
        .filter(|q| (1..=100).contains(q))
        .ok_or_else(|| PicturaError::codec(format!("invalid quality in operation '{op}'")))
}

fn parse_spec(filter_spec: &str) -> PicturaResult<ParsedSpec> {
    let mut parsed = ParsedSpec {
        rule: ResizeRule::Original,
        format: None,
        jpeg_quality: DEFAULT_JPEG_QUALITY,
    };

    for op in filter_spec.split('|') {
        if op == "original" {
            parsed.rule = ResizeRule::Original;
        } else if let Some(v) = op.strip_prefix("width-") {
            let w: u32 = v
                .parse()
                .ok()
                .filter(|&w| w > 0)
                .ok_or_else(|| PicturaError::codec(format!("invalid width in '{op}'")))?;
            parsed.rule = ResizeRule::Width(w);
        } else if let Some(v) = op.strip_prefix("height-") {
            let h: u32 = v
                .parse()
                .ok()
                .filter(|&h| h > 0)
                .ok_or_else(|| PicturaError::codec(format!("invalid height in '{op}'")))?;
            parsed.rule = ResizeRule::Height(h);
        } else if let Some(v) = op.strip_prefix("max-") {
            let (w, h) = parse_size(op, v)?;
            parsed.rule = ResizeRule::Max(w, h);
        } else if let Some(v) = op.strip_prefix("min-") {
            let (w, h) = parse_size(op, v)?;
            parsed.rule = ResizeRule::Min(w, h);
        } else if let Some(v) = op.strip_prefix("fill-") {
            // Crop closeness ("-c80") affects focal zoom, which the
            // built-in center crop has no use for; strip and ignore it.
            let v = match v.rsplit_once("-c") {
                Some((size, closeness)) if closeness.parse::<u8>().is_ok() => size,
                _ => v,
            };
            let (w, h) = parse_size(op, v)?;
            parsed.rule = ResizeRule::Fill(w, h);
        } else if let Some(v) = op.strip_prefix("scale-") {
            let pct: f64 = v
                .parse()
                .map_err(|_| PicturaError::codec(format!("invalid scale in '{op}'")))?;
            if pct <= 0.0 {
                return Err(PicturaError::codec(format!("invalid scale in '{op}'")));
            }
            parsed.rule = ResizeRule::Scale(pct);
        } else if let Some(v) = op.strip_prefix("format-") {
            parsed.format = Some(
                ImageFormat::from_name(v)
                    .ok_or_else(|| PicturaError::codec(format!("unknown format '{v}'")))?,
            );
        } else if let Some(v) = op.strip_prefix("jpegquality-") {
            parsed.jpeg_quality = parse_quality(op, v)?;
        } else if let Some(v) = op.strip_prefix("webpquality-") {
            // Validated and accepted, but the built-in webp encoder is
            // lossless-only; the value has nowhere to go.
            parse_quality(op, v)?;
        } else if let Some(v) = op
            .strip_prefix("quality-")
            .or_else(|| op.strip_prefix("q-"))
        {
            parsed.jpeg_quality = parse_quality(op, v)?;
        } else {
            return Err(PicturaError::codec(format!(
                "unsupported operation '{op}' in filter spec '{filter_spec}'"
            )));
        }
    }

    Ok(parsed)
}

fn scaled(v: u32, num: u32, den: u32) -> u32 {
    (((v as u64 * num as u64) + den as u64 / 2) / den as u64).max(1) as u32
}

fn apply_rule(img: DynamicImage, rule: ResizeRule) -> DynamicImage {
    let (w, h) = img.dimensions();
    match rule {
        ResizeRule::Original => img,
        // Dimension rules only ever shrink; serving upscaled renditions
        // wastes bytes for no visual gain.
        ResizeRule::Width(t) if t < w => {
            let nh = scaled(h, t, w);
            img.resize_exact(t, nh, FilterType::Lanczos3)
        }
        ResizeRule::Width(_) => img,
        ResizeRule::Height(t) if t < h => {
            let nw = scaled(w, t, h);
            img.resize_exact(nw, t, FilterType::Lanczos3)
        }
        ResizeRule::Height(_) => img,
        ResizeRule::Max(mw, mh) if w > mw || h > mh => img.resize(mw, mh, FilterType::Lanczos3),
        ResizeRule::Max(..) => img,
        ResizeRule::Min(mw, mh) => {
            if w <= mw || h <= mh {
                return img;
            }
            // Shrink until the smaller relative dimension reaches its
            // minimum; both stay >= the requested box.
            let scale_w = mw as f64 / w as f64;
            let scale_h = mh as f64 / h as f64;
            let scale = scale_w.max(scale_h);
            let nw = ((w as f64 * scale).round() as u32).max(mw);
            let nh = ((h as f64 * scale).round() as u32).max(mh);
            img.resize_exact(nw, nh, FilterType::Lanczos3)
        }
        ResizeRule::Fill(fw, fh) => {
            // Center-crop to the target aspect, then shrink if the crop is
            // larger than the target. Never upscales.
            let crop_w = (w as u64).min(h as u64 * fw as u64 / fh as u64).max(1) as u32;
            let crop_h = (h as u64).min(w as u64 * fh as u64 / fw as u64).max(1) as u32;
            let x = (w - crop_w) / 2;
            let y = (h - crop_h) / 2;
            let cropped = img.crop_imm(x, y, crop_w, crop_h);
            if crop_w > fw || crop_h > fh {
                cropped.resize_exact(crop_w.min(fw), crop_h.min(fh), FilterType::Lanczos3)
            } else {
                cropped
            }
        }
        ResizeRule::Scale(pct) => {
            let nw = ((w as f64 * pct / 100.0).round() as u32).max(1);
            let nh = ((h as f64 * pct / 100.0).round() as u32).max(1);
            img.resize_exact(nw, nh, FilterType::Lanczos3)
        }
    }
}

fn native_output_format(guessed: image::ImageFormat) -> ImageFormat {
    match guessed {
        image::ImageFormat::Jpeg => ImageFormat::Jpeg,
        image::ImageFormat::Gif => ImageFormat::Gif,
        image::ImageFormat::WebP => ImageFormat::Webp,
        // Everything else re-encodes as png, the lossless catch-all.
        _ => ImageFormat::Png,
    }
}

fn encode(img: &DynamicImage, format: ImageFormat, jpeg_quality: u8) -> PicturaResult<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            // Jpeg has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut bytes, jpeg_quality);
            rgb.write_with_encoder(encoder)
                .map_err(|e| PicturaError::codec(format!("encode jpeg: {e}")))?;
        }
        ImageFormat::Png => {
            img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
                .map_err(|e| PicturaError::codec(format!("encode png: {e}")))?;
        }
        ImageFormat::Gif => {
            img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Gif)
                .map_err(|e| PicturaError::codec(format!("encode gif: {e}")))?;
        }
        ImageFormat::Webp | ImageFormat::WebpLossless => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            let encoder = WebPEncoder::new_lossless(&mut bytes);
            rgba.write_with_encoder(encoder)
                .map_err(|e| PicturaError::codec(format!("encode webp: {e}")))?;
        }
    }
    Ok(bytes)
}

impl ImageProcessor for ImageCodec {
    fn apply(&self, source: &[u8], filter_spec: &str) -> PicturaResult<EncodedImage> {
        let parsed = parse_spec(filter_spec)?;
        let guessed = image::guess_format(source)
            .map_err(|e| PicturaError::codec(format!("unrecognized image data: {e}")))?;
        let img = image::load_from_memory(source)
            .map_err(|e| PicturaError::codec(format!("decode image: {e}")))?;

        let img = apply_rule(img, parsed.rule);
        let format = parsed.format.unwrap_or(native_output_format(guessed));
        let (width, height) = img.dimensions();
        let bytes = encode(&img, format, parsed.jpeg_quality)?;

        Ok(EncodedImage {
            bytes,
            format,
            width,
            height,
        })
    }
}
