use std::collections::BTreeMap;

use htmlescape::encode_minimal;

use crate::{
    error::{PicturaError, PicturaResult},
    model::{ImageFormat, Rendition, SourceImage},
    pipeline::RenditionPipeline,
    spec::expand_filter_specs,
};

/// Extra HTML attributes for the generated `<img>` tag, e.g. `alt`,
/// `class`, `loading`. For [`RenditionRequest::WebPPicture`] the `sizes`
/// attribute is lifted onto the `<source>` element instead.
pub type Attrs = BTreeMap<String, String>;

/// One image-output mode. Each variant maps to one composition of the
/// rendition pipeline plus a markup shape.
#[derive(Clone, Debug)]
pub enum RenditionRequest {
    /// One filter token, one rendition, a plain `<img>`.
    Single(String),
    /// N filter tokens rendered as `<img srcset>` with width descriptors.
    SrcsetFallback(Vec<String>),
    /// `<picture>` with a webp `<source>` and a broadly supported
    /// fallback `<img>`. `q-N`/`quality-N` and `format-X` tokens steer
    /// the derived webp and fallback specs.
    WebPPicture(Vec<String>),
}

/// Resolved renditions for one request, ready for template use.
#[derive(Clone, Debug)]
pub struct PictureContext {
    pub webp_sources: Vec<Rendition>,
    pub fallback_sources: Vec<Rendition>,
    pub fallback: Rendition,
    pub fallback_mime: String,
}

impl RenditionRequest {
    /// Resolves the renditions without rendering markup, for callers that
    /// assemble their own templates (the `as var` form of the tag).
    pub fn resolve(
        &self,
        pipeline: &RenditionPipeline,
        image: &SourceImage,
    ) -> PicturaResult<PictureContext> {
        match self {
            Self::Single(token) => {
                let renditions =
                    pipeline.renditions_from_tokens(image, std::slice::from_ref(token))?;
                context_without_webp(renditions)
            }
            Self::SrcsetFallback(tokens) => {
                let renditions = pipeline.renditions_from_tokens(image, tokens)?;
                context_without_webp(renditions)
            }
            Self::WebPPicture(tokens) => {
                let (base, quality, specified_format) = extract_webp_options(tokens)?;
                let source_specs =
                    expand_filter_specs(&base, &pipeline.config().named_filters)?;
                let native = image.native_format_name();

                let fallback =
                    fallback_specs(&source_specs, &native, quality, specified_format.as_deref());
                let webp =
                    webp_specs(&source_specs, quality, pipeline.config().webp_quality);

                // One orchestrated call for both sets, fallback first.
                let mut all = fallback;
                all.extend(webp);
                let renditions = pipeline.renditions_or_not_found(image, &all)?;

                let (webp_sources, fallback_sources): (Vec<_>, Vec<_>) = renditions
                    .into_iter()
                    .partition(|r| r.format.is_webp() && !r.is_not_found());
                let fallback = fallback_sources.first().cloned().ok_or_else(|| {
                    PicturaError::storage("picture request resolved no fallback rendition")
                })?;
                let fallback_mime = fallback.format.mime().to_string();
                Ok(PictureContext {
                    webp_sources,
                    fallback_sources,
                    fallback,
                    fallback_mime,
                })
            }
        }
    }

    /// Resolves and renders the final markup.
    pub fn render(
        &self,
        pipeline: &RenditionPipeline,
        image: &SourceImage,
        attrs: &Attrs,
    ) -> PicturaResult<String> {
        let ctx = self.resolve(pipeline, image)?;
        match self {
            Self::Single(_) => Ok(img_tag(&ctx.fallback, None, attrs)),
            Self::SrcsetFallback(_) => {
                let srcset = srcset_value(&ctx.fallback_sources);
                Ok(img_tag(&ctx.fallback, Some(&srcset), attrs))
            }
            Self::WebPPicture(_) => {
                let mut attrs = attrs.clone();
                let sizes = attrs.remove("sizes");

                let mut html = String::from("<picture>");
                if !ctx.webp_sources.is_empty() {
                    html.push_str("<source srcset=\"");
                    html.push_str(&escape_attr(&srcset_value(&ctx.webp_sources)));
                    html.push('"');
                    if let Some(sizes) = &sizes {
                        html.push_str(" sizes=\"");
                        html.push_str(&escape_attr(sizes));
                        html.push('"');
                    }
                    html.push_str(" type=\"image/webp\">");
                }
                let srcset = srcset_value(&ctx.fallback_sources);
                html.push_str(&img_tag(&ctx.fallback, Some(&srcset), &attrs));
                html.push_str("</picture>");
                Ok(html)
            }
        }
    }
}

fn context_without_webp(renditions: Vec<Rendition>) -> PicturaResult<PictureContext> {
    let fallback = renditions.first().cloned().ok_or_else(|| {
        PicturaError::malformed_spec("no resize rule provided")
    })?;
    let fallback_mime = fallback.format.mime().to_string();
    Ok(PictureContext {
        webp_sources: Vec::new(),
        fallback_sources: renditions,
        fallback,
        fallback_mime,
    })
}

// Values are always emitted inside double-quoted attributes; minimal
// entity encoding plus the double quote is what has to be escaped.
fn escape_attr(value: &str) -> String {
    encode_minimal(value).replace('"', "&quot;")
}

fn srcset_value(renditions: &[Rendition]) -> String {
    renditions
        .iter()
        .map(Rendition::srcset_entry)
        .collect::<Vec<_>>()
        .join(", ")
}

fn img_tag(rendition: &Rendition, srcset: Option<&str>, attrs: &Attrs) -> String {
    let mut html = format!("<img src=\"{}\"", escape_attr(&rendition.url));
    if let Some(srcset) = srcset {
        html.push_str(" srcset=\"");
        html.push_str(&escape_attr(srcset));
        html.push('"');
    }
    html.push_str(&format!(
        " width=\"{}\" height=\"{}\"",
        rendition.width, rendition.height
    ));
    for (name, value) in attrs {
        html.push(' ');
        html.push_str(name);
        html.push_str("=\"");
        html.push_str(&escape_attr(value));
        html.push('"');
    }
    html.push('>');
    html
}

/// Splits `q-N`/`quality-N` and `format-X` tokens off the request, leaving
/// the resize tokens for expansion.
fn extract_webp_options(
    tokens: &[String],
) -> PicturaResult<(Vec<String>, Option<u8>, Option<String>)> {
    let mut base = Vec::new();
    let mut quality = None;
    let mut format = None;

    for token in tokens {
        if let Some(v) = token
            .strip_prefix("quality-")
            .or_else(|| token.strip_prefix("q-"))
        {
            let q = v
                .parse::<u8>()
                .ok()
                .filter(|q| (1..=100).contains(q))
                .ok_or_else(|| {
                    PicturaError::malformed_spec(format!("invalid quality token '{token}'"))
                })?;
            quality = Some(q);
        } else if let Some(v) = token.strip_prefix("format-") {
            if ImageFormat::from_name(v).is_none() {
                return Err(PicturaError::malformed_spec(format!(
                    "unknown format token '{token}'"
                )));
            }
            format = Some(v.to_string());
        } else {
            base.push(token.clone());
        }
    }

    Ok((base, quality, format))
}

/// Specs for the broadly supported `<img>` fallback. Webp targets demote
/// to png to keep alpha; a native webp source also falls back to png.
fn fallback_specs(
    source_specs: &[String],
    native_format: &str,
    quality: Option<u8>,
    specified_format: Option<&str>,
) -> Vec<String> {
    let mut target: Option<&str> = None;
    if let Some(specified) = specified_format {
        target = Some(match specified {
            "webp" | "webp-lossless" => "png",
            other => other,
        });
    } else if native_format == "webp" {
        target = Some("png");
    }

    let mut appended = Vec::new();
    if let Some(target) = target {
        appended.push(format!("format-{target}"));
    }
    if target == Some("jpeg") || native_format == "jpeg" {
        if let Some(q) = quality {
            if !source_specs[0].contains("jpegquality-") {
                appended.push(format!("jpegquality-{q}"));
            }
        }
    }

    if appended.is_empty() {
        return source_specs.to_vec();
    }
    let tail = appended.join("|");
    source_specs.iter().map(|s| format!("{s}|{tail}")).collect()
}

/// Specs for the webp `<source>`. An explicit quality of 100 selects
/// lossless; otherwise the explicit or configured quality applies.
fn webp_specs(source_specs: &[String], quality: Option<u8>, default_quality: u8) -> Vec<String> {
    let mut target = "webp";
    let mut appended = Vec::new();
    match quality {
        Some(100) => target = "webp-lossless",
        Some(q) => {
            if !source_specs[0].contains("webpquality-") {
                appended.push(format!("webpquality-{q}"));
            }
        }
        None => {
            if !source_specs[0].contains("webpquality-") {
                appended.push(format!("webpquality-{default_quality}"));
            }
        }
    }
    appended.push(format!("format-{target}"));

    let tail = appended.join("|");
    source_specs.iter().map(|s| format!("{s}|{tail}")).collect()
}
