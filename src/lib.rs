//! Pictura resolves responsive image renditions for CMS pages.
//!
//! Given a source image and one or more filter specs (resize rule,
//! quality, target format, optional brace-expansion sugar), the pipeline
//! reuses cached renditions where it can, generates and persists the rest
//! in one batch, and hands back the results in request order, ready for
//! `<picture>`/`<img srcset>` markup:
//!
//! - Parse and expand raw tokens with [`spec::expand_filter_specs`]
//! - Resolve renditions through a [`pipeline::RenditionPipeline`]
//! - Render markup with a [`markup::RenditionRequest`]
#![forbid(unsafe_code)]

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod generate;
pub mod markup;
pub mod model;
pub mod pipeline;
pub mod spec;
pub mod store;

pub use cache::{CacheProvider, InMemoryCache, InMemoryCacheProvider, RenditionCache, UnconfiguredCacheProvider};
pub use codec::{EncodedImage, ImageCodec, ImageProcessor};
pub use config::PipelineConfig;
pub use error::{PicturaError, PicturaResult};
pub use filter::Filter;
pub use markup::{Attrs, PictureContext, RenditionRequest};
pub use model::{FocalPoint, ImageFormat, ImageId, NewRendition, Rendition, SourceImage};
pub use pipeline::RenditionPipeline;
pub use spec::{NamedFilters, expand_filter_specs};
pub use store::{
    FsRenditionStore, FsSourceFiles, MemorySourceFiles, MemoryStore, RenditionStore, SourceFiles,
};
