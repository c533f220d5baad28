pub type PicturaResult<T> = Result<T, PicturaError>;

#[derive(thiserror::Error, Debug)]
pub enum PicturaError {
    /// Bad filter-spec syntax: disallowed characters, malformed braces,
    /// or an empty spec. Fatal for the render call.
    #[error("malformed filter spec: {0}")]
    MalformedSpec(String),

    /// More than one brace-expansion token in a single request.
    #[error("multiple expansion patterns: {0}")]
    MultipleExpansion(String),

    /// The source image's underlying file could not be read. Recovered by
    /// the pipeline's not-found path, never by callers.
    #[error("source image unreadable: {0}")]
    SourceUnreadable(String),

    /// Image decode/transform/encode failure. Propagates uncaught.
    #[error("codec error: {0}")]
    Codec(String),

    /// The fast-cache backend could not be acquired. Callers never see
    /// this; the pipeline disables caching for the call instead.
    #[error("rendition cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Durable rendition storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PicturaError {
    pub fn malformed_spec(msg: impl Into<String>) -> Self {
        Self::MalformedSpec(msg.into())
    }

    pub fn multiple_expansion(msg: impl Into<String>) -> Self {
        Self::MultipleExpansion(msg.into())
    }

    pub fn source_unreadable(msg: impl Into<String>) -> Self {
        Self::SourceUnreadable(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub fn cache_unavailable(msg: impl Into<String>) -> Self {
        Self::CacheUnavailable(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}
