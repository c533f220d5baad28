use std::{collections::HashMap, sync::Arc};

use crate::{
    cache::{CacheProvider, RenditionCache, composite_cache_key},
    codec::ImageProcessor,
    config::PipelineConfig,
    error::{PicturaError, PicturaResult},
    filter::Filter,
    generate::generate,
    model::{Rendition, SourceImage},
    spec::expand_filter_specs,
    store::{RenditionStore, SourceFiles},
};

/// The rendition resolution pipeline: fast-cache probe, one disjunctive
/// durable-storage query, generation of the missing subset, one bulk
/// persist, and cache repopulation. All collaborators are handed in at
/// construction; there is no process-wide state.
pub struct RenditionPipeline {
    config: PipelineConfig,
    cache_provider: Arc<dyn CacheProvider>,
    store: Arc<dyn RenditionStore>,
    codec: Arc<dyn ImageProcessor>,
    sources: Arc<dyn SourceFiles>,
}

impl RenditionPipeline {
    pub fn new(
        config: PipelineConfig,
        cache_provider: Arc<dyn CacheProvider>,
        store: Arc<dyn RenditionStore>,
        codec: Arc<dyn ImageProcessor>,
        sources: Arc<dyn SourceFiles>,
    ) -> Self {
        Self {
            config,
            cache_provider,
            store,
            codec,
            sources,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Expands raw filter tokens using the configured named filters, then
    /// resolves them via [`Self::renditions_or_not_found`].
    pub fn renditions_from_tokens<S: AsRef<str>>(
        &self,
        image: &SourceImage,
        tokens: &[S],
    ) -> PicturaResult<Vec<Rendition>> {
        let specs = expand_filter_specs(tokens, &self.config.named_filters)?;
        self.renditions_or_not_found(image, &specs)
    }

    /// Resolves canonical filter specs, degrading an unreadable source
    /// file into one zero-size placeholder per requested spec so the page
    /// renders a broken image instead of failing. Spec and codec errors
    /// still propagate.
    pub fn renditions_or_not_found<S: AsRef<str>>(
        &self,
        image: &SourceImage,
        specs: &[S],
    ) -> PicturaResult<Vec<Rendition>> {
        let filters = specs
            .iter()
            .map(|s| Filter::new(s.as_ref()))
            .collect::<PicturaResult<Vec<_>>>()?;

        match self.renditions(image, &filters) {
            Ok(renditions) => Ok(renditions),
            Err(PicturaError::SourceUnreadable(reason)) => {
                tracing::debug!(image = %image.id, %reason, "source unreadable, substituting placeholders");
                Ok(filters
                    .iter()
                    .map(|f| Rendition::not_found(image.id, f.spec()))
                    .collect())
            }
            Err(e) => Err(e),
        }
    }

    /// Resolves one rendition per requested filter, in request order.
    ///
    /// Existing renditions are found through the fast cache when all
    /// requested keys hit, otherwise through one disjunctive storage
    /// query; the missing subset is generated and persisted in a single
    /// bulk create. There is no cross-request single-flight guard: two
    /// concurrent calls may both generate the same missing rendition and
    /// rely on the store's duplicate tolerance.
    #[tracing::instrument(skip_all, fields(image = %image.id, requested = filters.len()))]
    pub fn renditions(
        &self,
        image: &SourceImage,
        filters: &[Filter],
    ) -> PicturaResult<Vec<Rendition>> {
        let params: Vec<(&Filter, String)> =
            filters.iter().map(|f| (f, f.cache_key(image))).collect();

        // Cache availability is a full-call decision. A misconfigured
        // backend downgrades the call to the durable path; it never fails
        // the request and is never probed again per filter.
        let cache: Option<Arc<dyn RenditionCache>> = match self.cache_provider.acquire() {
            Ok(cache) => Some(cache),
            Err(PicturaError::CacheUnavailable(reason)) => {
                tracing::warn!(%reason, "renditions cache unavailable for this call");
                None
            }
            Err(e) => return Err(e),
        };

        let cache_keys: Vec<u64> = params
            .iter()
            .map(|(f, focal_key)| composite_cache_key(image.id, focal_key, f.spec()))
            .collect();

        if let Some(cache) = &cache {
            let cached: Vec<Option<Rendition>> =
                cache_keys.iter().map(|&k| cache.get(k)).collect();
            if cached.iter().all(Option::is_some) {
                tracing::debug!("all renditions served from cache");
                return Ok(cached.into_iter().flatten().collect());
            }
        }

        // One disjunctive query for every requested pair; never N queries.
        let pairs: Vec<(&str, &str)> = params
            .iter()
            .map(|(f, focal_key)| (f.spec(), focal_key.as_str()))
            .collect();
        let existing = self.store.query(image.id, &pairs)?;

        let mut resolved: HashMap<(String, String), Rendition> = existing
            .into_iter()
            .map(|r| ((r.filter_spec.clone(), r.focal_point_key.clone()), r))
            .collect();

        // Requested pairs with no durable rendition yet. Duplicate entries
        // in the input collapse to one generation.
        let mut missing: Vec<(&Filter, &String)> = Vec::new();
        for (filter, focal_key) in &params {
            let key = (filter.spec().to_string(), focal_key.clone());
            if !resolved.contains_key(&key)
                && !missing
                    .iter()
                    .any(|(f, k)| f.spec() == filter.spec() && *k == focal_key)
            {
                missing.push((*filter, focal_key));
            }
        }

        if !missing.is_empty() {
            let source = self.sources.read(&image.file_name)?;
            let mut batch = Vec::with_capacity(missing.len());
            for (filter, focal_key) in &missing {
                batch.push(generate(
                    image,
                    filter,
                    focal_key.as_str(),
                    &source,
                    self.codec.as_ref(),
                )?);
            }
            tracing::debug!(generated = batch.len(), "persisting generated renditions");
            for rendition in self.store.bulk_create(batch)? {
                resolved.insert(
                    (rendition.filter_spec.clone(), rendition.focal_point_key.clone()),
                    rendition,
                );
            }
        }

        // Restore request order; duplicates in the input share a record.
        let mut ordered = Vec::with_capacity(params.len());
        for (filter, focal_key) in &params {
            let key = (filter.spec().to_string(), focal_key.clone());
            let rendition = resolved.get(&key).cloned().ok_or_else(|| {
                PicturaError::storage(format!(
                    "rendition for '{}' missing after bulk create",
                    filter.spec()
                ))
            })?;
            ordered.push(rendition);
        }

        if let Some(cache) = &cache {
            for (key, rendition) in cache_keys.iter().zip(&ordered) {
                cache.set(*key, rendition);
            }
        }

        Ok(ordered)
    }
}
