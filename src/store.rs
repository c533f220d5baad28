use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    error::{PicturaError, PicturaResult},
    model::{ImageId, NewRendition, Rendition},
};

/// Read access to original image files. Failure means the source is gone
/// or unreadable, which the pipeline degrades into not-found placeholders.
pub trait SourceFiles: Send + Sync {
    fn read(&self, file_name: &str) -> PicturaResult<Vec<u8>>;
}

/// Durable storage for renditions.
///
/// `bulk_create` is duplicate-tolerant on the natural key
/// `(image_id, filter_spec, focal_point_key)`: a concurrent caller may
/// generate the same missing rendition, and the second persist returns the
/// surviving record instead of inserting a twin. There is no single-flight
/// guard across callers; the redundant generation work is accepted.
pub trait RenditionStore: Send + Sync {
    /// One disjunctive lookup: every stored rendition of `image_id` whose
    /// `(filter_spec, focal_point_key)` matches any requested pair.
    fn query(
        &self,
        image_id: ImageId,
        pairs: &[(&str, &str)],
    ) -> PicturaResult<Vec<Rendition>>;

    /// Persists the batch in one round trip, assigning identity. Returns
    /// the persisted records in argument order.
    fn bulk_create(&self, batch: Vec<NewRendition>) -> PicturaResult<Vec<Rendition>>;
}

/// Source files on local disk.
pub struct FsSourceFiles {
    root: PathBuf,
}

impl FsSourceFiles {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl SourceFiles for FsSourceFiles {
    fn read(&self, file_name: &str) -> PicturaResult<Vec<u8>> {
        let path = self.root.join(file_name);
        std::fs::read(&path).map_err(|e| {
            PicturaError::source_unreadable(format!("'{}': {e}", path.display()))
        })
    }
}

/// In-memory source files, mostly for tests and previews.
#[derive(Default)]
pub struct MemorySourceFiles {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySourceFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_name: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(file_name.into(), bytes);
    }
}

impl SourceFiles for MemorySourceFiles {
    fn read(&self, file_name: &str) -> PicturaResult<Vec<u8>> {
        self.files
            .get(file_name)
            .cloned()
            .ok_or_else(|| PicturaError::source_unreadable(format!("'{file_name}' not present")))
    }
}

type NaturalKey = (u64, String, String);

fn natural_key(image_id: ImageId, spec: &str, focal_key: &str) -> NaturalKey {
    (image_id.0, spec.to_string(), focal_key.to_string())
}

/// Process-local store, serves `memory://` urls. The workhorse for tests
/// and previews; production deployments back the trait with their own
/// database.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<NaturalKey, Rendition>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendition_count(&self) -> usize {
        self.rows.lock().expect("store mutex poisoned").len()
    }
}

impl RenditionStore for MemoryStore {
    fn query(
        &self,
        image_id: ImageId,
        pairs: &[(&str, &str)],
    ) -> PicturaResult<Vec<Rendition>> {
        let rows = self.rows.lock().expect("store mutex poisoned");
        let mut out = Vec::new();
        for (spec, focal_key) in pairs {
            if let Some(r) = rows.get(&natural_key(image_id, spec, focal_key)) {
                out.push(r.clone());
            }
        }
        Ok(out)
    }

    fn bulk_create(&self, batch: Vec<NewRendition>) -> PicturaResult<Vec<Rendition>> {
        let mut rows = self.rows.lock().expect("store mutex poisoned");
        let mut out = Vec::with_capacity(batch.len());
        for new in batch {
            let key = natural_key(new.image_id, &new.filter_spec, &new.focal_point_key);
            if let Some(existing) = rows.get(&key) {
                out.push(existing.clone());
                continue;
            }
            let rendition = Rendition {
                id: Some(self.next_id.fetch_add(1, Ordering::Relaxed) + 1),
                image_id: new.image_id,
                filter_spec: new.filter_spec,
                focal_point_key: new.focal_point_key,
                url: format!("memory://{}", new.file_name),
                file_name: new.file_name,
                width: new.width,
                height: new.height,
                format: new.format,
            };
            rows.insert(key, rendition.clone());
            out.push(rendition);
        }
        Ok(out)
    }
}

/// Renditions on local disk under `root`, served at `base_url`. The row
/// index lives in memory for the lifetime of the process; the files are
/// the durable part.
pub struct FsRenditionStore {
    root: PathBuf,
    base_url: String,
    rows: Mutex<HashMap<NaturalKey, Rendition>>,
    next_id: AtomicU64,
}

impl FsRenditionStore {
    pub fn new(root: impl AsRef<Path>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rows: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn rendition_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}

impl RenditionStore for FsRenditionStore {
    fn query(
        &self,
        image_id: ImageId,
        pairs: &[(&str, &str)],
    ) -> PicturaResult<Vec<Rendition>> {
        let rows = self.rows.lock().expect("store mutex poisoned");
        let mut out = Vec::new();
        for (spec, focal_key) in pairs {
            if let Some(r) = rows.get(&natural_key(image_id, spec, focal_key)) {
                out.push(r.clone());
            }
        }
        Ok(out)
    }

    fn bulk_create(&self, batch: Vec<NewRendition>) -> PicturaResult<Vec<Rendition>> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| PicturaError::storage(format!("create rendition dir: {e}")))?;

        let mut rows = self.rows.lock().expect("store mutex poisoned");
        let mut out = Vec::with_capacity(batch.len());
        for new in batch {
            let key = natural_key(new.image_id, &new.filter_spec, &new.focal_point_key);
            if let Some(existing) = rows.get(&key) {
                out.push(existing.clone());
                continue;
            }
            let path = self.rendition_path(&new.file_name);
            std::fs::write(&path, &new.bytes).map_err(|e| {
                PicturaError::storage(format!("write '{}': {e}", path.display()))
            })?;
            let rendition = Rendition {
                id: Some(self.next_id.fetch_add(1, Ordering::Relaxed) + 1),
                image_id: new.image_id,
                filter_spec: new.filter_spec,
                focal_point_key: new.focal_point_key,
                url: format!("{}/{}", self.base_url, new.file_name),
                file_name: new.file_name,
                width: new.width,
                height: new.height,
                format: new.format,
            };
            rows.insert(key, rendition.clone());
            out.push(rendition);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImageFormat;

    fn new_rendition(image: u64, spec: &str, focal_key: &str) -> NewRendition {
        NewRendition {
            image_id: ImageId(image),
            filter_spec: spec.to_string(),
            focal_point_key: focal_key.to_string(),
            file_name: format!("img.{}.png", spec.replace('|', ".")),
            bytes: vec![0u8; 4],
            width: 100,
            height: 80,
            format: ImageFormat::Png,
        }
    }

    #[test]
    fn bulk_create_assigns_ids_and_urls() {
        let store = MemoryStore::new();
        let out = store
            .bulk_create(vec![
                new_rendition(1, "width-400", ""),
                new_rendition(1, "width-800", ""),
            ])
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].id.is_some());
        assert_ne!(out[0].id, out[1].id);
        assert_eq!(out[0].url, "memory://img.width-400.png");
    }

    #[test]
    fn bulk_create_is_duplicate_tolerant() {
        let store = MemoryStore::new();
        let first = store
            .bulk_create(vec![new_rendition(1, "width-400", "")])
            .unwrap();
        let second = store
            .bulk_create(vec![new_rendition(1, "width-400", "")])
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(store.rendition_count(), 1);
    }

    #[test]
    fn query_matches_pairs_not_fields_independently() {
        let store = MemoryStore::new();
        store
            .bulk_create(vec![
                new_rendition(1, "fill-100x100", "aaaa0000"),
                new_rendition(1, "fill-200x200", "bbbb1111"),
            ])
            .unwrap();

        // Mixed spec/key from two different rows must not match.
        let none = store
            .query(ImageId(1), &[("fill-100x100", "bbbb1111")])
            .unwrap();
        assert!(none.is_empty());

        let hits = store
            .query(
                ImageId(1),
                &[("fill-100x100", "aaaa0000"), ("fill-200x200", "bbbb1111")],
            )
            .unwrap();
        assert_eq!(hits.len(), 2);

        let other_image = store
            .query(ImageId(2), &[("fill-100x100", "aaaa0000")])
            .unwrap();
        assert!(other_image.is_empty());
    }

    #[test]
    fn memory_source_files_read_or_unreadable() {
        let mut sources = MemorySourceFiles::new();
        sources.insert("a.png", vec![1, 2, 3]);
        assert_eq!(sources.read("a.png").unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            sources.read("missing.png").unwrap_err(),
            PicturaError::SourceUnreadable(_)
        ));
    }
}
