use crate::domain::{Catalog, SegmentRef, Track};
use crate::foundation::{ContentId, PeerId, TrackId, UnisonError};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Read-only pull of the local chunked catalog, called once per round.
pub trait CatalogSource: Send + Sync {
    fn get_local_catalog(&self) -> Result<Arc<Catalog>, UnisonError>;
}

/// Catalog file written by the chunker: tracks with their ordered segment ids.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    pub tracks: Vec<CatalogFileTrack>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogFileTrack {
    pub track_id: TrackId,
    #[serde(default)]
    pub title: Option<String>,
    pub segments: Vec<CatalogFileSegment>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogFileSegment {
    pub content_id: ContentId,
    pub duration_ms: u64,
}

impl CatalogFile {
    pub fn into_catalog(self, peer_id: PeerId) -> Catalog {
        let tracks = self
            .tracks
            .into_iter()
            .map(|entry| {
                let segments = entry
                    .segments
                    .into_iter()
                    .enumerate()
                    .map(|(index, segment)| SegmentRef {
                        track_id: entry.track_id.clone(),
                        segment_index: index as u32,
                        content_id: segment.content_id,
                        duration_ms: segment.duration_ms,
                    })
                    .collect();
                Track { track_id: entry.track_id, title: entry.title, segments }
            })
            .collect();
        Catalog::new(peer_id, tracks)
    }
}

/// Re-reads the catalog file only when its modification time changes.
pub struct FileCatalogSource {
    path: PathBuf,
    peer_id: PeerId,
    cache: Mutex<Option<(SystemTime, Arc<Catalog>)>>,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>, peer_id: PeerId) -> Self {
        Self { path: path.into(), peer_id, cache: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Catalog, UnisonError> {
        let bytes = std::fs::read(&self.path)
            .map_err(|err| UnisonError::CatalogError(format!("read {}: {err}", self.path.display())))?;
        let file: CatalogFile = serde_json::from_slice(&bytes)
            .map_err(|err| UnisonError::CatalogError(format!("parse {}: {err}", self.path.display())))?;
        Ok(file.into_catalog(self.peer_id.clone()))
    }
}

impl CatalogSource for FileCatalogSource {
    fn get_local_catalog(&self) -> Result<Arc<Catalog>, UnisonError> {
        let modified = std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(|err| UnisonError::CatalogError(format!("stat {}: {err}", self.path.display())))?;
        let mut cache = self.cache.lock().map_err(|_| UnisonError::CatalogError("catalog cache poisoned".to_string()))?;
        if let Some((cached_at, catalog)) = cache.as_ref() {
            if *cached_at == modified {
                debug!("catalog: cache hit path={}", self.path.display());
                return Ok(catalog.clone());
            }
        }
        let catalog = Arc::new(self.load()?);
        info!(
            "catalog: loaded path={} tracks={} catalog_hash={}",
            self.path.display(),
            catalog.len(),
            catalog.catalog_hash
        );
        *cache = Some((modified, catalog.clone()));
        Ok(catalog)
    }
}

/// Fixed catalog, for tests and embedders that build the catalog themselves.
pub struct StaticCatalogSource {
    catalog: Arc<Catalog>,
}

impl StaticCatalogSource {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog: Arc::new(catalog) }
    }
}

impl CatalogSource for StaticCatalogSource {
    fn get_local_catalog(&self) -> Result<Arc<Catalog>, UnisonError> {
        Ok(self.catalog.clone())
    }
}
