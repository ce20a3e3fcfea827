use crate::domain::hashes::catalog_hash;
use crate::foundation::{CatalogHash, ContentId, PeerId, TrackId, UnisonError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One fixed-duration chunk of a track, addressable in the content store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentRef {
    pub track_id: TrackId,
    pub segment_index: u32,
    pub content_id: ContentId,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: TrackId,
    #[serde(default)]
    pub title: Option<String>,
    pub segments: Vec<SegmentRef>,
}

impl Track {
    pub fn total_duration_ms(&self) -> u64 {
        self.segments.iter().map(|s| s.duration_ms).sum()
    }

    /// Segments must be non-empty, owned by this track, indexed 0..n in order and have a positive duration.
    pub fn validate(&self) -> Result<(), UnisonError> {
        if self.track_id.is_empty() {
            return Err(UnisonError::CatalogError("track_id is empty".to_string()));
        }
        if self.segments.is_empty() {
            return Err(UnisonError::CatalogError(format!("track {} has no segments", self.track_id)));
        }
        for (expected, segment) in self.segments.iter().enumerate() {
            if segment.track_id != self.track_id {
                return Err(UnisonError::CatalogError(format!(
                    "segment {} belongs to {} not {}",
                    segment.segment_index, segment.track_id, self.track_id
                )));
            }
            if segment.segment_index as usize != expected {
                return Err(UnisonError::CatalogError(format!(
                    "track {} segment index gap: expected {} got {}",
                    self.track_id, expected, segment.segment_index
                )));
            }
            if segment.duration_ms == 0 {
                return Err(UnisonError::CatalogError(format!("track {} segment {} has zero duration", self.track_id, expected)));
            }
            if segment.content_id.is_empty() {
                return Err(UnisonError::CatalogError(format!("track {} segment {} has empty content_id", self.track_id, expected)));
            }
        }
        Ok(())
    }
}

/// Per-peer, read-only view of the locally chunked tracks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub peer_id: PeerId,
    pub catalog_hash: CatalogHash,
    pub tracks: Vec<Track>,
}

impl Catalog {
    /// Builds a catalog, dropping invalid and duplicate tracks (first occurrence wins).
    pub fn new(peer_id: PeerId, tracks: Vec<Track>) -> Self {
        let mut seen = HashSet::new();
        let tracks: Vec<Track> = tracks
            .into_iter()
            .filter(|track| match track.validate() {
                Ok(()) => seen.insert(track.track_id.clone()),
                Err(err) => {
                    log::warn!("catalog: dropping track err={}", err);
                    false
                }
            })
            .collect();
        let catalog_hash = catalog_hash(tracks.iter().map(|t| &t.track_id));
        Self { peer_id, catalog_hash, tracks }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, track_id: &TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| &t.track_id == track_id)
    }
}
