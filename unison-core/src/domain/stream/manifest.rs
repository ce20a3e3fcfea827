use crate::domain::stream::WindowSegment;
use crate::foundation::constants::{NANOS_PER_MILLI, NANOS_PER_SECOND};
use crate::foundation::{ContentId, ManifestHash, RoundId, TrackId, UnisonError};
use blake3::Hasher;
use serde::{Deserialize, Serialize};

pub const MANIFEST_VERSION: u32 = 1;
const MANIFEST_HASH_DOMAIN_V1: &[u8] = b"unison:manifest:v1:";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSegment {
    pub round_id: RoundId,
    pub track_id: TrackId,
    pub segment_index: u32,
    pub content_id: ContentId,
    pub duration_ms: u64,
    /// Wall-clock anchor: publish time plus the durations of all earlier segments in the window.
    pub start_time_ns: u64,
    #[serde(default)]
    pub is_fallback: bool,
}

/// The live manifest published under the stream's mutable name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDocument {
    pub version: u32,
    pub stream_name: String,
    pub sequence_number: u64,
    pub current_round_id: RoundId,
    pub published_at_ns: u64,
    pub target_duration_secs: u64,
    pub segments: Vec<ManifestSegment>,
    pub manifest_hash: ManifestHash,
}

impl ManifestDocument {
    pub fn build(stream_name: &str, sequence_number: u64, current_round_id: RoundId, window: &[WindowSegment], published_at_ns: u64) -> Self {
        let mut anchor = published_at_ns;
        let segments: Vec<ManifestSegment> = window
            .iter()
            .map(|w| {
                let segment = ManifestSegment {
                    round_id: w.round_id,
                    track_id: w.segment.track_id.clone(),
                    segment_index: w.segment.segment_index,
                    content_id: w.segment.content_id.clone(),
                    duration_ms: w.segment.duration_ms,
                    start_time_ns: anchor,
                    is_fallback: w.is_fallback,
                };
                anchor = anchor.saturating_add(w.segment.duration_ms.saturating_mul(NANOS_PER_MILLI));
                segment
            })
            .collect();
        let max_ms = segments.iter().map(|s| s.duration_ms).max().unwrap_or(0);
        let target_duration_secs = max_ms.div_ceil(1_000).max(1);
        let manifest_hash = manifest_hash(sequence_number, &segments);
        Self {
            version: MANIFEST_VERSION,
            stream_name: stream_name.to_string(),
            sequence_number,
            current_round_id,
            published_at_ns,
            target_duration_secs,
            segments,
            manifest_hash,
        }
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.segments.iter().map(|s| s.duration_ms).sum()
    }

    pub fn published_at_secs(&self) -> u64 {
        self.published_at_ns / NANOS_PER_SECOND
    }

    /// Window length bound, positive durations, and round/index contiguity.
    pub fn validate(&self, max_segments: usize) -> Result<(), UnisonError> {
        let invalid = |details: String| Err(UnisonError::Message(format!("invalid manifest: {details}")));
        if self.segments.len() > max_segments {
            return invalid(format!("window length {} exceeds {}", self.segments.len(), max_segments));
        }
        if let Some(zero) = self.segments.iter().find(|s| s.duration_ms == 0) {
            return invalid(format!("zero duration segment {}", zero.content_id));
        }
        for pair in self.segments.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let same_track = prev.round_id == next.round_id && prev.track_id == next.track_id;
            let contiguous = if same_track {
                next.segment_index == prev.segment_index + 1
            } else {
                next.round_id >= prev.round_id && next.segment_index == 0
            };
            if !contiguous {
                return invalid(format!("gap between {} and {}", prev.content_id, next.content_id));
            }
            if next.start_time_ns != prev.start_time_ns + prev.duration_ms * NANOS_PER_MILLI {
                return invalid(format!("anchor gap at {}", next.content_id));
            }
        }
        Ok(())
    }
}

/// Hash over sequence and segment identity. Time anchors are excluded so an idle tick does not republish.
pub fn manifest_hash(sequence_number: u64, segments: &[ManifestSegment]) -> ManifestHash {
    let mut hasher = Hasher::new();
    hasher.update(MANIFEST_HASH_DOMAIN_V1);
    hasher.update(&sequence_number.to_le_bytes());
    hasher.update(&(segments.len() as u64).to_le_bytes());
    for segment in segments {
        hasher.update(&segment.round_id.to_le_bytes());
        hasher.update(&(segment.content_id.len() as u32).to_le_bytes());
        hasher.update(segment.content_id.as_bytes());
        hasher.update(&segment.duration_ms.to_le_bytes());
    }
    ManifestHash::new(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::SegmentRef;

    fn window(n: u32) -> Vec<WindowSegment> {
        let track_id = TrackId::from("t");
        (0..n)
            .map(|i| WindowSegment {
                round_id: 1,
                is_fallback: false,
                segment: SegmentRef { track_id: track_id.clone(), segment_index: i, content_id: ContentId::new(format!("c{i}")), duration_ms: 6_000 },
            })
            .collect()
    }

    #[test]
    fn anchors_accumulate_from_publish_time() {
        let doc = ManifestDocument::build("stream", 4, 1, &window(3), 1_000);
        let anchors: Vec<u64> = doc.segments.iter().map(|s| s.start_time_ns).collect();
        assert_eq!(anchors, vec![1_000, 1_000 + 6 * NANOS_PER_SECOND, 1_000 + 12 * NANOS_PER_SECOND]);
        assert_eq!(doc.target_duration_secs, 6);
        assert_eq!(doc.total_duration_ms(), 18_000);
        doc.validate(3).expect("valid");
        assert!(doc.validate(2).is_err());
    }

    #[test]
    fn hash_ignores_publish_time_but_tracks_sequence() {
        let a = ManifestDocument::build("stream", 4, 1, &window(3), 1_000);
        let b = ManifestDocument::build("stream", 4, 1, &window(3), 9_000);
        let c = ManifestDocument::build("stream", 5, 1, &window(3), 1_000);
        assert_eq!(a.manifest_hash, b.manifest_hash);
        assert_ne!(a.manifest_hash, c.manifest_hash);
    }

    #[test]
    fn validate_rejects_gaps() {
        let mut segments = window(3);
        segments.remove(1);
        let doc = ManifestDocument::build("stream", 0, 1, &segments, 0);
        assert!(doc.validate(40).is_err());
    }
}
