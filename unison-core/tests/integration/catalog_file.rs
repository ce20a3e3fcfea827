use crate::fixtures::TEST_ROUND_SECS;
use std::sync::Arc;
use unison_core::application::{CatalogSource, FileCatalogSource, ProposalBuilder};
use unison_core::domain::coordination::{ProposalBody, ProposalMode};
use unison_core::foundation::{PeerId, TrackId};

const CATALOG_JSON: &str = r#"{
  "tracks": [
    { "track_id": "dawn", "title": "Dawn", "segments": [
      { "content_id": "bafy-dawn-0", "duration_ms": 6000 },
      { "content_id": "bafy-dawn-1", "duration_ms": 6000 }
    ] },
    { "track_id": "empty", "segments": [] },
    { "track_id": "dusk", "segments": [
      { "content_id": "bafy-dusk-0", "duration_ms": 4000 }
    ] }
  ]
}"#;

#[test]
fn test_catalog_when_chunker_file_has_invalid_track_then_it_is_dropped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("catalog.json");
    std::fs::write(&path, CATALOG_JSON).expect("write");

    let source = FileCatalogSource::new(&path, PeerId::from("local"));
    let catalog = source.get_local_catalog().expect("catalog");
    let ids: Vec<&str> = catalog.tracks.iter().map(|t| t.track_id.as_str()).collect();
    assert_eq!(ids, vec!["dawn", "dusk"]);
    assert_eq!(catalog.tracks[0].segments[1].segment_index, 1);

    // Unchanged file is served from cache.
    let again = source.get_local_catalog().expect("catalog");
    assert!(Arc::ptr_eq(&catalog, &again));
}

#[test]
fn test_catalog_when_missing_then_proposal_building_fails_with_catalog_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = Arc::new(FileCatalogSource::new(dir.path().join("absent.json"), PeerId::from("local")));
    let mut builder = ProposalBuilder::new(source, ProposalMode::SingleTrack, TEST_ROUND_SECS * 1_000, 4);
    let err = builder.build(1, 0).expect_err("no catalog");
    assert_eq!(err.code(), unison_core::foundation::ErrorCode::CatalogError);
}

#[test]
fn test_catalog_when_loaded_from_file_then_proposals_use_its_segments() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("catalog.json");
    std::fs::write(&path, CATALOG_JSON).expect("write");
    let source = Arc::new(FileCatalogSource::new(&path, PeerId::from("local")));
    let mut builder = ProposalBuilder::new(source, ProposalMode::SingleTrack, TEST_ROUND_SECS * 1_000, 4);

    let proposal = builder.build_with_pick(7, 1, 0).expect("proposal");
    proposal.validate().expect("valid");
    assert_eq!(proposal.peer_id, PeerId::from("local"));
    let ProposalBody::Track { track_id } = &proposal.body else { panic!("single track body") };
    assert!([TrackId::from("dawn"), TrackId::from("dusk")].contains(track_id));
    assert!(proposal.segments.iter().all(|s| &s.track_id == track_id));
}
