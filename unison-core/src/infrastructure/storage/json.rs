use crate::domain::coordination::ResolvedRound;
use crate::domain::stream::{ManifestDocument, StreamInfo, StreamState};
use crate::domain::{PeerSyncSnapshot, PinLedgerSnapshot};
use crate::infrastructure::storage::traits::{Result, StateStore};
use crate::foundation::util::result_ext::ResultExt;
use crate::{serde_err, storage_err};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const STREAM_STATE_FILE: &str = "stream_state.json";
pub const PIN_RECORDS_FILE: &str = "pin_records.json";
pub const PEER_SYNC_FILE: &str = "peer_sync.json";
pub const ROUND_HISTORY_FILE: &str = "round_history.json";
pub const STREAM_INFO_FILE: &str = "stream_info.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const PLAYLIST_FILE: &str = "stream.m3u8";

/// One JSON file per concern inside the data directory.
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| storage_err!(format!("create_dir_all {}", dir.display()), err))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>> {
        let path = self.dir.join(file);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_err!(format!("read {}", path.display()), err)),
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|err| serde_err!("json", format!("{}: {err}", path.display())))
    }

    fn write<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|err| serde_err!("json", err))?;
        write_atomic(&self.dir, &self.dir.join(file), &bytes)
    }
}

/// temp file in the same dir -> write -> fsync -> rename over the target.
pub fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|err| storage_err!(format!("create temp in {}", dir.display()), err))?;
    temp.as_file_mut().write_all(bytes).map_err(|err| storage_err!("write temp file", err))?;
    temp.as_file().sync_all().map_err(|err| storage_err!("sync temp file", err))?;
    temp.persist(path).map_err(|err| storage_err!(format!("persist {}", path.display()), err.error))?;
    Ok(())
}

impl StateStore for JsonStateStore {
    fn load_stream_state(&self) -> Result<Option<StreamState>> {
        self.read(STREAM_STATE_FILE)
    }

    fn save_stream_state(&self, state: &StreamState) -> Result<()> {
        self.write(STREAM_STATE_FILE, state)
    }

    fn load_pin_ledger(&self) -> Result<Option<PinLedgerSnapshot>> {
        self.read(PIN_RECORDS_FILE)
    }

    fn save_pin_ledger(&self, snapshot: &PinLedgerSnapshot) -> Result<()> {
        self.write(PIN_RECORDS_FILE, snapshot)
    }

    fn load_peer_sync(&self) -> Result<Option<PeerSyncSnapshot>> {
        self.read(PEER_SYNC_FILE)
    }

    fn save_peer_sync(&self, snapshot: &PeerSyncSnapshot) -> Result<()> {
        self.write(PEER_SYNC_FILE, snapshot)
    }

    fn load_round_history(&self) -> Result<Vec<ResolvedRound>> {
        self.read::<Vec<ResolvedRound>>(ROUND_HISTORY_FILE).or_default()
    }

    fn save_round_history(&self, rounds: &[ResolvedRound]) -> Result<()> {
        self.write(ROUND_HISTORY_FILE, rounds)
    }

    fn load_manifest(&self) -> Result<Option<ManifestDocument>> {
        self.read(MANIFEST_FILE)
    }

    fn save_manifest(&self, manifest: &ManifestDocument, playlist: &str) -> Result<()> {
        self.write(MANIFEST_FILE, manifest)?;
        write_atomic(&self.dir, &self.dir.join(PLAYLIST_FILE), playlist.as_bytes())
    }

    fn save_stream_info(&self, info: &StreamInfo) -> Result<()> {
        self.write(STREAM_INFO_FILE, info)
    }
}

impl std::fmt::Debug for JsonStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonStateStore").field("dir", &self.dir).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PinRecord;
    use crate::foundation::{ContentId, UnisonError};

    #[test]
    fn stream_state_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = JsonStateStore::open(dir.path()).expect("open");
            assert!(store.load_stream_state().expect("load").is_none());
            let state = StreamState { sequence_number: 41, current_round_id: 9, window_start_offset: 3, ..Default::default() };
            store.save_stream_state(&state).expect("save");
        }
        let store = JsonStateStore::open(dir.path()).expect("reopen");
        let state = store.load_stream_state().expect("load").expect("present");
        assert_eq!((state.sequence_number, state.current_round_id, state.window_start_offset), (41, 9, 3));
    }

    #[test]
    fn writes_leave_no_temp_files_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStateStore::open(dir.path()).expect("open");
        let snapshot = PinLedgerSnapshot {
            records: vec![PinRecord { round_id: 1, content_ids: vec![ContentId::from("c")], pinned_at_ns: 5 }],
            ..Default::default()
        };
        store.save_pin_ledger(&snapshot).expect("save");
        store.save_pin_ledger(&snapshot).expect("overwrite");
        let names: Vec<String> = fs::read_dir(dir.path()).expect("read_dir").map(|e| e.expect("entry").file_name().to_string_lossy().to_string()).collect();
        assert_eq!(names, vec![PIN_RECORDS_FILE.to_string()]);
        assert_eq!(store.load_pin_ledger().expect("load"), Some(snapshot));
    }

    #[test]
    fn corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(STREAM_STATE_FILE), b"{not json").expect("write");
        let store = JsonStateStore::open(dir.path()).expect("open");
        assert!(matches!(store.load_stream_state(), Err(UnisonError::SerializationError { .. })));
    }
}
