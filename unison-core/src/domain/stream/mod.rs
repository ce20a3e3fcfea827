pub mod hls;
pub mod manifest;
pub mod state;
pub mod window;

pub use hls::{render_master_playlist, render_media_playlist};
pub use manifest::{manifest_hash, ManifestDocument, ManifestSegment};
pub use state::{StreamInfo, StreamState};
pub use window::{advance_cursor, compute_window, CursorMove, WindowSegment};
