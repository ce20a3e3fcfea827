//! HLS rendering of the live manifest, for players that do not read the JSON document.

use crate::domain::stream::ManifestDocument;
use crate::foundation::util::time::format_rfc3339_millis;
use std::fmt::Write;

pub fn render_media_playlist(doc: &ManifestDocument) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#EXTM3U");
    let _ = writeln!(out, "#EXT-X-VERSION:3");
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", doc.target_duration_secs);
    let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", doc.sequence_number);
    for segment in &doc.segments {
        let _ = writeln!(out, "#EXT-X-PROGRAM-DATE-TIME:{}", format_rfc3339_millis(segment.start_time_ns));
        let _ = writeln!(out, "#EXTINF:{}.{:03},", segment.duration_ms / 1_000, segment.duration_ms % 1_000);
        let _ = writeln!(out, "/ipfs/{}", segment.content_id);
    }
    out
}

/// Master playlist pointing players at the stream's mutable name.
pub fn render_master_playlist(stream_name: &str, bandwidth: u64, codecs: &str) -> String {
    format!("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-STREAM-INF:BANDWIDTH={bandwidth},CODECS=\"{codecs}\"\n/ipns/{stream_name}\n")
}
