//! Stream descriptors handed to the host player
//!
//! NextPVR always serves MPEG-TS. The index of the elementary streams inside
//! the container is unknown, hence `-1`.

use crate::error::{NextPvrError, Result};
use crate::models::Recording;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

pub const MPEGTS_CONTAINER: &str = "mpegts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamProtocol {
    Http,
    File,
}

impl StreamProtocol {
    /// `Http` when the locator starts with `http` (any case)
    pub fn for_locator(locator: &str) -> Self {
        if locator
            .get(..4)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("http"))
        {
            StreamProtocol::Http
        } else {
            StreamProtocol::File
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementaryStreamKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementaryStream {
    pub kind: ElementaryStreamKind,
    pub index: i32,
    pub interlaced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub id: String,
    pub path: String,
    pub protocol: StreamProtocol,
    pub container: String,
    pub streams: Vec<ElementaryStream>,
    pub supports_probing: bool,
}

impl StreamDescriptor {
    /// Descriptor with one interlaced video and one audio stream
    pub fn mpegts(id: impl Into<String>, path: impl Into<String>, protocol: StreamProtocol) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            protocol,
            container: MPEGTS_CONTAINER.to_string(),
            streams: vec![
                ElementaryStream {
                    kind: ElementaryStreamKind::Video,
                    index: -1,
                    interlaced: true,
                },
                ElementaryStream {
                    kind: ElementaryStreamKind::Audio,
                    index: -1,
                    interlaced: false,
                },
            ],
            supports_probing: false,
        }
    }

    /// Descriptor of a live channel stream
    pub fn live(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            supports_probing: true,
            ..Self::mpegts(id, url, StreamProtocol::Http)
        }
    }
}

/// Resolves the stream of a recording: its URL first, then its local file if
/// it still exists
pub async fn resolve_recording(recording: &Recording) -> Result<StreamDescriptor> {
    if let Some(url) = recording.url.as_deref().filter(|u| !u.is_empty()) {
        info!(recording_id = %recording.id, url, "Streaming recording over HTTP");
        return Ok(StreamDescriptor::mpegts(
            &recording.id,
            url,
            StreamProtocol::Http,
        ));
    }

    if let Some(path) = recording.path.as_deref().filter(|p| !p.is_empty()) {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!(recording_id = %recording.id, path, "Streaming recording from file");
            return Ok(StreamDescriptor::mpegts(
                &recording.id,
                path,
                StreamProtocol::File,
            ));
        }
    }

    error!(recording_id = %recording.id, "No stream exists for recording");
    Err(NextPvrError::NotFound(format!(
        "no stream exists for recording {}",
        recording.id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordingStatus;
    use chrono::Utc;

    fn recording(path: Option<String>, url: Option<String>) -> Recording {
        Recording {
            id: "5".into(),
            channel_id: "1".into(),
            name: "Show".into(),
            episode_title: None,
            overview: None,
            path,
            url,
            start_time: Utc::now(),
            end_time: Utc::now(),
            status: RecordingStatus::Completed,
            is_series: false,
            is_movie: false,
            is_news: false,
            is_sports: false,
            is_kids: false,
            image_url: None,
            genres: vec![],
            program_id: "1".into(),
            season_number: None,
            episode_number: None,
            rating: None,
            community_rating: None,
            original_air_date: None,
            production_year: None,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_protocol_detection() {
        assert_eq!(StreamProtocol::for_locator("HTTP://pvr/live"), StreamProtocol::Http);
        assert_eq!(StreamProtocol::for_locator("https://pvr/live"), StreamProtocol::Http);
        assert_eq!(StreamProtocol::for_locator("/srv/tv/show.ts"), StreamProtocol::File);
        assert_eq!(StreamProtocol::for_locator("ht"), StreamProtocol::File);
    }

    #[test]
    fn test_live_descriptor_shape() {
        let live = StreamDescriptor::live("3", "http://pvr/live?channeloid=9");
        assert_eq!(live.container, "mpegts");
        assert!(live.supports_probing);
        assert_eq!(live.streams.len(), 2);
        assert!(live.streams.iter().all(|s| s.index == -1));
        assert!(live.streams[0].interlaced);
    }

    #[tokio::test]
    async fn test_url_is_preferred() {
        let descriptor = resolve_recording(&recording(
            Some("/tmp/x.ts".into()),
            Some("http://pvr/live?recording=5".into()),
        ))
        .await
        .unwrap();
        assert_eq!(descriptor.protocol, StreamProtocol::Http);
        assert_eq!(descriptor.path, "http://pvr/live?recording=5");
    }

    #[tokio::test]
    async fn test_existing_file_then_not_found() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().to_string();
        let descriptor = resolve_recording(&recording(Some(path.clone()), None))
            .await
            .unwrap();
        assert_eq!(descriptor.protocol, StreamProtocol::File);
        assert_eq!(descriptor.path, path);

        drop(file);
        let err = resolve_recording(&recording(Some(path), None)).await.unwrap_err();
        assert!(matches!(err, NextPvrError::NotFound(_)));
    }
}
