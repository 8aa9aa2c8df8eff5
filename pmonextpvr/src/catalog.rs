//! Browsable views over a recordings snapshot
//!
//! Every recording lands in exactly one bucket, checked in this order:
//! series (grouped by title), kids, movies, news, sports, others.

use crate::api::signing::md5_hex;
use crate::models::{Channel, ChannelType, Recording, RecordingStatus};
use crate::stream::StreamProtocol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub const SERIES_PREFIX: &str = "series_";
pub const KIDS_FOLDER: &str = "kids";
pub const MOVIES_FOLDER: &str = "movies";
pub const NEWS_FOLDER: &str = "news";
pub const SPORTS_FOLDER: &str = "sports";
pub const OTHERS_FOLDER: &str = "others";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    Movie,
    Episode,
    Clip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Video,
    Audio,
}

/// A recording as shown to catalog consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingItem {
    pub id: String,
    pub name: String,
    pub series_name: Option<String>,
    pub overview: Option<String>,
    pub channel_id: String,
    pub content_type: ContentType,
    pub media_type: MediaType,
    /// File path or URL the item plays from
    pub locator: String,
    pub protocol: StreamProtocol,
    pub runtime: Duration,
    /// In progress recordings are infinite streams
    pub is_live: bool,
    pub image_url: Option<String>,
    pub genres: Vec<String>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub official_rating: Option<String>,
    pub community_rating: Option<f32>,
    pub premiere_date: Option<DateTime<Utc>>,
    pub production_year: Option<i32>,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub etag: String,
}

/// A folder of the groups view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingFolder {
    pub id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub item_count: usize,
}

/// Exclusive category of a recording
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Keyed by the series folder id
    Series(String),
    Kids,
    Movies,
    News,
    Sports,
    Others,
}

impl Bucket {
    pub fn of(recording: &Recording) -> Self {
        if recording.is_series {
            Bucket::Series(series_folder_id(&recording.name))
        } else if recording.is_kids {
            Bucket::Kids
        } else if recording.is_movie {
            Bucket::Movies
        } else if recording.is_news {
            Bucket::News
        } else if recording.is_sports {
            Bucket::Sports
        } else {
            Bucket::Others
        }
    }

    /// Parses a folder id, `None` for unknown ids
    pub fn from_folder_id(folder_id: &str) -> Option<Self> {
        let lower = folder_id.to_ascii_lowercase();
        if let Some(hash) = lower.strip_prefix(SERIES_PREFIX) {
            return Some(Bucket::Series(format!("{SERIES_PREFIX}{hash}")));
        }
        match lower.as_str() {
            KIDS_FOLDER => Some(Bucket::Kids),
            MOVIES_FOLDER => Some(Bucket::Movies),
            NEWS_FOLDER => Some(Bucket::News),
            SPORTS_FOLDER => Some(Bucket::Sports),
            OTHERS_FOLDER => Some(Bucket::Others),
            _ => None,
        }
    }
}

/// Stable folder id of a series title, case-insensitive
pub fn series_folder_id(title: &str) -> String {
    format!("{SERIES_PREFIX}{}", md5_hex(&title.to_lowercase()))
}

/// Converts a recording into a consumer item
pub fn to_item(recording: &Recording, channels: &HashMap<String, ChannelType>) -> RecordingItem {
    let locator = recording
        .path
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(|| recording.url.clone())
        .unwrap_or_default();

    let content_type = if recording.is_movie {
        ContentType::Movie
    } else if recording.is_series {
        ContentType::Episode
    } else {
        ContentType::Clip
    };

    let media_type = match channels.get(&recording.channel_id) {
        Some(ChannelType::Radio) => MediaType::Audio,
        _ => MediaType::Video,
    };

    RecordingItem {
        id: recording.id.clone(),
        name: recording
            .episode_title
            .clone()
            .unwrap_or_else(|| recording.name.clone()),
        series_name: (recording.episode_title.is_some() || recording.is_series)
            .then(|| recording.name.clone()),
        overview: recording.overview.clone(),
        channel_id: recording.channel_id.clone(),
        content_type,
        media_type,
        protocol: StreamProtocol::for_locator(&locator),
        locator,
        runtime: (recording.end_time - recording.start_time)
            .to_std()
            .unwrap_or_default(),
        is_live: recording.status == RecordingStatus::InProgress,
        image_url: recording.image_url.clone(),
        genres: recording.genres.clone(),
        season_number: recording.season_number,
        episode_number: recording.episode_number,
        official_rating: recording.rating.clone(),
        community_rating: recording.community_rating,
        premiere_date: recording.original_air_date,
        production_year: recording.production_year,
        date_created: recording.start_time,
        date_modified: recording.last_updated,
        etag: recording.status.as_str().to_string(),
    }
}

/// Channel id to channel type lookup
pub fn channel_types(channels: &[Channel]) -> HashMap<String, ChannelType> {
    channels
        .iter()
        .map(|c| (c.id.clone(), c.channel_type))
        .collect()
}

/// Builds the groups view: series folders ordered by title, then the fixed
/// category folders that have at least one item
pub fn group(recordings: &[Recording]) -> Vec<RecordingFolder> {
    // lowercased title -> (display title, items)
    let mut series: BTreeMap<String, (String, Vec<&Recording>)> = BTreeMap::new();
    let mut fixed: [(Bucket, &str, &str, Vec<&Recording>); 5] = [
        (Bucket::Kids, KIDS_FOLDER, "Kids", Vec::new()),
        (Bucket::Movies, MOVIES_FOLDER, "Movies", Vec::new()),
        (Bucket::News, NEWS_FOLDER, "News", Vec::new()),
        (Bucket::Sports, SPORTS_FOLDER, "Sports", Vec::new()),
        (Bucket::Others, OTHERS_FOLDER, "Others", Vec::new()),
    ];

    for recording in recordings {
        match Bucket::of(recording) {
            Bucket::Series(_) => {
                series
                    .entry(recording.name.to_lowercase())
                    .or_insert_with(|| (recording.name.clone(), Vec::new()))
                    .1
                    .push(recording);
            }
            bucket => {
                if let Some(slot) = fixed.iter_mut().find(|(b, ..)| *b == bucket) {
                    slot.3.push(recording);
                }
            }
        }
    }

    let mut folders = Vec::with_capacity(series.len() + fixed.len());

    for (key, (title, items)) in series {
        let latest = items.iter().max_by_key(|r| r.start_time);
        folders.push(RecordingFolder {
            id: format!("{SERIES_PREFIX}{}", md5_hex(&key)),
            name: title,
            image_url: latest
                .and_then(|r| r.image_url.as_ref())
                .map(|url| url.replace("=poster", "=landscape")),
            date: latest.map(|r| r.start_time),
            item_count: items.len(),
        });
    }

    for (_, id, name, items) in fixed {
        if let Some(first) = items.first() {
            folders.push(RecordingFolder {
                id: id.to_string(),
                name: name.to_string(),
                image_url: first.image_url.clone(),
                date: None,
                item_count: items.len(),
            });
        }
    }

    folders
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn recording(id: &str, name: &str) -> Recording {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        Recording {
            id: id.into(),
            channel_id: "1".into(),
            name: name.into(),
            episode_title: None,
            overview: None,
            path: None,
            url: Some(format!("http://pvr:8866/live?recording={id}")),
            start_time: start,
            end_time: start + chrono::Duration::minutes(30),
            status: RecordingStatus::Completed,
            is_series: false,
            is_movie: false,
            is_news: false,
            is_sports: false,
            is_kids: false,
            image_url: Some(format!(
                "http://pvr:8866/service?method=recording.artwork&recording_id={id}&prefer=poster"
            )),
            genres: vec![],
            program_id: id.into(),
            season_number: None,
            episode_number: None,
            rating: None,
            community_rating: None,
            original_air_date: None,
            production_year: None,
            last_updated: start,
        }
    }

    #[test]
    fn test_bucket_precedence() {
        let mut r = recording("1", "Mixed");
        r.is_series = true;
        r.is_kids = true;
        r.is_movie = true;
        assert_eq!(Bucket::of(&r), Bucket::Series(series_folder_id("Mixed")));

        r.is_series = false;
        assert_eq!(Bucket::of(&r), Bucket::Kids);
        r.is_kids = false;
        assert_eq!(Bucket::of(&r), Bucket::Movies);
        r.is_movie = false;
        r.is_news = true;
        r.is_sports = true;
        assert_eq!(Bucket::of(&r), Bucket::News);
        r.is_news = false;
        assert_eq!(Bucket::of(&r), Bucket::Sports);
        r.is_sports = false;
        assert_eq!(Bucket::of(&r), Bucket::Others);
    }

    #[test]
    fn test_every_recording_in_exactly_one_folder() {
        let mut recordings = Vec::new();
        for mask in 0u8..32 {
            let mut r = recording(&mask.to_string(), if mask % 2 == 0 { "Alpha" } else { "alpha" });
            r.is_series = mask & 1 != 0;
            r.is_kids = mask & 2 != 0;
            r.is_movie = mask & 4 != 0;
            r.is_news = mask & 8 != 0;
            r.is_sports = mask & 16 != 0;
            recordings.push(r);
        }

        let folders = group(&recordings);
        let total: usize = folders.iter().map(|f| f.item_count).sum();
        assert_eq!(total, recordings.len());

        let others = folders.iter().find(|f| f.id == OTHERS_FOLDER).unwrap();
        assert_eq!(others.item_count, 1);
        let series: Vec<_> = folders.iter().filter(|f| f.id.starts_with(SERIES_PREFIX)).collect();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].item_count, 16);
    }

    #[test]
    fn test_series_folders_sorted_with_latest_landscape_image() {
        let mut a = recording("1", "Zorro");
        a.is_series = true;
        let mut b1 = recording("2", "Bones");
        b1.is_series = true;
        let mut b2 = recording("3", "BONES");
        b2.is_series = true;
        b2.start_time = b1.start_time + chrono::Duration::days(7);

        let folders = group(&[a, b1, b2.clone()]);
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].name, "Bones");
        assert_eq!(folders[0].id, series_folder_id("bones"));
        assert_eq!(folders[0].item_count, 2);
        assert_eq!(folders[0].date, Some(b2.start_time));
        assert_eq!(
            folders[0].image_url.as_deref(),
            Some("http://pvr:8866/service?method=recording.artwork&recording_id=3&prefer=landscape")
        );
        assert_eq!(folders[1].name, "Zorro");
    }

    #[test]
    fn test_empty_categories_are_omitted() {
        let mut movie = recording("1", "Heat");
        movie.is_movie = true;
        let folders = group(&[movie]);
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].id, MOVIES_FOLDER);
    }

    #[test]
    fn test_folder_id_parsing() {
        assert_eq!(Bucket::from_folder_id("Kids"), Some(Bucket::Kids));
        assert_eq!(
            Bucket::from_folder_id(&series_folder_id("Bones")),
            Some(Bucket::Series(series_folder_id("bones")))
        );
        assert_eq!(Bucket::from_folder_id("unknown"), None);
    }

    #[test]
    fn test_item_conversion() {
        let mut r = recording("9", "Doctor Who");
        r.episode_title = Some("Blink".into());
        r.status = RecordingStatus::InProgress;
        r.channel_id = "radio".into();
        let mut channels = HashMap::new();
        channels.insert("radio".to_string(), ChannelType::Radio);

        let item = to_item(&r, &channels);
        assert_eq!(item.name, "Blink");
        assert_eq!(item.series_name.as_deref(), Some("Doctor Who"));
        assert_eq!(item.content_type, ContentType::Clip);
        assert_eq!(item.media_type, MediaType::Audio);
        assert_eq!(item.protocol, StreamProtocol::Http);
        assert_eq!(item.runtime, Duration::from_secs(1800));
        assert!(item.is_live);
        assert_eq!(item.etag, "InProgress");

        let mut plain = recording("10", "Heat");
        plain.path = Some("/srv/tv/heat.ts".into());
        plain.is_movie = true;
        let item = to_item(&plain, &HashMap::new());
        assert_eq!(item.name, "Heat");
        assert!(item.series_name.is_none());
        assert_eq!(item.locator, "/srv/tv/heat.ts");
        assert_eq!(item.protocol, StreamProtocol::File);
        assert_eq!(item.media_type, MediaType::Video);
        assert_eq!(item.content_type, ContentType::Movie);
        assert!(!item.is_live);
    }
}
