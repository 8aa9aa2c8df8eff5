//! Channels and guide listings

use super::{deserialize_id, from_unix_millis, non_empty, parse_air_date, GenreFlags, NextPvrApi};
use crate::error::Result;
use crate::models::{Channel, ChannelType, Program};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// NextPVR channel type code for television
const CHANNEL_TYPE_TV: i64 = 1;

#[derive(Debug, Deserialize)]
struct ChannelsResponse {
    #[serde(default)]
    channels: Vec<ChannelResponse>,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    #[serde(rename = "channelId", deserialize_with = "deserialize_id")]
    id: String,
    #[serde(default, rename = "channelNumber")]
    number: i64,
    #[serde(default, rename = "channelMinor")]
    minor: i64,
    #[serde(default, rename = "channelName")]
    name: String,
    #[serde(default = "default_channel_type", rename = "channelType")]
    channel_type: i64,
    /// Whether the backend holds an icon for this channel
    #[serde(default, rename = "channelIcon")]
    has_icon: bool,
}

fn default_channel_type() -> i64 {
    CHANNEL_TYPE_TV
}

#[derive(Debug, Clone, Copy, Default)]
struct ListingOptions {
    episode_images: bool,
    show_repeat: bool,
}

#[derive(Debug, Deserialize)]
struct ListingsResponse {
    #[serde(default)]
    listings: Vec<ListingResponse>,
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(deserialize_with = "deserialize_id")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default, alias = "desc")]
    description: Option<String>,
    /// Milliseconds since the epoch
    start: i64,
    end: i64,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    season: Option<u32>,
    #[serde(default)]
    episode: Option<u32>,
    #[serde(default)]
    original: Option<String>,
    #[serde(default)]
    rating: Option<String>,
    #[serde(default, rename = "starRating")]
    star_rating: Option<f32>,
}

impl NextPvrApi {
    fn convert_channel(&self, c: ChannelResponse) -> Channel {
        let number = if c.minor > 0 {
            format!("{}.{}", c.number, c.minor)
        } else {
            c.number.to_string()
        };
        let icon_url = c.has_icon.then(|| {
            self.backend_url(
                "service",
                &[("method", "channel.icon"), ("channel_id", c.id.as_str())],
            )
        });
        Channel {
            number,
            name: c.name,
            channel_type: if c.channel_type == CHANNEL_TYPE_TV {
                ChannelType::Tv
            } else {
                ChannelType::Radio
            },
            icon_url,
            id: c.id,
        }
    }

    /// Guide options: episode artwork from the backend flag or the
    /// configuration, repeat tagging from `show_repeat`
    async fn listing_options(&self) -> ListingOptions {
        ListingOptions {
            episode_images: self.artwork_from_backend().await || self.settings().get_episode_image,
            show_repeat: self.settings().show_repeat,
        }
    }

    fn convert_listing(&self, channel_id: &str, l: ListingResponse, options: ListingOptions) -> Program {
        let flags = GenreFlags::from_genres(&l.genres);
        let episode_title = non_empty(l.subtitle);
        let start_time = from_unix_millis(l.start);
        let original_air_date = parse_air_date(l.original.as_deref());
        let image_url = options.episode_images.then(|| {
            self.backend_url(
                "service",
                &[("method", "channel.show.artwork"), ("event_id", l.id.as_str())],
            )
        });

        Program {
            channel_id: channel_id.to_string(),
            is_series: !flags.movie && (episode_title.is_some() || l.season.is_some()),
            is_repeat: options.show_repeat
                && original_air_date.is_some_and(|d| d.date_naive() < start_time.date_naive()),
            is_movie: flags.movie,
            is_news: flags.news,
            is_sports: flags.sports,
            is_kids: flags.kids,
            name: l.name,
            episode_title,
            overview: non_empty(l.description),
            start_time,
            end_time: from_unix_millis(l.end),
            genres: l.genres,
            season_number: l.season,
            episode_number: l.episode,
            original_air_date,
            rating: non_empty(l.rating),
            community_rating: l.star_rating,
            image_url,
            id: l.id,
        }
    }

    /// Lists every channel (`channel.list`)
    pub async fn list_channels(&self, cancel: &CancellationToken) -> Result<Vec<Channel>> {
        info!("Retrieving NextPVR channels");
        let response: ChannelsResponse = self.fetch("channel.list", &[], "channels", cancel).await?;
        Ok(response
            .channels
            .into_iter()
            .map(|c| self.convert_channel(c))
            .collect())
    }

    /// Guide entries of one channel between `start` and `end`
    /// (`channel.listings`, bounds in unix seconds)
    pub async fn list_programs(
        &self,
        channel_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Program>> {
        info!(channel_id, %start, %end, "Retrieving NextPVR listings");
        let response: ListingsResponse = self
            .fetch(
                "channel.listings",
                &[
                    ("channel_id", channel_id.to_string()),
                    ("start", start.timestamp().to_string()),
                    ("end", end.timestamp().to_string()),
                ],
                channel_id,
                cancel,
            )
            .await?;
        let options = self.listing_options().await;
        Ok(response
            .listings
            .into_iter()
            .map(|l| self.convert_listing(channel_id, l, options))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NextPvrSettings;
    use serde_json::json;

    fn api() -> NextPvrApi {
        NextPvrApi::new(NextPvrSettings {
            web_service_url: "http://pvr:8866".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_channel_conversion() {
        let raw: ChannelsResponse = serde_json::from_value(json!({
            "channels": [
                {"channelId": 7, "channelNumber": 2, "channelMinor": 1, "channelName": "Two", "channelType": 1, "channelIcon": true},
                {"channelId": "8", "channelNumber": 900, "channelName": "Radio", "channelType": 10}
            ]
        }))
        .unwrap();
        let api = api();
        let channels: Vec<Channel> = raw.channels.into_iter().map(|c| api.convert_channel(c)).collect();

        assert_eq!(channels[0].id, "7");
        assert_eq!(channels[0].number, "2.1");
        assert_eq!(channels[0].channel_type, ChannelType::Tv);
        assert_eq!(
            channels[0].icon_url.as_deref(),
            Some("http://pvr:8866/service?method=channel.icon&channel_id=7")
        );
        assert_eq!(channels[1].number, "900");
        assert_eq!(channels[1].channel_type, ChannelType::Radio);
        assert!(channels[1].icon_url.is_none());
    }

    fn doctor_who() -> ListingResponse {
        serde_json::from_value(json!({
            "id": 1001,
            "name": "Doctor Who",
            "subtitle": "Blink",
            "start": 1_700_000_000_000i64,
            "end": 1_700_003_600_000i64,
            "genres": ["Drama"],
            "season": 3,
            "episode": 10,
            "original": "2007-06-09"
        }))
        .unwrap()
    }

    #[test]
    fn test_listing_conversion_flags() {
        let options = ListingOptions {
            show_repeat: true,
            ..Default::default()
        };
        let program = api().convert_listing("7", doctor_who(), options);

        assert_eq!(program.id, "1001");
        assert_eq!(program.channel_id, "7");
        assert!(program.is_series);
        assert!(program.is_repeat);
        assert!(!program.is_movie);
        assert_eq!(program.end_time - program.start_time, chrono::Duration::hours(1));
        assert!(program.image_url.is_none());
    }

    #[test]
    fn test_repeat_and_artwork_follow_options() {
        let api = api();
        let plain = api.convert_listing("7", doctor_who(), ListingOptions::default());
        assert!(!plain.is_repeat);
        assert!(plain.image_url.is_none());

        let options = ListingOptions {
            episode_images: true,
            show_repeat: false,
        };
        let imaged = api.convert_listing("7", doctor_who(), options);
        assert!(!imaged.is_repeat);
        assert_eq!(
            imaged.image_url.as_deref(),
            Some("http://pvr:8866/service?method=channel.show.artwork&event_id=1001")
        );
    }
}
