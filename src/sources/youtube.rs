use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{MediaResolver, Provider, Track};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Resolver contra la YouTube Data API v3: URLs de video por id y
/// búsquedas de texto libre (primer resultado).
pub struct YouTubeResolver {
    client: reqwest::Client,
    api_key: String,
}

impl YouTubeResolver {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Extrae el id de video de URLs `watch?v=` y `youtu.be/`.
    pub fn extract_video_id(raw: &str) -> Option<String> {
        let url = Url::parse(raw).ok()?;
        let host = url.host_str()?;

        if host == "youtu.be" {
            return url
                .path_segments()?
                .next()
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_string());
        }

        if host == "youtube.com" || host.ends_with(".youtube.com") {
            if url.path() == "/watch" {
                return url
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.to_string());
            }
        }

        None
    }

    async fn video_by_id(&self, video_id: &str) -> Result<Track> {
        let response: VideoListResponse = self
            .client
            .get(format!("{}/videos", API_BASE))
            .query(&[
                ("part", "snippet,contentDetails"),
                ("id", video_id),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let item = response
            .items
            .into_iter()
            .next()
            .context("video no encontrado")?;

        let mut track = Track::new(
            item.snippet.title,
            format!("https://www.youtube.com/watch?v={}", video_id),
            Provider::YouTube,
        );

        if let Some(channel) = item.snippet.channel_title {
            track = track.with_artist(channel);
        }

        if let Some(duration) = item
            .content_details
            .and_then(|details| parse_iso8601_duration(&details.duration))
        {
            track = track.with_duration(duration);
        }

        Ok(track)
    }

    async fn search(&self, query: &str) -> Result<Track> {
        let response: SearchListResponse = self
            .client
            .get(format!("{}/search", API_BASE))
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("type", "video"),
                ("maxResults", "1"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let item = response
            .items
            .into_iter()
            .next()
            .context("sin resultados para la búsqueda")?;

        // La búsqueda no expone la duración; queda como desconocida
        let mut track = Track::new(
            item.snippet.title,
            format!("https://www.youtube.com/watch?v={}", item.id.video_id),
            Provider::YouTube,
        );

        if let Some(channel) = item.snippet.channel_title {
            track = track.with_artist(channel);
        }

        Ok(track)
    }
}

#[async_trait]
impl MediaResolver for YouTubeResolver {
    async fn resolve(&self, query: &str) -> Result<Track> {
        if let Some(video_id) = Self::extract_video_id(query) {
            return self.video_by_id(&video_id).await;
        }

        if query.starts_with("http") {
            anyhow::bail!("URL de YouTube no reconocida: {}", query);
        }

        self.search(query).await
    }

    fn provider(&self) -> Provider {
        Provider::YouTube
    }
}

/// Convierte duraciones ISO-8601 de la API (`PT1H2M3S`) a Duration.
fn parse_iso8601_duration(raw: &str) -> Option<Duration> {
    let body = raw.strip_prefix('P')?;
    let mut seconds: u64 = 0;
    let mut digits = String::new();
    let mut seen_unit = false;

    for ch in body.chars() {
        match ch {
            'T' => continue,
            '0'..='9' => digits.push(ch),
            'D' | 'H' | 'M' | 'S' => {
                let value: u64 = digits.parse().ok()?;
                digits.clear();
                seen_unit = true;
                seconds += value
                    * match ch {
                        'D' => 86_400,
                        'H' => 3_600,
                        'M' => 60,
                        _ => 1,
                    };
            }
            _ => return None,
        }
    }

    if seen_unit && digits.is_empty() {
        Some(Duration::from_secs(seconds))
    } else {
        None
    }
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    snippet: Snippet,
    #[serde(rename = "contentDetails")]
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(rename = "channelTitle")]
    channel_title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: String,
}

#[derive(Debug, Deserialize)]
struct SearchListResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct SearchId {
    #[serde(rename = "videoId")]
    video_id: String,
}
