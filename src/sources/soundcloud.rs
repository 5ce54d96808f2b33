use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{MediaResolver, Provider, Track};

const RESOLVE_URL: &str = "https://api.soundcloud.com/resolve";

/// Resolver contra el endpoint `resolve` de SoundCloud.
pub struct SoundCloudResolver {
    client: reqwest::Client,
    client_id: String,
}

impl SoundCloudResolver {
    pub fn new(client_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
        }
    }
}

#[async_trait]
impl MediaResolver for SoundCloudResolver {
    async fn resolve(&self, query: &str) -> Result<Track> {
        let response: ResolveResponse = self
            .client
            .get(RESOLVE_URL)
            .query(&[("url", query), ("client_id", self.client_id.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.kind.as_deref() != Some("track") {
            anyhow::bail!("la URL de SoundCloud no apunta a una pista");
        }

        let title = response.title.context("pista de SoundCloud sin título")?;
        let url = response
            .permalink_url
            .unwrap_or_else(|| query.to_string());

        let mut track = Track::new(title, url, Provider::SoundCloud);

        if let Some(username) = response.user.and_then(|user| user.username) {
            track = track.with_artist(username);
        }

        if let Some(millis) = response.duration {
            track = track.with_duration(Duration::from_millis(millis));
        }

        Ok(track)
    }

    fn provider(&self) -> Provider {
        Provider::SoundCloud
    }
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    kind: Option<String>,
    title: Option<String>,
    user: Option<UserRef>,
    permalink_url: Option<String>,
    duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UserRef {
    username: Option<String>,
}
