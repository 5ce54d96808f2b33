use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::time::{Duration, Instant};
use url::Url;

use super::{MediaResolver, Provider, Track};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Resolver contra la Web API de Spotify con flujo client-credentials.
/// Solo se aceptan pistas individuales; las playlists se rechazan.
pub struct SpotifyResolver {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl SpotifyResolver {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
            token: RwLock::new(None),
        }
    }

    /// Extrae el id de pista de una URL `open.spotify.com/track/<id>`.
    pub fn extract_track_id(raw: &str) -> Result<String> {
        let url = Url::parse(raw).context("URL de Spotify mal formada")?;
        let mut segments = url
            .path_segments()
            .context("URL de Spotify sin ruta")?
            .filter(|segment| !segment.is_empty());

        while let Some(segment) = segments.next() {
            match segment {
                "track" => {
                    return segments
                        .next()
                        .filter(|id| !id.is_empty())
                        .map(|id| id.to_string())
                        .context("URL de Spotify sin id de pista");
                }
                "playlist" | "album" => {
                    anyhow::bail!(
                        "solo se pueden agregar pistas individuales de Spotify, no playlists ni álbumes"
                    );
                }
                // Prefijos regionales tipo /intl-es/ se ignoran
                _ => continue,
            }
        }

        anyhow::bail!("URL de Spotify no reconocida: {}", raw)
    }

    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.token.read();
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Instant::now() {
                    return Ok(token.value.clone());
                }
            }
        }

        let response: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let value = response.access_token.clone();
        // Renovar un poco antes del vencimiento real
        let expires_at =
            Instant::now() + Duration::from_secs(response.expires_in.saturating_sub(30));

        *self.token.write() = Some(CachedToken {
            value: response.access_token,
            expires_at,
        });

        Ok(value)
    }

    async fn track_by_id(&self, track_id: &str) -> Result<Track> {
        let token = self.access_token().await?;

        let response: TrackResponse = self
            .client
            .get(format!("{}/tracks/{}", API_BASE, track_id))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let artist = response
            .artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let url = response
            .external_urls
            .and_then(|urls| urls.spotify)
            .unwrap_or_else(|| format!("https://open.spotify.com/track/{}", track_id));

        let mut track = Track::new(response.name, url, Provider::Spotify).with_artist(artist);

        if let Some(millis) = response.duration_ms {
            track = track.with_duration(Duration::from_millis(millis));
        }

        Ok(track)
    }
}

#[async_trait]
impl MediaResolver for SpotifyResolver {
    async fn resolve(&self, query: &str) -> Result<Track> {
        let track_id = Self::extract_track_id(query)?;
        self.track_by_id(&track_id).await
    }

    fn provider(&self) -> Provider {
        Provider::Spotify
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistRef>,
    external_urls: Option<ExternalUrls>,
    duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extraccion_de_id_de_pista() {
        assert_eq!(
            SpotifyResolver::extract_track_id("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC")
                .unwrap(),
            "4uLU6hMCjMI75M1A2tKUQC"
        );
        // Los parámetros de consulta no forman parte del id
        assert_eq!(
            SpotifyResolver::extract_track_id(
                "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=abc"
            )
            .unwrap(),
            "4uLU6hMCjMI75M1A2tKUQC"
        );
        // Prefijo regional
        assert_eq!(
            SpotifyResolver::extract_track_id("https://open.spotify.com/intl-es/track/abc123")
                .unwrap(),
            "abc123"
        );
    }

    #[test]
    fn playlists_y_albumes_se_rechazan() {
        assert!(
            SpotifyResolver::extract_track_id("https://open.spotify.com/playlist/37i9dQZF1DX")
                .is_err()
        );
        assert!(
            SpotifyResolver::extract_track_id("https://open.spotify.com/album/1ATL5GLy").is_err()
        );
    }

    #[test]
    fn url_sin_id_se_rechaza() {
        assert!(SpotifyResolver::extract_track_id("https://open.spotify.com/track/").is_err());
        assert!(SpotifyResolver::extract_track_id("https://open.spotify.com/").is_err());
    }
}
