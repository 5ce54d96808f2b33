pub mod soundcloud;
pub mod spotify;
pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use std::{fmt, time::Duration};
use tracing::debug;
use url::Url;

pub use soundcloud::SoundCloudResolver;
pub use spotify::SpotifyResolver;
pub use youtube::YouTubeResolver;

use crate::{cache::MetadataCache, config::Config, error::MusicError};

/// Metadatos normalizados de un ítem de audio reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    artist: String,
    url: String,
    duration: Option<Duration>,
    provider: Provider,
}

impl Track {
    pub fn new(title: impl Into<String>, url: impl Into<String>, provider: Provider) -> Self {
        Self {
            title: title.into(),
            artist: "Unknown Artist".to_string(),
            url: url.into(),
            duration: None,
            provider,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        let artist = artist.into();
        if !artist.is_empty() {
            self.artist = artist;
        }
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn artist(&self) -> &str {
        &self.artist
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn provider(&self) -> Provider {
        self.provider
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.title, self.artist)
    }
}

/// Conjunto cerrado de proveedores de medios soportados.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    YouTube,
    Spotify,
    SoundCloud,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::YouTube => "youtube",
            Provider::Spotify => "spotify",
            Provider::SoundCloud => "soundcloud",
        }
    }

    /// Selecciona el proveedor inspeccionando el host de la URL. Un texto
    /// que no es URL se trata como búsqueda en YouTube.
    pub fn detect(query: &str) -> Option<Provider> {
        let parsed = match Url::parse(query) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => url,
            // No es una URL: término de búsqueda
            _ => return Some(Provider::YouTube),
        };

        let host = parsed.host_str()?;

        if host == "youtu.be" || host == "youtube.com" || host.ends_with(".youtube.com") {
            return Some(Provider::YouTube);
        }
        if host == "spotify.com" || host.ends_with(".spotify.com") {
            return Some(Provider::Spotify);
        }
        if host == "soundcloud.com" || host.ends_with(".soundcloud.com") {
            return Some(Provider::SoundCloud);
        }

        None
    }
}

/// Capacidad común de resolución: una consulta o URL se traduce en un Track.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Track>;

    fn provider(&self) -> Provider;
}

/// Frente único a los resolvers de proveedores: despacho por URL, filtro de
/// fuentes permitidas, timeout y caché de metadatos.
pub struct SourceManager {
    youtube: Option<YouTubeResolver>,
    spotify: Option<SpotifyResolver>,
    soundcloud: Option<SoundCloudResolver>,
    allowed_sources: Vec<String>,
    timeout: Duration,
    cache: MetadataCache,
}

impl SourceManager {
    pub fn from_config(config: &Config) -> Self {
        let youtube = config
            .youtube_api_key
            .as_ref()
            .filter(|_| config.source_allowed("youtube"))
            .map(|key| YouTubeResolver::new(key.clone()));

        let spotify = match (&config.spotify_client_id, &config.spotify_client_secret) {
            (Some(id), Some(secret)) if config.source_allowed("spotify") => {
                Some(SpotifyResolver::new(id.clone(), secret.clone()))
            }
            _ => None,
        };

        let soundcloud = config
            .soundcloud_client_id
            .as_ref()
            .filter(|_| config.source_allowed("soundcloud"))
            .map(|id| SoundCloudResolver::new(id.clone()));

        Self {
            youtube,
            spotify,
            soundcloud,
            allowed_sources: config.allowed_sources.clone(),
            timeout: Duration::from_secs(config.resolver_timeout_secs),
            cache: MetadataCache::new(Duration::from_secs(config.cache_ttl_secs)),
        }
    }

    /// Resuelve una consulta a un Track. Cualquier fallo se reporta como
    /// error de resolución y no tiene efectos secundarios.
    pub async fn resolve(&self, query: &str) -> Result<Track, MusicError> {
        let provider = Provider::detect(query).ok_or_else(|| {
            MusicError::Resolution(format!(
                "URL o búsqueda inválida. Fuentes soportadas: {}.",
                self.allowed_sources.join(", ")
            ))
        })?;

        let resolver = self.resolver_for(provider).ok_or_else(|| {
            MusicError::Resolution(format!(
                "La fuente {} no está habilitada en este servidor.",
                provider.as_str()
            ))
        })?;

        if let Some(track) = self.cache.get(query) {
            debug!("🎯 Metadatos desde caché para: {}", query);
            return Ok(track);
        }

        let track = tokio::time::timeout(self.timeout, resolver.resolve(query))
            .await
            .map_err(|_| {
                MusicError::Resolution(format!(
                    "La búsqueda tardó demasiado (más de {} s).",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| MusicError::Resolution(format!("No se pudo resolver '{}': {}", query, e)))?;

        debug!(
            "✅ Resuelto vía {}: {}",
            resolver.provider().as_str(),
            track.title()
        );
        self.cache.insert(query, track.clone());
        Ok(track)
    }

    /// Limpia entradas expiradas del caché de metadatos.
    pub fn cleanup_cache(&self) -> usize {
        self.cache.cleanup_expired()
    }

    fn resolver_for(&self, provider: Provider) -> Option<&dyn MediaResolver> {
        match provider {
            Provider::YouTube => self.youtube.as_ref().map(|r| r as &dyn MediaResolver),
            Provider::Spotify => self.spotify.as_ref().map(|r| r as &dyn MediaResolver),
            Provider::SoundCloud => self.soundcloud.as_ref().map(|r| r as &dyn MediaResolver),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config_de_prueba() -> Config {
        Config {
            discord_token: "token".to_string(),
            youtube_api_key: Some("key".to_string()),
            spotify_client_id: Some("id".to_string()),
            spotify_client_secret: Some("secret".to_string()),
            soundcloud_client_id: Some("sc".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn deteccion_de_proveedor_por_host() {
        assert_eq!(
            Provider::detect("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some(Provider::YouTube)
        );
        assert_eq!(
            Provider::detect("https://youtu.be/dQw4w9WgXcQ"),
            Some(Provider::YouTube)
        );
        assert_eq!(
            Provider::detect("https://music.youtube.com/watch?v=abc"),
            Some(Provider::YouTube)
        );
        assert_eq!(
            Provider::detect("https://open.spotify.com/track/XYZ"),
            Some(Provider::Spotify)
        );
        assert_eq!(
            Provider::detect("https://soundcloud.com/artista/pista"),
            Some(Provider::SoundCloud)
        );
        // Texto libre: búsqueda en YouTube
        assert_eq!(
            Provider::detect("never gonna give you up"),
            Some(Provider::YouTube)
        );
        // Host desconocido
        assert_eq!(Provider::detect("https://example.com/video"), None);
    }

    #[test]
    fn artista_por_defecto_cuando_falta() {
        let track = Track::new("Canción", "https://x", Provider::YouTube);
        assert_eq!(track.artist(), "Unknown Artist");

        let track = track.with_artist("");
        assert_eq!(track.artist(), "Unknown Artist");

        let track = track.with_artist("Alguien");
        assert_eq!(track.artist(), "Alguien");
    }

    #[tokio::test]
    async fn host_desconocido_produce_error_de_resolucion() {
        let manager = SourceManager::from_config(&config_de_prueba());
        let err = manager.resolve("https://example.com/cancion").await.unwrap_err();
        assert!(matches!(err, MusicError::Resolution(_)));
    }

    #[tokio::test]
    async fn fuente_deshabilitada_produce_error_de_resolucion() {
        let mut config = config_de_prueba();
        config.allowed_sources = vec!["youtube".to_string()];
        config.spotify_client_id = None;
        config.spotify_client_secret = None;

        let manager = SourceManager::from_config(&config);
        let err = manager
            .resolve("https://open.spotify.com/track/XYZ")
            .await
            .unwrap_err();
        assert!(matches!(err, MusicError::Resolution(_)));
    }

    #[tokio::test]
    async fn resolucion_fallida_deja_la_cola_intacta() {
        use crate::audio::session::PlaybackSession;

        let manager = SourceManager::from_config(&config_de_prueba());
        let session = PlaybackSession::new(10, 0.5);

        let result = manager.resolve("https://example.com/invalida").await;
        assert!(matches!(result, Err(MusicError::Resolution(_))));
        // Una resolución fallida no tiene efectos sobre la cola
        assert_eq!(session.queue_len(), 0);
    }
}
