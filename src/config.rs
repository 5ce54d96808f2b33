use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Configuración del bot, cargada desde variables de entorno.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Reproducción
    pub default_volume: f32,
    pub max_queue_length: usize,

    // Fuentes permitidas (youtube, spotify, soundcloud)
    pub allowed_sources: Vec<String>,

    // Credenciales de proveedores
    pub youtube_api_key: Option<String>,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub soundcloud_client_id: Option<String>,

    // Moderación
    pub rate_limit_per_second: f64,
    pub blacklist_urls: Vec<String>,

    // Límites
    pub resolver_timeout_secs: u64,
    pub cache_ttl_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: std::env::var("COMMAND_PREFIX")
                .unwrap_or_else(|_| "!".to_string()),

            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            max_queue_length: std::env::var("MAX_QUEUE_LENGTH")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            allowed_sources: parse_csv(
                &std::env::var("ALLOWED_SOURCES")
                    .unwrap_or_else(|_| "youtube,spotify,soundcloud".to_string()),
            ),

            youtube_api_key: std::env::var("YOUTUBE_API_KEY").ok(),
            spotify_client_id: std::env::var("SPOTIFY_CLIENT_ID").ok(),
            spotify_client_secret: std::env::var("SPOTIFY_CLIENT_SECRET").ok(),
            soundcloud_client_id: std::env::var("SOUNDCLOUD_CLIENT_ID").ok(),

            rate_limit_per_second: std::env::var("RATE_LIMIT_PER_SECOND")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()?,
            blacklist_urls: parse_csv(
                &std::env::var("BLACKLIST_URLS").unwrap_or_default(),
            ),

            resolver_timeout_secs: std::env::var("RESOLVER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()?,
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS")
                .unwrap_or_else(|_| "600".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Verifica que los valores cargados sean coherentes antes de arrancar.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.is_empty() {
            anyhow::bail!("DISCORD_TOKEN no puede estar vacío");
        }

        if self.command_prefix.is_empty() {
            anyhow::bail!("COMMAND_PREFIX no puede estar vacío");
        }

        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!(
                "DEFAULT_VOLUME debe estar entre 0 y 1, recibido: {}",
                self.default_volume
            );
        }

        if self.max_queue_length == 0 {
            anyhow::bail!("MAX_QUEUE_LENGTH debe ser mayor que 0");
        }

        if self.rate_limit_per_second <= 0.0 {
            anyhow::bail!("RATE_LIMIT_PER_SECOND debe ser mayor que 0");
        }

        if self.allowed_sources.is_empty() {
            anyhow::bail!("ALLOWED_SOURCES no puede estar vacío");
        }

        for source in &self.allowed_sources {
            match source.as_str() {
                "youtube" => {
                    if self.youtube_api_key.is_none() {
                        anyhow::bail!("YOUTUBE_API_KEY es requerido cuando youtube está habilitado");
                    }
                }
                "spotify" => {
                    if self.spotify_client_id.is_none() || self.spotify_client_secret.is_none() {
                        anyhow::bail!(
                            "SPOTIFY_CLIENT_ID y SPOTIFY_CLIENT_SECRET son requeridos cuando spotify está habilitado"
                        );
                    }
                }
                "soundcloud" => {
                    if self.soundcloud_client_id.is_none() {
                        anyhow::bail!(
                            "SOUNDCLOUD_CLIENT_ID es requerido cuando soundcloud está habilitado"
                        );
                    }
                }
                other => anyhow::bail!("Fuente desconocida en ALLOWED_SOURCES: {}", other),
            }
        }

        Ok(())
    }

    pub fn source_allowed(&self, name: &str) -> bool {
        self.allowed_sources.iter().any(|s| s == name)
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            command_prefix: "!".to_string(),
            default_volume: 0.5,
            max_queue_length: 10,
            allowed_sources: vec![
                "youtube".to_string(),
                "spotify".to_string(),
                "soundcloud".to_string(),
            ],
            youtube_api_key: None,
            spotify_client_id: None,
            spotify_client_secret: None,
            soundcloud_client_id: None,
            rate_limit_per_second: 1.0,
            blacklist_urls: Vec::new(),
            resolver_timeout_secs: 15,
            cache_ttl_secs: 600,
        }
    }
}
