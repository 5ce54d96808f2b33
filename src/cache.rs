use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::sources::Track;

/// Entrada de caché con su marca de creación.
#[derive(Debug, Clone)]
struct CacheEntry {
    track: Track,
    created_at: Instant,
}

/// Caché de metadatos resueltos (consulta -> Track) con TTL, delante de los
/// resolvers para evitar repetir llamadas a las APIs externas.
#[derive(Debug)]
pub struct MetadataCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl MetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, query: &str) -> Option<Track> {
        let entry = self.entries.get(query)?;
        if entry.created_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(query);
            return None;
        }
        Some(entry.track.clone())
    }

    pub fn insert(&self, query: &str, track: Track) {
        self.entries.insert(
            query.to_string(),
            CacheEntry {
                track,
                created_at: Instant::now(),
            },
        );
    }

    /// Limpia entradas expiradas y retorna cuántas se removieron.
    pub fn cleanup_expired(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().created_at.elapsed() > self.ttl)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!("🧹 Limpiadas {} entradas expiradas del caché", removed);
        }

        removed
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Provider;
    use pretty_assertions::assert_eq;

    fn track() -> Track {
        Track::new("Canción", "https://x", Provider::YouTube)
    }

    #[test]
    fn entrada_vigente_se_recupera() {
        let cache = MetadataCache::new(Duration::from_secs(60));
        cache.insert("consulta", track());
        assert_eq!(cache.get("consulta"), Some(track()));
        assert_eq!(cache.get("otra"), None);
    }

    #[test]
    fn entrada_expirada_se_descarta() {
        let cache = MetadataCache::new(Duration::from_millis(1));
        cache.insert("consulta", track());
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.get("consulta"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn cleanup_remueve_solo_expiradas() {
        let cache = MetadataCache::new(Duration::from_millis(1));
        cache.insert("vieja", track());
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 0);
    }
}
