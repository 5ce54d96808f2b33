use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tracing::info;

use crate::{error::MusicError, sources::Track};

/// Cola FIFO de tracks pendientes de una sesión. El orden de inserción se
/// preserva salvo shuffle explícito; el tope configurado se aplica en `add`.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<Track>,
    max_len: usize,
}

impl TrackQueue {
    pub fn new(max_len: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_len,
        }
    }

    /// Agrega un track al final. Falla con `QueueFull` al alcanzar el tope.
    pub fn add(&mut self, track: Track) -> Result<(), MusicError> {
        if self.items.len() >= self.max_len {
            return Err(MusicError::QueueFull(self.max_len));
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
        Ok(())
    }

    /// Remueve y retorna el primer track (FIFO).
    pub fn next(&mut self) -> Result<Track, MusicError> {
        self.items.pop_front().ok_or(MusicError::EmptyQueue)
    }

    /// Remueve y retorna el track en `position` (cero-indexado).
    pub fn remove(&mut self, position: usize) -> Result<Track, MusicError> {
        let len = self.items.len();
        self.items
            .remove(position)
            .ok_or(MusicError::IndexOutOfRange {
                index: position,
                len,
            })
    }

    /// Permuta aleatoriamente el orden restante.
    pub fn shuffle(&mut self) {
        let mut items: Vec<_> = self.items.drain(..).collect();
        items.shuffle(&mut rand::thread_rng());
        self.items.extend(items);
        info!("🔀 Cola mezclada");
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Copia del contenido en orden, para mostrar la cola.
    pub fn tracks(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Provider;
    use pretty_assertions::assert_eq;

    fn track(title: &str) -> Track {
        Track::new(title, format!("https://ejemplo.test/{}", title), Provider::YouTube)
    }

    #[test]
    fn next_respeta_orden_fifo() {
        let mut queue = TrackQueue::new(10);
        for title in ["a", "b", "c"] {
            queue.add(track(title)).unwrap();
        }

        assert_eq!(queue.next().unwrap().title(), "a");
        assert_eq!(queue.next().unwrap().title(), "b");
        assert_eq!(queue.next().unwrap().title(), "c");
        assert!(queue.is_empty());
    }

    #[test]
    fn next_en_cola_vacia_falla_sin_efectos() {
        let mut queue = TrackQueue::new(10);
        assert!(matches!(queue.next(), Err(MusicError::EmptyQueue)));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn remove_fuera_de_rango_no_modifica_la_cola() {
        let mut queue = TrackQueue::new(10);
        queue.add(track("a")).unwrap();
        queue.add(track("b")).unwrap();

        let err = queue.remove(5).unwrap_err();
        assert!(matches!(
            err,
            MusicError::IndexOutOfRange { index: 5, len: 2 }
        ));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.tracks()[0].title(), "a");
    }

    #[test]
    fn remove_retorna_el_track_de_la_posicion() {
        let mut queue = TrackQueue::new(10);
        for title in ["a", "b", "c"] {
            queue.add(track(title)).unwrap();
        }

        let removed = queue.remove(1).unwrap();
        assert_eq!(removed.title(), "b");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next().unwrap().title(), "a");
        assert_eq!(queue.next().unwrap().title(), "c");
    }

    #[test]
    fn add_al_tope_falla_con_cola_llena() {
        let mut queue = TrackQueue::new(2);
        queue.add(track("a")).unwrap();
        queue.add(track("b")).unwrap();

        assert!(matches!(
            queue.add(track("c")),
            Err(MusicError::QueueFull(2))
        ));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn duplicados_permitidos() {
        let mut queue = TrackQueue::new(10);
        queue.add(track("a")).unwrap();
        queue.add(track("a")).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn shuffle_preserva_el_contenido() {
        let mut queue = TrackQueue::new(20);
        for i in 0..10 {
            queue.add(track(&format!("t{}", i))).unwrap();
        }

        queue.shuffle();

        let mut titles: Vec<String> = queue
            .tracks()
            .iter()
            .map(|t| t.title().to_string())
            .collect();
        titles.sort();
        let expected: Vec<String> = (0..10).map(|i| format!("t{}", i)).collect();
        let mut expected_sorted = expected.clone();
        expected_sorted.sort();
        assert_eq!(titles, expected_sorted);
    }

    #[test]
    fn clear_es_idempotente() {
        let mut queue = TrackQueue::new(10);
        queue.add(track("a")).unwrap();
        queue.clear();
        assert!(queue.is_empty());
        queue.clear();
        assert!(queue.is_empty());
    }
}
