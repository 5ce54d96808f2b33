use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{output::VoiceOutput, queue::TrackQueue},
    error::MusicError,
    sources::Track,
};

/// Eventos que llegan a la cola de consumo único de cada sesión. El recurso
/// de salida solo publica aquí; nunca muta la sesión desde su propio hilo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// El track con este número de secuencia terminó (fin natural, error o stop).
    TrackFinished { seq: u64 },
    /// La sesión se desmonta; el bucle de control debe terminar.
    Shutdown,
}

/// Estados de la máquina. El estado transitorio "detenido" colapsa a `Idle`
/// dentro de `stop()` tras liberar el recurso de salida.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Playing,
    Paused,
}

/// Resultado de un avance de la cola.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// Comenzó a sonar este track.
    Started(Track),
    /// La cola se agotó; el recurso de salida fue liberado.
    QueueExhausted,
}

/// Máquina de estados de reproducción de una conexión de voz. Todas las
/// transiciones ocurren bajo el candado de la sesión: o en un handler de
/// comando o en el bucle drenador de eventos, nunca en el hilo del driver.
pub struct PlaybackSession {
    queue: TrackQueue,
    current: Option<Track>,
    loop_enabled: bool,
    output: Option<Arc<dyn VoiceOutput>>,
    state: SessionState,
    volume: f32,
    // Secuencia del track sonando: descarta señales de finalización viejas
    playback_seq: u64,
    // Generación de la sesión: descarta resoluciones completadas tras stop()
    epoch: u64,
}

impl PlaybackSession {
    pub fn new(max_queue_length: usize, default_volume: f32) -> Self {
        Self {
            queue: TrackQueue::new(max_queue_length),
            current: None,
            loop_enabled: false,
            output: None,
            state: SessionState::Idle,
            volume: default_volume,
            playback_seq: 0,
            epoch: 0,
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    pub fn attach_output(&mut self, output: Arc<dyn VoiceOutput>) {
        self.output = Some(output);
    }

    pub fn now_playing(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queue_tracks(&self) -> Vec<Track> {
        self.queue.tracks()
    }

    /// Agrega un track al final de la cola.
    pub fn enqueue(&mut self, track: Track) -> Result<(), MusicError> {
        self.queue.add(track)
    }

    /// Remueve el track en la posición cero-indexada.
    pub fn remove_track(&mut self, position: usize) -> Result<Track, MusicError> {
        self.queue.remove(position)
    }

    pub fn shuffle_queue(&mut self) {
        self.queue.shuffle();
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
        info!("🗑️ Cola limpiada");
    }

    /// Activa o desactiva el modo de repetición. No altera el orden actual.
    pub fn toggle_loop(&mut self) -> bool {
        self.loop_enabled = !self.loop_enabled;
        if self.loop_enabled {
            info!("🔁 Repetición activada");
        } else {
            info!("➡️ Repetición desactivada");
        }
        self.loop_enabled
    }

    /// Toma el siguiente track de la cola y lo pone a sonar. Con la cola
    /// vacía libera el recurso de salida y vuelve a `Idle`. Una URL
    /// rechazada por la salida se descarta y se reintenta con la siguiente,
    /// acotado por el largo de la cola al entrar.
    pub async fn advance(&mut self) -> Result<AdvanceOutcome, MusicError> {
        let mut attempts = self.queue.len();

        loop {
            if self.queue.is_empty() {
                info!("📭 Cola agotada");
                self.release_output().await;
                self.current = None;
                self.state = SessionState::Idle;
                return Ok(AdvanceOutcome::QueueExhausted);
            }

            let track = self.queue.next()?;

            if self.loop_enabled {
                // Re-encolar ANTES de iniciar la reproducción: el mismo
                // track vuelve a sonar tras un ciclo completo de la cola.
                let _ = self.queue.add(track.clone());
            }

            let output = match &self.output {
                Some(output) => Arc::clone(output),
                None => {
                    return Err(MusicError::Playback(
                        "no hay una conexión de voz activa".to_string(),
                    ))
                }
            };

            self.playback_seq += 1;
            match output.play(track.url(), self.volume, self.playback_seq).await {
                Ok(()) => {
                    info!("🎵 Reproduciendo: {}", track);
                    self.current = Some(track.clone());
                    self.state = SessionState::Playing;
                    return Ok(AdvanceOutcome::Started(track));
                }
                Err(e) => {
                    warn!("❌ La salida rechazó '{}': {}", track.title(), e);
                    self.current = None;

                    if attempts == 0 {
                        self.release_output().await;
                        self.state = SessionState::Idle;
                        return Err(MusicError::Playback(
                            "ninguna canción de la cola pudo reproducirse".to_string(),
                        ));
                    }
                    attempts -= 1;
                }
            }
        }
    }

    /// Señal de finalización publicada por el recurso de salida. Las señales
    /// con secuencia vieja (stop o skip ya procesados) se descartan.
    pub async fn on_track_finished(
        &mut self,
        seq: u64,
    ) -> Result<Option<AdvanceOutcome>, MusicError> {
        if seq != self.playback_seq || self.state == SessionState::Idle {
            debug!("señal de finalización obsoleta (seq {})", seq);
            return Ok(None);
        }

        self.current = None;
        self.advance().await.map(Some)
    }

    /// Detiene el track actual; la señal de finalización que dispara la
    /// salida re-entra en `advance()` a través de la cola de eventos.
    pub async fn skip(&mut self) -> Result<(), MusicError> {
        match self.state {
            SessionState::Playing | SessionState::Paused => {
                if let Some(output) = &self.output {
                    output
                        .stop()
                        .await
                        .map_err(|e| MusicError::Playback(e.to_string()))?;
                }
                info!("⏭️ Track saltado");
                Ok(())
            }
            SessionState::Idle => Err(MusicError::Validation(
                "No hay nada reproduciéndose.".to_string(),
            )),
        }
    }

    pub async fn pause(&mut self) -> Result<(), MusicError> {
        if self.state != SessionState::Playing {
            return Err(MusicError::Validation(
                "No hay nada reproduciéndose.".to_string(),
            ));
        }

        if let Some(output) = &self.output {
            output
                .pause()
                .await
                .map_err(|e| MusicError::Playback(e.to_string()))?;
        }
        self.state = SessionState::Paused;
        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<(), MusicError> {
        if self.state != SessionState::Paused {
            return Err(MusicError::Validation(
                "La reproducción no está pausada.".to_string(),
            ));
        }

        if let Some(output) = &self.output {
            output
                .resume()
                .await
                .map_err(|e| MusicError::Playback(e.to_string()))?;
        }
        self.state = SessionState::Playing;
        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    /// Libera la salida, limpia cola y track actual, y vuelve a `Idle`.
    /// Las señales y resoluciones en vuelo quedan invalidadas.
    pub async fn stop(&mut self) -> Result<(), MusicError> {
        self.epoch += 1;
        self.playback_seq += 1;
        self.queue.clear();
        self.current = None;
        self.release_output().await;
        self.state = SessionState::Idle;
        info!("⏹️ Reproducción detenida y cola limpiada");
        Ok(())
    }

    /// Ajusta el volumen. Requiere salida activa y `v` en [0, 1] inclusive;
    /// fuera de rango no se aplica.
    pub async fn set_volume(&mut self, volume: f32) -> Result<(), MusicError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(MusicError::Validation(
                "El volumen debe estar entre 0 y 1 (inclusive).".to_string(),
            ));
        }

        let output = self.output.as_ref().ok_or_else(|| {
            MusicError::Validation("No hay una conexión de voz activa.".to_string())
        })?;

        output
            .set_volume(volume)
            .await
            .map_err(|e| MusicError::Playback(e.to_string()))?;
        self.volume = volume;
        info!("🔊 Volumen ajustado a {:.2}", volume);
        Ok(())
    }

    async fn release_output(&mut self) {
        if let Some(output) = self.output.take() {
            let _ = output.stop().await;
            if let Err(e) = output.disconnect().await {
                warn!("Error al desconectar la salida de voz: {}", e);
            }
        }
    }
}

/// Handle de una sesión viva: el estado compartido más el extremo de envío
/// de su cola de eventos.
#[derive(Clone)]
pub struct SessionHandle {
    pub session: Arc<Mutex<PlaybackSession>>,
    pub events: mpsc::UnboundedSender<SessionEvent>,
}

/// Registro explícito conexión -> sesión. Crea la sesión (y su bucle de
/// control) en el primer uso y la desmonta cuando se pierde la conexión de
/// voz.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, SessionHandle>,
    max_queue_length: usize,
    default_volume: f32,
}

impl SessionRegistry {
    pub fn new(max_queue_length: usize, default_volume: f32) -> Self {
        Self {
            sessions: DashMap::new(),
            max_queue_length,
            default_volume,
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|handle| handle.clone())
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> SessionHandle {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| spawn_session(guild_id, self.max_queue_length, self.default_volume))
            .clone()
    }

    /// Desmonta la sesión de una guild: detiene la reproducción, libera la
    /// salida y termina su bucle de control.
    pub async fn teardown(&self, guild_id: GuildId) {
        if let Some((_, handle)) = self.sessions.remove(&guild_id) {
            let _ = handle.events.send(SessionEvent::Shutdown);
            let mut session = handle.session.lock().await;
            if let Err(e) = session.stop().await {
                warn!("Error al detener la sesión de guild {}: {}", guild_id, e);
            }
            info!("🔌 Sesión desmontada para guild {}", guild_id);
        }
    }
}

/// Crea la sesión y su bucle de control: un consumidor único que drena la
/// cola de eventos y aplica las transiciones bajo el candado de la sesión.
fn spawn_session(guild_id: GuildId, max_queue_length: usize, default_volume: f32) -> SessionHandle {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = Arc::new(Mutex::new(PlaybackSession::new(
        max_queue_length,
        default_volume,
    )));

    let drain = Arc::clone(&session);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                SessionEvent::TrackFinished { seq } => {
                    let mut session = drain.lock().await;
                    match session.on_track_finished(seq).await {
                        Ok(Some(AdvanceOutcome::Started(track))) => {
                            debug!("guild {}: ahora suena {}", guild_id, track.title());
                        }
                        Ok(Some(AdvanceOutcome::QueueExhausted)) => {
                            info!("guild {}: cola agotada, salida liberada", guild_id);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!("guild {}: error al avanzar la cola: {}", guild_id, e);
                        }
                    }
                }
                SessionEvent::Shutdown => break,
            }
        }
        debug!("bucle de sesión terminado para guild {}", guild_id);
    });

    SessionHandle {
        session,
        events: tx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Provider;
    use anyhow::Result;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;

    /// Salida falsa con guion: registra llamadas y rechaza URLs marcadas.
    #[derive(Default)]
    struct FakeOutput {
        played: StdMutex<Vec<String>>,
        volume: StdMutex<Option<f32>>,
        bad_urls: Vec<String>,
        disconnected: StdMutex<bool>,
    }

    impl FakeOutput {
        fn failing(bad_urls: &[&str]) -> Self {
            Self {
                bad_urls: bad_urls.iter().map(|u| u.to_string()).collect(),
                ..Self::default()
            }
        }

        fn played(&self) -> Vec<String> {
            self.played.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VoiceOutput for FakeOutput {
        async fn play(&self, url: &str, _volume: f32, _seq: u64) -> Result<()> {
            if self.bad_urls.iter().any(|bad| bad == url) {
                anyhow::bail!("URL no reproducible");
            }
            self.played.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn pause(&self) -> Result<()> {
            Ok(())
        }

        async fn resume(&self) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            *self.disconnected.lock().unwrap() = true;
            Ok(())
        }

        async fn set_volume(&self, volume: f32) -> Result<()> {
            *self.volume.lock().unwrap() = Some(volume);
            Ok(())
        }

        async fn is_playing(&self) -> bool {
            false
        }

        async fn is_paused(&self) -> bool {
            false
        }
    }

    fn track(title: &str) -> Track {
        Track::new(title, format!("https://ejemplo.test/{}", title), Provider::YouTube)
    }

    fn session_with_output(output: Arc<FakeOutput>) -> PlaybackSession {
        let mut session = PlaybackSession::new(10, 0.5);
        session.attach_output(output);
        session
    }

    #[tokio::test]
    async fn avanza_en_orden_y_agota_la_cola() {
        let output = Arc::new(FakeOutput::default());
        let mut session = session_with_output(Arc::clone(&output));

        session.enqueue(track("a")).unwrap();
        session.enqueue(track("b")).unwrap();

        let first = session.advance().await.unwrap();
        assert!(matches!(first, AdvanceOutcome::Started(ref t) if t.title() == "a"));
        assert_eq!(session.now_playing().unwrap().title(), "a");
        assert_eq!(session.state(), SessionState::Playing);

        let second = session.advance().await.unwrap();
        assert!(matches!(second, AdvanceOutcome::Started(ref t) if t.title() == "b"));

        // Tercera llamada: cola agotada, salida liberada, vuelta a Idle
        let third = session.advance().await.unwrap();
        assert_eq!(third, AdvanceOutcome::QueueExhausted);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.now_playing().is_none());
        assert!(!session.has_output());
        assert!(*output.disconnected.lock().unwrap());
    }

    #[tokio::test]
    async fn repeticion_cicla_los_mismos_tracks_en_orden() {
        let output = Arc::new(FakeOutput::default());
        let mut session = session_with_output(Arc::clone(&output));

        session.toggle_loop();
        for title in ["a", "b", "c"] {
            session.enqueue(track(title)).unwrap();
        }

        for _ in 0..6 {
            session.advance().await.unwrap();
        }

        let played: Vec<String> = output
            .played()
            .iter()
            .map(|url| url.rsplit('/').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(played, vec!["a", "b", "c", "a", "b", "c"]);
        // La cola sigue conteniendo los tres tracks
        assert_eq!(session.queue_len(), 3);
    }

    #[tokio::test]
    async fn url_rechazada_se_descarta_y_avanza_a_la_siguiente() {
        let output = Arc::new(FakeOutput::failing(&["https://ejemplo.test/mala"]));
        let mut session = session_with_output(Arc::clone(&output));

        session.enqueue(track("mala")).unwrap();
        session.enqueue(track("buena")).unwrap();

        let outcome = session.advance().await.unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Started(ref t) if t.title() == "buena"));
        assert_eq!(output.played(), vec!["https://ejemplo.test/buena"]);
    }

    #[tokio::test]
    async fn cola_de_puras_urls_malas_termina_acotada() {
        let output = Arc::new(FakeOutput::failing(&[
            "https://ejemplo.test/x",
            "https://ejemplo.test/y",
        ]));
        let mut session = session_with_output(Arc::clone(&output));
        // Con repetición activa las URLs malas se re-encolan: el avance debe
        // terminar igual gracias a la cota
        session.toggle_loop();

        session.enqueue(track("x")).unwrap();
        session.enqueue(track("y")).unwrap();

        let result = session.advance().await;
        assert!(matches!(result, Err(MusicError::Playback(_))));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.has_output());
    }

    #[tokio::test]
    async fn volumen_fuera_de_rango_no_se_aplica() {
        let output = Arc::new(FakeOutput::default());
        let mut session = session_with_output(Arc::clone(&output));

        let err = session.set_volume(1.5).await.unwrap_err();
        assert!(matches!(err, MusicError::Validation(_)));
        assert_eq!(*output.volume.lock().unwrap(), None);

        session.set_volume(1.0).await.unwrap();
        assert_eq!(*output.volume.lock().unwrap(), Some(1.0));
    }

    #[tokio::test]
    async fn senales_de_finalizacion_viejas_se_descartan() {
        let output = Arc::new(FakeOutput::default());
        let mut session = session_with_output(Arc::clone(&output));

        session.enqueue(track("a")).unwrap();
        session.enqueue(track("b")).unwrap();
        session.advance().await.unwrap();

        // Señal con secuencia vieja: no avanza
        let stale = session.on_track_finished(0).await.unwrap();
        assert!(stale.is_none());
        assert_eq!(session.now_playing().unwrap().title(), "a");

        // Señal vigente: avanza a "b"
        let outcome = session.on_track_finished(1).await.unwrap();
        assert!(matches!(
            outcome,
            Some(AdvanceOutcome::Started(ref t)) if t.title() == "b"
        ));
    }

    #[tokio::test]
    async fn stop_limpia_todo_e_invalida_resoluciones_en_vuelo() {
        let output = Arc::new(FakeOutput::default());
        let mut session = session_with_output(Arc::clone(&output));

        session.enqueue(track("a")).unwrap();
        session.enqueue(track("b")).unwrap();
        session.advance().await.unwrap();

        let epoch_before = session.epoch();
        session.stop().await.unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.queue_is_empty());
        assert!(session.now_playing().is_none());
        assert!(!session.has_output());
        // Una resolución iniciada antes del stop ve otra generación y se descarta
        assert_ne!(session.epoch(), epoch_before);
    }

    #[tokio::test]
    async fn pausa_y_reanudacion_validan_el_estado() {
        let output = Arc::new(FakeOutput::default());
        let mut session = session_with_output(Arc::clone(&output));

        assert!(session.pause().await.is_err());

        session.enqueue(track("a")).unwrap();
        session.advance().await.unwrap();

        session.pause().await.unwrap();
        assert_eq!(session.state(), SessionState::Paused);
        assert!(session.pause().await.is_err());

        session.resume().await.unwrap();
        assert_eq!(session.state(), SessionState::Playing);
        assert!(session.resume().await.is_err());
    }

    #[tokio::test]
    async fn skip_requiere_reproduccion_activa() {
        let output = Arc::new(FakeOutput::default());
        let mut session = session_with_output(Arc::clone(&output));

        assert!(matches!(
            session.skip().await,
            Err(MusicError::Validation(_))
        ));

        session.enqueue(track("a")).unwrap();
        session.advance().await.unwrap();
        assert!(session.skip().await.is_ok());
    }
}
