use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::audio::session::SessionEvent;

/// Recurso de salida de audio consumido por la sesión. La implementación
/// real transmite por la conexión de voz; los tests usan una salida falsa.
#[async_trait]
pub trait VoiceOutput: Send + Sync {
    /// Inicia la reproducción de la URL. `seq` identifica esta reproducción
    /// en la señal de finalización.
    async fn play(&self, url: &str, volume: f32, seq: u64) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    /// Detiene el track actual; dispara la señal de finalización.
    async fn stop(&self) -> Result<()>;

    /// Abandona el canal de voz.
    async fn disconnect(&self) -> Result<()>;

    async fn set_volume(&self, volume: f32) -> Result<()>;

    #[allow(dead_code)]
    async fn is_playing(&self) -> bool;

    #[allow(dead_code)]
    async fn is_paused(&self) -> bool;
}

/// Salida respaldada por songbird: un `Call` conectado y el handle del
/// track sonando. Las señales de fin de track se publican en la cola de
/// eventos de la sesión, nunca se procesan en el hilo del driver.
pub struct SongbirdOutput {
    call: Arc<Mutex<Call>>,
    current: SyncMutex<Option<TrackHandle>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    http: reqwest::Client,
}

impl SongbirdOutput {
    pub fn new(call: Arc<Mutex<Call>>, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            call,
            current: SyncMutex::new(None),
            events,
            http: reqwest::Client::new(),
        }
    }

    fn take_current(&self) -> Option<TrackHandle> {
        self.current.lock().take()
    }

    fn current_handle(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl VoiceOutput for SongbirdOutput {
    async fn play(&self, url: &str, volume: f32, seq: u64) -> Result<()> {
        // Chequeo previo: rechazar de forma síncrona URLs que el stream
        // no va a poder abrir
        let response = self.http.head(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("URL no accesible: {}", response.status());
        }

        let input: Input = HttpRequest::new(self.http.clone(), url.to_string()).into();

        let mut call = self.call.lock().await;
        let handle = call.play_input(input);
        let _ = handle.set_volume(volume);

        // La finalización (natural, por error o por stop) solo publica un
        // evento; la sesión lo drena en su propio contexto
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackFinishedNotifier {
                        events: self.events.clone(),
                        seq,
                    },
                )
                .map_err(|e| anyhow::anyhow!("error al registrar event handler: {}", e))?;
        }

        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        if let Some(handle) = self.current_handle() {
            handle.pause()?;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        if let Some(handle) = self.current_handle() {
            handle.play()?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(handle) = self.take_current() {
            handle.stop()?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.current.lock() = None;
        let mut call = self.call.lock().await;
        call.leave().await?;
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        if let Some(handle) = self.current_handle() {
            handle.set_volume(volume)?;
        }
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        if let Some(handle) = self.current_handle() {
            if let Ok(info) = handle.get_info().await {
                return info.playing == PlayMode::Play;
            }
        }
        false
    }

    async fn is_paused(&self) -> bool {
        if let Some(handle) = self.current_handle() {
            if let Ok(info) = handle.get_info().await {
                return info.playing == PlayMode::Pause;
            }
        }
        false
    }
}

/// Publica la señal de finalización en la cola de la sesión.
struct TrackFinishedNotifier {
    events: mpsc::UnboundedSender<SessionEvent>,
    seq: u64,
}

#[async_trait]
impl VoiceEventHandler for TrackFinishedNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("track terminado (seq {})", self.seq);
        let _ = self.events.send(SessionEvent::TrackFinished { seq: self.seq });
        None
    }
}
