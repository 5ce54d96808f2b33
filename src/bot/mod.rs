//! # Bot
//!
//! Implementación del bot de Discord: despacho de comandos con prefijo,
//! pipeline de moderación de mensajes y ciclo de vida de las sesiones de
//! voz.
//!
//! El struct [`MelodiaBot`] implementa el [`EventHandler`] de serenity y
//! reúne las piezas: configuración, registro de sesiones por guild,
//! resolvers de metadatos y limitador de frecuencia. El desmonte de una
//! sesión está atado a la vida de la conexión de voz: cuando el bot sale
//! (o es sacado) del canal, `voice_state_update` la desmonta.

use serenity::{
    all::{Context, EventHandler, Message, Ready, VoiceState},
    async_trait,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod handlers;
pub mod moderation;

use crate::{
    audio::session::SessionRegistry, bot::moderation::RateLimiter, config::Config,
    sources::SourceManager,
};

pub struct MelodiaBot {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    pub sources: Arc<SourceManager>,
    rate_limiter: RateLimiter,
}

impl MelodiaBot {
    pub fn new(config: Config) -> Self {
        let sessions = Arc::new(SessionRegistry::new(
            config.max_queue_length,
            config.default_volume,
        ));
        let sources = Arc::new(SourceManager::from_config(&config));
        let rate_limiter = RateLimiter::new(config.rate_limit_per_second);

        Self {
            config: Arc::new(config),
            sessions,
            sources,
            rate_limiter,
        }
    }

    /// Conecta el bot al canal de voz y retorna el handler de la llamada.
    pub async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> anyhow::Result<Arc<tokio::sync::Mutex<songbird::Call>>> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let call = manager.join(guild_id, channel_id).await?;
        info!("🔊 Conectado al canal de voz en guild {}", guild_id);
        Ok(call)
    }
}

#[async_trait]
impl EventHandler for MelodiaBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        // Tarea de mantenimiento: limpiar el caché de metadatos cada hora
        let sources = Arc::clone(&self.sources);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));
            loop {
                interval.tick().await;
                sources.cleanup_cache();
                info!("🧹 Tareas de mantenimiento completadas");
            }
        });
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Ignorar mensajes de bots (incluido el propio)
        if msg.author.bot {
            return;
        }

        // Moderación antes del despacho de comandos
        match moderation::screen_message(
            &ctx,
            &msg,
            &self.rate_limiter,
            &self.config.blacklist_urls,
        )
        .await
        {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => warn!("Error en el filtro de moderación: {:?}", e),
        }

        if let Some(input) = msg.content.strip_prefix(self.config.command_prefix.as_str()) {
            handlers::dispatch(&ctx, &msg, input, self).await;
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        // Detectar si el bot fue desconectado del canal de voz
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                self.sessions.teardown(guild_id).await;

                if let Some(manager) = songbird::get(&ctx).await {
                    if let Err(e) = manager.remove(guild_id).await {
                        error!("Error al limpiar el handler de voz: {:?}", e);
                    }
                }
            }
        }
    }
}
