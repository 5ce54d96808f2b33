use serenity::{
    all::Message,
    builder::{CreateEmbed, CreateMessage},
    model::id::{ChannelId, GuildId, UserId},
    prelude::Context,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{output::SongbirdOutput, session::SessionHandle},
    bot::{moderation, MelodiaBot},
    error::MusicError,
    ui::embeds,
};

/// Despacha un comando con prefijo ya removido. Este es el límite de
/// errores: cualquier fallo de dominio se convierte en un embed visible y
/// se registra, sin tumbar la sesión.
pub async fn dispatch(ctx: &Context, msg: &Message, input: &str, bot: &MelodiaBot) {
    let mut parts = input.trim().splitn(2, char::is_whitespace);
    let verb = match parts.next().filter(|verb| !verb.is_empty()) {
        Some(verb) => verb,
        None => return,
    };
    let args = parts.next().unwrap_or("").trim();

    info!(
        "📝 Comando {} usado por {} en guild {:?}",
        verb, msg.author.name, msg.guild_id
    );

    let result = match verb {
        "play" => handle_play(ctx, msg, args, bot).await,
        "skip" => handle_skip(ctx, msg, bot).await,
        "stop" => handle_stop(ctx, msg, bot).await,
        "pause" => handle_pause(ctx, msg, bot).await,
        "resume" => handle_resume(ctx, msg, bot).await,
        "volume" => handle_volume(ctx, msg, args, bot).await,
        "queue" => handle_queue(ctx, msg, bot).await,
        "nowplaying" => handle_nowplaying(ctx, msg, bot).await,
        "loop" => handle_loop(ctx, msg, bot).await,
        "shuffle" => handle_shuffle(ctx, msg, bot).await,
        "remove" => handle_remove(ctx, msg, args, bot).await,
        "clear" => handle_clear(ctx, msg, bot).await,
        "kick" => moderation::handle_kick(ctx, msg, args).await,
        "ban" => moderation::handle_ban(ctx, msg, args).await,
        "mute" => moderation::handle_mute(ctx, msg, args).await,
        "unmute" => moderation::handle_unmute(ctx, msg, args).await,
        "help" => handle_help(ctx, msg, bot).await,
        _ => {
            send_embed(
                ctx,
                msg.channel_id,
                embeds::create_error_embed(&format!("Comando no encontrado: {}", verb)),
            )
            .await;
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!("Comando {} falló: {}", verb, e);
        send_embed(ctx, msg.channel_id, embeds::create_error_embed(&e.user_message())).await;
    }
}

async fn handle_play(
    ctx: &Context,
    msg: &Message,
    args: &str,
    bot: &MelodiaBot,
) -> Result<(), MusicError> {
    if args.is_empty() {
        return Err(MusicError::Validation(
            "Uso: play <URL o término de búsqueda>".to_string(),
        ));
    }

    let guild_id = require_guild(msg)?;
    let voice_channel = user_voice_channel(ctx, guild_id, msg.author.id).ok_or_else(|| {
        MusicError::Validation(
            "Debes estar en un canal de voz para reproducir música.".to_string(),
        )
    })?;

    let handle = bot.sessions.get_or_create(guild_id);

    // La resolución (la parte lenta) corre sin sostener el candado de la
    // sesión; la generación detecta un stop() ocurrido en el medio
    let epoch = handle.session.lock().await.epoch();
    let track = bot.sources.resolve(args).await?;

    let mut session = handle.session.lock().await;
    if session.epoch() != epoch {
        debug!("resolución completada después de stop(); descartada");
        return Ok(());
    }

    if !session.has_output() {
        let call = bot
            .join_voice_channel(ctx, guild_id, voice_channel)
            .await
            .map_err(|e| {
                MusicError::Playback(format!("no se pudo conectar al canal de voz: {}", e))
            })?;
        session.attach_output(Arc::new(SongbirdOutput::new(call, handle.events.clone())));
    }

    session.enqueue(track.clone())?;

    if session.now_playing().is_none() {
        session.advance().await?;
    }
    drop(session);

    send_embed(ctx, msg.channel_id, embeds::create_song_embed(&track)).await;
    Ok(())
}

async fn handle_skip(ctx: &Context, msg: &Message, bot: &MelodiaBot) -> Result<(), MusicError> {
    let session = require_session(msg, bot)?;
    session.session.lock().await.skip().await?;

    send_embed(
        ctx,
        msg.channel_id,
        embeds::create_info_embed("⏭️ Saltado", "Saltando a la siguiente canción..."),
    )
    .await;
    Ok(())
}

async fn handle_stop(ctx: &Context, msg: &Message, bot: &MelodiaBot) -> Result<(), MusicError> {
    let session = require_session(msg, bot)?;
    session.session.lock().await.stop().await?;

    send_embed(
        ctx,
        msg.channel_id,
        embeds::create_info_embed("⏹️ Detenido", "Reproducción detenida y cola limpiada."),
    )
    .await;
    Ok(())
}

async fn handle_pause(ctx: &Context, msg: &Message, bot: &MelodiaBot) -> Result<(), MusicError> {
    let session = require_session(msg, bot)?;
    session.session.lock().await.pause().await?;

    send_embed(
        ctx,
        msg.channel_id,
        embeds::create_info_embed("⏸️ Pausado", "Reproducción pausada."),
    )
    .await;
    Ok(())
}

async fn handle_resume(ctx: &Context, msg: &Message, bot: &MelodiaBot) -> Result<(), MusicError> {
    let session = require_session(msg, bot)?;
    session.session.lock().await.resume().await?;

    send_embed(
        ctx,
        msg.channel_id,
        embeds::create_info_embed("▶️ Reanudado", "Reproducción reanudada."),
    )
    .await;
    Ok(())
}

async fn handle_volume(
    ctx: &Context,
    msg: &Message,
    args: &str,
    bot: &MelodiaBot,
) -> Result<(), MusicError> {
    let volume: f32 = args.parse().map_err(|_| {
        MusicError::Validation("El volumen debe ser un número entre 0 y 1 (inclusive).".to_string())
    })?;

    let session = require_session(msg, bot)?;
    session.session.lock().await.set_volume(volume).await?;

    send_embed(
        ctx,
        msg.channel_id,
        embeds::create_info_embed("🔊 Volumen", &format!("Volumen ajustado a {:.2}.", volume)),
    )
    .await;
    Ok(())
}

async fn handle_queue(ctx: &Context, msg: &Message, bot: &MelodiaBot) -> Result<(), MusicError> {
    let session = require_session(msg, bot)?;
    let (current, tracks, loop_enabled) = {
        let session = session.session.lock().await;
        (
            session.now_playing().cloned(),
            session.queue_tracks(),
            session.loop_enabled(),
        )
    };

    if current.is_none() && tracks.is_empty() {
        return Err(MusicError::EmptyQueue);
    }

    send_embed(
        ctx,
        msg.channel_id,
        embeds::create_queue_embed(current.as_ref(), &tracks, loop_enabled),
    )
    .await;
    Ok(())
}

async fn handle_nowplaying(
    ctx: &Context,
    msg: &Message,
    bot: &MelodiaBot,
) -> Result<(), MusicError> {
    let session = require_session(msg, bot)?;
    let current = session.session.lock().await.now_playing().cloned();

    match current {
        Some(track) => {
            send_embed(ctx, msg.channel_id, embeds::create_now_playing_embed(&track)).await;
            Ok(())
        }
        None => Err(MusicError::Validation(
            "No hay ninguna canción reproduciéndose.".to_string(),
        )),
    }
}

async fn handle_loop(ctx: &Context, msg: &Message, bot: &MelodiaBot) -> Result<(), MusicError> {
    let guild_id = require_guild(msg)?;
    let handle = bot.sessions.get_or_create(guild_id);
    let enabled = handle.session.lock().await.toggle_loop();

    let message = if enabled {
        "🔁 Repetición activada."
    } else {
        "➡️ Repetición desactivada."
    };
    send_embed(ctx, msg.channel_id, embeds::create_info_embed("Repetición", message)).await;
    Ok(())
}

async fn handle_shuffle(ctx: &Context, msg: &Message, bot: &MelodiaBot) -> Result<(), MusicError> {
    let session = require_session(msg, bot)?;
    {
        let mut session = session.session.lock().await;
        if session.queue_is_empty() {
            return Err(MusicError::EmptyQueue);
        }
        session.shuffle_queue();
    }

    send_embed(
        ctx,
        msg.channel_id,
        embeds::create_info_embed("🔀 Mezclado", "Cola mezclada."),
    )
    .await;
    Ok(())
}

async fn handle_remove(
    ctx: &Context,
    msg: &Message,
    args: &str,
    bot: &MelodiaBot,
) -> Result<(), MusicError> {
    let index: usize = args.parse().map_err(|_| {
        MusicError::Validation("Debes indicar la posición de la canción a eliminar.".to_string())
    })?;

    let session = require_session(msg, bot)?;
    let removed = {
        let mut session = session.session.lock().await;
        let len = session.queue_len();
        if len == 0 {
            return Err(MusicError::EmptyQueue);
        }
        // El usuario cuenta desde 1
        let position = index
            .checked_sub(1)
            .ok_or(MusicError::IndexOutOfRange { index: 0, len })?;
        session.remove_track(position)?
    };

    send_embed(
        ctx,
        msg.channel_id,
        embeds::create_info_embed(
            "🗑️ Eliminada",
            &format!("'{}' fue eliminada de la cola.", removed.title()),
        ),
    )
    .await;
    Ok(())
}

async fn handle_clear(ctx: &Context, msg: &Message, bot: &MelodiaBot) -> Result<(), MusicError> {
    let session = require_session(msg, bot)?;
    {
        let mut session = session.session.lock().await;
        if session.queue_is_empty() {
            return Err(MusicError::EmptyQueue);
        }
        session.clear_queue();
    }

    send_embed(
        ctx,
        msg.channel_id,
        embeds::create_info_embed("🗑️ Limpiada", "Cola limpiada."),
    )
    .await;
    Ok(())
}

async fn handle_help(ctx: &Context, msg: &Message, bot: &MelodiaBot) -> Result<(), MusicError> {
    let prefix = &bot.config.command_prefix;
    let embed = embeds::create_info_embed(
        "📖 Comandos",
        &format!(
            "**Música**\n\
             `{p}play <URL o búsqueda>` - Reproduce una canción\n\
             `{p}skip` - Salta la canción actual\n\
             `{p}stop` - Detiene y limpia la cola\n\
             `{p}pause` / `{p}resume` - Pausa o reanuda\n\
             `{p}volume <0..1>` - Ajusta el volumen\n\
             `{p}queue` - Muestra la cola\n\
             `{p}nowplaying` - Canción actual\n\
             `{p}loop` - Activa/desactiva la repetición\n\
             `{p}shuffle` - Mezcla la cola\n\
             `{p}remove <n>` - Elimina la canción n\n\
             `{p}clear` - Vacía la cola\n\n\
             **Moderación**\n\
             `{p}kick <@usuario> [razón]` - Expulsa\n\
             `{p}ban <@usuario> [razón]` - Banea\n\
             `{p}mute <@usuario>` / `{p}unmute <@usuario>` - Silencia",
            p = prefix
        ),
    );

    send_embed(ctx, msg.channel_id, embed).await;
    Ok(())
}

// Funciones auxiliares

fn require_guild(msg: &Message) -> Result<GuildId, MusicError> {
    msg.guild_id.ok_or_else(|| {
        MusicError::Validation("Este comando solo funciona dentro de un servidor.".to_string())
    })
}

fn require_session(msg: &Message, bot: &MelodiaBot) -> Result<SessionHandle, MusicError> {
    let guild_id = require_guild(msg)?;
    bot.sessions.get(guild_id).ok_or_else(|| {
        MusicError::Validation("No hay una sesión de música activa.".to_string())
    })
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

async fn send_embed(ctx: &Context, channel_id: ChannelId, embed: CreateEmbed) {
    if let Err(e) = channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await
    {
        error!("No se pudo enviar el mensaje: {:?}", e);
    }
}
