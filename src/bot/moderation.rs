use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serenity::{
    all::{Message, Permissions, User},
    builder::{CreateMessage, EditMember},
    model::id::UserId,
    prelude::Context,
};
use tracing::{info, warn};

use crate::{error::MusicError, ui::embeds};

/// Limitador de frecuencia de mensajes por usuario.
pub struct RateLimiter {
    last_message: DashMap<UserId, DateTime<Utc>>,
    min_interval: ChronoDuration,
}

impl RateLimiter {
    pub fn new(rate_per_second: f64) -> Self {
        let millis = (1000.0 / rate_per_second).round() as i64;
        Self {
            last_message: DashMap::new(),
            min_interval: ChronoDuration::milliseconds(millis),
        }
    }

    /// Registra el mensaje y retorna true si el usuario excede el límite.
    pub fn check(&self, user_id: UserId, now: DateTime<Utc>) -> bool {
        let too_fast = self
            .last_message
            .get(&user_id)
            .map(|last| now - *last < self.min_interval)
            .unwrap_or(false);

        self.last_message.insert(user_id, now);
        too_fast
    }
}

/// Coincidencia por substring contra la lista negra de URLs.
pub fn is_blacklisted(content: &str, blacklist: &[String]) -> bool {
    blacklist
        .iter()
        .any(|url| !url.is_empty() && content.contains(url.as_str()))
}

/// Filtro de moderación previo al despacho de comandos. Retorna true si el
/// mensaje fue removido (y no debe procesarse más).
pub async fn screen_message(
    ctx: &Context,
    msg: &Message,
    limiter: &RateLimiter,
    blacklist: &[String],
) -> Result<bool> {
    if limiter.check(msg.author.id, Utc::now()) {
        info!("🚫 Rate limit excedido por {}", msg.author.name);
        msg.delete(&ctx.http).await?;
        send_warning(
            ctx,
            msg,
            "Estás enviando mensajes demasiado rápido. Por favor, más despacio.",
        )
        .await;
        return Ok(true);
    }

    if is_blacklisted(&msg.content, blacklist) {
        info!("🚫 URL en lista negra enviada por {}", msg.author.name);
        msg.delete(&ctx.http).await?;
        send_warning(ctx, msg, "Ese enlace no está permitido en este servidor.").await;
        return Ok(true);
    }

    Ok(false)
}

/// Expulsa al usuario mencionado. Requiere KICK_MEMBERS.
pub async fn handle_kick(ctx: &Context, msg: &Message, args: &str) -> Result<(), MusicError> {
    require_permission(ctx, msg, Permissions::KICK_MEMBERS).await?;
    let (target, reason) = parse_target(msg, args)?;
    let guild_id = msg.guild_id.ok_or(MusicError::PermissionDenied)?;

    match guild_id
        .kick_with_reason(&ctx.http, target.id, reason.unwrap_or(""))
        .await
    {
        Ok(()) => {
            say(ctx, msg, format!("✅ <@{}> expulsado del servidor.", target.id)).await;
        }
        Err(e) => {
            warn!("No se pudo expulsar a {}: {}", target.id, e);
            send_warning(ctx, msg, "No tengo permisos para expulsar miembros.").await;
        }
    }

    Ok(())
}

/// Banea al usuario mencionado. Requiere BAN_MEMBERS.
pub async fn handle_ban(ctx: &Context, msg: &Message, args: &str) -> Result<(), MusicError> {
    require_permission(ctx, msg, Permissions::BAN_MEMBERS).await?;
    let (target, reason) = parse_target(msg, args)?;
    let guild_id = msg.guild_id.ok_or(MusicError::PermissionDenied)?;

    match guild_id
        .ban_with_reason(&ctx.http, target.id, 0, reason.unwrap_or(""))
        .await
    {
        Ok(()) => {
            say(ctx, msg, format!("✅ <@{}> baneado del servidor.", target.id)).await;
        }
        Err(e) => {
            warn!("No se pudo banear a {}: {}", target.id, e);
            send_warning(ctx, msg, "No tengo permisos para banear miembros.").await;
        }
    }

    Ok(())
}

/// Silencia al usuario mencionado en los canales de voz. Requiere
/// MANAGE_CHANNELS.
pub async fn handle_mute(ctx: &Context, msg: &Message, args: &str) -> Result<(), MusicError> {
    set_mute(ctx, msg, args, true).await
}

/// Quita el silencio al usuario mencionado. Requiere MANAGE_CHANNELS.
pub async fn handle_unmute(ctx: &Context, msg: &Message, args: &str) -> Result<(), MusicError> {
    set_mute(ctx, msg, args, false).await
}

async fn set_mute(
    ctx: &Context,
    msg: &Message,
    args: &str,
    mute: bool,
) -> Result<(), MusicError> {
    require_permission(ctx, msg, Permissions::MANAGE_CHANNELS).await?;
    let (target, _) = parse_target(msg, args)?;
    let guild_id = msg.guild_id.ok_or(MusicError::PermissionDenied)?;

    match guild_id
        .edit_member(&ctx.http, target.id, EditMember::new().mute(mute))
        .await
    {
        Ok(_) => {
            let action = if mute { "silenciado" } else { "des-silenciado" };
            say(ctx, msg, format!("✅ <@{}> {} en el servidor.", target.id, action)).await;
        }
        Err(e) => {
            warn!("No se pudo cambiar el mute de {}: {}", target.id, e);
            send_warning(ctx, msg, "No tengo permisos para silenciar miembros.").await;
        }
    }

    Ok(())
}

/// Verifica que el invocante tenga el permiso requerido en la guild.
async fn require_permission(
    ctx: &Context,
    msg: &Message,
    permission: Permissions,
) -> Result<(), MusicError> {
    let guild_id = msg.guild_id.ok_or(MusicError::PermissionDenied)?;

    let member = guild_id
        .member(&ctx.http, msg.author.id)
        .await
        .map_err(|_| MusicError::PermissionDenied)?;

    let permissions = {
        let guild = guild_id
            .to_guild_cached(&ctx.cache)
            .ok_or(MusicError::PermissionDenied)?;
        guild.member_permissions(&member)
    };

    if permissions.contains(permission) || permissions.contains(Permissions::ADMINISTRATOR) {
        Ok(())
    } else {
        Err(MusicError::PermissionDenied)
    }
}

fn parse_target<'a>(msg: &'a Message, args: &'a str) -> Result<(&'a User, Option<&'a str>), MusicError> {
    let target = msg.mentions.first().ok_or_else(|| {
        MusicError::Validation("Debes mencionar al usuario objetivo.".to_string())
    })?;

    // El primer token es la mención; el resto es la razón
    let reason = args
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .filter(|rest| !rest.is_empty());

    Ok((target, reason))
}

async fn send_warning(ctx: &Context, msg: &Message, warning: &str) {
    let embed = embeds::create_error_embed(warning);
    if let Err(e) = msg
        .channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await
    {
        warn!("No se pudo enviar la advertencia de moderación: {:?}", e);
    }
}

async fn say(ctx: &Context, msg: &Message, content: String) {
    if let Err(e) = msg.channel_id.say(&ctx.http, content).await {
        warn!("No se pudo enviar la confirmación de moderación: {:?}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mensajes_espaciados_pasan_el_limite() {
        let limiter = RateLimiter::new(1.0);
        let user = UserId::new(1);
        let base = Utc::now();

        assert!(!limiter.check(user, base));
        assert!(!limiter.check(user, base + ChronoDuration::seconds(2)));
    }

    #[test]
    fn mensajes_rapidos_exceden_el_limite() {
        let limiter = RateLimiter::new(1.0);
        let user = UserId::new(1);
        let base = Utc::now();

        assert!(!limiter.check(user, base));
        assert!(limiter.check(user, base + ChronoDuration::milliseconds(100)));
    }

    #[test]
    fn el_limite_es_por_usuario() {
        let limiter = RateLimiter::new(1.0);
        let base = Utc::now();

        assert!(!limiter.check(UserId::new(1), base));
        assert!(!limiter.check(UserId::new(2), base));
    }

    #[test]
    fn lista_negra_por_substring() {
        let blacklist = vec!["malicioso.example".to_string()];

        assert!(is_blacklisted(
            "mira esto https://malicioso.example/estafa",
            &blacklist
        ));
        assert!(!is_blacklisted("un mensaje normal", &blacklist));
        assert_eq!(is_blacklisted("lo que sea", &[]), false);
    }
}
