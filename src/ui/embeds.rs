use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::sources::Track;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Melodia";

/// Embed para una canción agregada a la cola.
pub fn create_song_embed(track: &Track) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", track.artist(), true)
        .field("⏱️ Duración", duration_label(track.duration()), true)
        .field("🔗 Fuente", track.provider().as_str(), true)
        .url(track.url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

/// Embed para la canción sonando ahora.
pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", track.artist(), true)
        .field("⏱️ Duración", duration_label(track.duration()), true)
        .field("🔗 Fuente", track.provider().as_str(), true)
        .url(track.url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed con el estado de la cola de reproducción.
pub fn create_queue_embed(
    current: Option<&Track>,
    tracks: &[Track],
    loop_enabled: bool,
) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if current.is_none() && tracks.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(track) = current {
        let status = if loop_enabled { "🔁" } else { "▶️" };
        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!("**{}** - {}", track.title(), track.artist()),
            false,
        );
    }

    const MAX_VISIBLE: usize = 10;
    for (position, track) in tracks.iter().take(MAX_VISIBLE).enumerate() {
        embed = embed.field(
            format!("{}. {}", position + 1, track.title()),
            format!("{} · {}", track.artist(), duration_label(track.duration())),
            false,
        );
    }

    if tracks.len() > MAX_VISIBLE {
        embed = embed.description(format!("... y {} canciones más", tracks.len() - MAX_VISIBLE));
    }

    embed
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Embed informativo breve (confirmaciones de comandos).
pub fn create_info_embed(title: &str, message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(message)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed de error visible para el usuario.
pub fn create_error_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(message)
        .color(colors::ERROR_RED)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn duration_label(duration: Option<Duration>) -> String {
    match duration {
        Some(duration) => format_duration(duration),
        None => "Desconocida".to_string(),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn formato_de_duracion() {
        assert_eq!(format_duration(Duration::from_secs(45)), "0:45");
        assert_eq!(format_duration(Duration::from_secs(200)), "3:20");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
    }

    #[test]
    fn duracion_desconocida() {
        assert_eq!(duration_label(None), "Desconocida");
    }
}
