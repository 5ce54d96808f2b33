use thiserror::Error;

/// Errores de dominio del bot. Todos se capturan en el límite de comandos,
/// se convierten en un embed visible y se registran; ninguno tumba la sesión.
#[derive(Debug, Error)]
pub enum MusicError {
    /// La búsqueda o URL no pudo resolverse a un track reproducible.
    #[error("error de resolución: {0}")]
    Resolution(String),

    /// Se pidió el siguiente track de una cola vacía.
    #[error("la cola está vacía")]
    EmptyQueue,

    /// Posición de eliminación fuera de rango (cero-indexada internamente).
    #[error("posición {index} fuera de rango para una cola de {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// El recurso de salida rechazó la URL del track.
    #[error("fallo de reproducción: {0}")]
    Playback(String),

    /// El invocante no tiene el permiso requerido.
    #[error("permiso denegado")]
    PermissionDenied,

    /// Parámetro inválido (p. ej. volumen fuera de [0, 1]).
    #[error("validación: {0}")]
    Validation(String),

    /// La cola alcanzó su longitud máxima configurada.
    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),
}

impl MusicError {
    /// Mensaje dirigido al usuario. Los índices se presentan en base 1.
    pub fn user_message(&self) -> String {
        match self {
            Self::Resolution(msg) => msg.clone(),
            Self::EmptyQueue => "La cola está vacía.".to_string(),
            Self::IndexOutOfRange { len, .. } => format!(
                "Índice inválido. Ingresa un número válido entre 1 y {}.",
                len
            ),
            Self::Playback(title) => format!("Error reproduciendo: {}", title),
            Self::PermissionDenied => "No tienes permiso para usar este comando.".to_string(),
            Self::Validation(msg) => msg.clone(),
            Self::QueueFull(max) => {
                format!("La cola está llena (máximo {} canciones).", max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mensaje_de_rango_en_base_uno() {
        let err = MusicError::IndexOutOfRange { index: 5, len: 2 };
        assert_eq!(
            err.user_message(),
            "Índice inválido. Ingresa un número válido entre 1 y 2."
        );
    }

    #[test]
    fn mensaje_de_cola_llena_incluye_maximo() {
        let err = MusicError::QueueFull(10);
        assert!(err.user_message().contains("10"));
    }
}
