use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// El destino rechazó la conexión: el proceso ya no está escuchando
    #[error("conexión rechazada por {addr}")]
    ConnectionRefused { addr: String },

    #[error("timeout de {timeout:?} hablando con {addr}")]
    Timeout { addr: String, timeout: Duration },

    #[error("mensaje inválido: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("error de E/S: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// true si el otro extremo no está (rechazo o timeout al conectar)
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ProtocolError::ConnectionRefused { .. } | ProtocolError::Timeout { .. }
        )
    }
}
