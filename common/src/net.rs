//! Un mensaje por conexión: se conecta, se escribe el JSON, se cierra la
//! mitad de escritura y (opcionalmente) se lee la respuesta hasta EOF.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::ProtocolError;
use crate::message::Message;

async fn connect(addr: &str, limit: Duration) -> Result<TcpStream, ProtocolError> {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            Err(ProtocolError::ConnectionRefused {
                addr: addr.to_string(),
            })
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(ProtocolError::Timeout {
            addr: addr.to_string(),
            timeout: limit,
        }),
    }
}

async fn write_message(
    stream: &mut TcpStream,
    addr: &str,
    msg: &Message,
    limit: Duration,
) -> Result<(), ProtocolError> {
    let bytes = msg.to_vec()?;
    let write = async {
        stream.write_all(&bytes).await?;
        // cerrar la mitad de escritura marca el fin del mensaje
        stream.shutdown().await
    };

    match timeout(limit, write).await {
        Ok(res) => Ok(res?),
        Err(_) => Err(ProtocolError::Timeout {
            addr: addr.to_string(),
            timeout: limit,
        }),
    }
}

/// Envía un mensaje sin esperar respuesta.
pub async fn send_message(addr: &str, msg: &Message, limit: Duration) -> Result<(), ProtocolError> {
    let mut stream = connect(addr, limit).await?;
    write_message(&mut stream, addr, msg, limit).await
}

/// Envía un mensaje y espera la respuesta en la misma conexión.
/// Devuelve `None` si el otro extremo cerró sin responder.
pub async fn request(
    addr: &str,
    msg: &Message,
    limit: Duration,
) -> Result<Option<Message>, ProtocolError> {
    let mut stream = connect(addr, limit).await?;
    write_message(&mut stream, addr, msg, limit).await?;

    let mut buf = Vec::new();
    match timeout(limit, stream.read_to_end(&mut buf)).await {
        Ok(res) => {
            res?;
        }
        Err(_) => {
            return Err(ProtocolError::Timeout {
                addr: addr.to_string(),
                timeout: limit,
            })
        }
    }

    if buf.is_empty() {
        return Ok(None);
    }
    Message::from_slice(&buf).map(Some)
}

/// Escribe una respuesta sobre una conexión ya aceptada y la cierra.
pub async fn reply(stream: &mut TcpStream, msg: &Message, limit: Duration) -> Result<(), ProtocolError> {
    let addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".to_string());
    write_message(stream, &addr, msg, limit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const LIMIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn request_reads_reply_on_same_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            let msg = Message::from_slice(&buf).unwrap();
            reply(&mut stream, &Message::RegisterAck, LIMIT).await.unwrap();
            msg
        });

        let register = Message::Register {
            worker_host: "127.0.0.1".to_string(),
            worker_port: 7000,
        };
        let answer = request(&addr, &register, LIMIT).await.unwrap();

        assert_eq!(answer, Some(Message::RegisterAck));
        assert_eq!(server.await.unwrap(), register);
    }

    #[tokio::test]
    async fn send_to_closed_port_is_refused() {
        // reservamos un puerto y lo soltamos para que nadie escuche ahí
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = send_message(&addr, &Message::Shutdown, LIMIT).await.unwrap_err();
        assert!(err.is_unreachable(), "error inesperado: {:?}", err);
    }
}
