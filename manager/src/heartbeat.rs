use std::time::Instant;

use common::Message;
use tokio::{net::UdpSocket, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::scheduler::ManagerEvent;

const MAX_DATAGRAM: usize = 4096;

/// Escucha heartbeats por UDP. Nunca responde; los workers desconocidos se
/// descartan en el registro.
pub async fn run_heartbeat_listener(
    socket: UdpSocket,
    events: mpsc::Sender<ManagerEvent>,
    shutdown: CancellationToken,
) {
    if let Ok(addr) = socket.local_addr() {
        info!("heartbeats escuchando en {}", addr);
    }
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let (len, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(r) => r,
                Err(e) => {
                    warn!("error recibiendo heartbeat: {}", e);
                    continue;
                }
            },
        };

        match Message::from_slice(&buf[..len]) {
            Ok(msg @ Message::Heartbeat { .. }) => {
                let Some(worker) = msg.sender() else {
                    continue;
                };
                let event = ManagerEvent::Heartbeat {
                    worker,
                    at: Instant::now(),
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Ok(other) => debug!("mensaje {} de {} ignorado en el canal de heartbeats", other.kind(), peer),
            Err(e) => warn!("heartbeat inválido de {}: {}", peer, e),
        }
    }

    info!("listener de heartbeats detenido");
}
