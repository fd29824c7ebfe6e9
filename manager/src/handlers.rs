use std::time::Duration;

use common::{net, Message};
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream},
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::scheduler::ManagerEvent;

/// Canal de control: una conexión por mensaje. Cada conexión se atiende en
/// su propia tarea para que un cliente lento no frene al resto.
pub async fn run_control_listener(
    listener: TcpListener,
    events: mpsc::Sender<ManagerEvent>,
    shutdown: CancellationToken,
    io_timeout: Duration,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("canal de control escuchando en {}", addr);
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("conexión desde {}", peer);
                    tokio::spawn(handle_connection(
                        stream,
                        events.clone(),
                        shutdown.clone(),
                        io_timeout,
                    ));
                }
                Err(e) => warn!("error aceptando conexión: {}", e),
            },
        }
    }

    info!("canal de control cerrado");
}

/// Lee hasta EOF. Cada lectura tiene timeout; al vencer se vuelve a
/// chequear el apagado y se reintenta.
async fn read_message(
    stream: &mut TcpStream,
    io_timeout: Duration,
    shutdown: &CancellationToken,
) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        if shutdown.is_cancelled() {
            return None;
        }
        match timeout(io_timeout, stream.read(&mut chunk)).await {
            Err(_) => continue,
            Ok(Ok(0)) => return Some(buf),
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => {
                warn!("error leyendo del canal de control: {}", e);
                return None;
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    events: mpsc::Sender<ManagerEvent>,
    shutdown: CancellationToken,
    io_timeout: Duration,
) {
    let Some(bytes) = read_message(&mut stream, io_timeout, &shutdown).await else {
        return;
    };

    let msg = match Message::from_slice(&bytes) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("mensaje inválido ignorado ({}): {}", e, String::from_utf8_lossy(&bytes));
            return;
        }
    };
    debug!("mensaje recibido: {:?}", msg);

    match msg {
        Message::Register { .. } => {
            let Some(worker) = msg.sender() else {
                return;
            };
            let (ack_tx, ack_rx) = oneshot::channel();
            if events
                .send(ManagerEvent::Register { worker: worker.clone(), ack: ack_tx })
                .await
                .is_err()
                || ack_rx.await.is_err()
            {
                return;
            }

            // best-effort: si falla la respuesta el registro queda igual
            match net::reply(&mut stream, &Message::RegisterAck, io_timeout).await {
                Ok(()) => debug!("register_ack enviado a {}", worker),
                Err(e) => warn!("no se pudo mandar register_ack a {}: {}", worker, e),
            }
        }
        Message::NewManagerJob(request) => {
            let _ = events.send(ManagerEvent::NewJob(request)).await;
        }
        Message::Finished { task_id, .. } => {
            if let Some(worker) = msg.sender() {
                let _ = events.send(ManagerEvent::Finished { worker, task_id }).await;
            }
        }
        Message::Shutdown => {
            info!("shutdown recibido");
            let (done_tx, done_rx) = oneshot::channel();
            if events.send(ManagerEvent::Shutdown { done: done_tx }).await.is_ok() {
                let _ = done_rx.await;
            }
            // por si el scheduler ya no estaba
            shutdown.cancel();
        }
        other => warn!("mensaje {} no esperado en el canal de control", other.kind()),
    }
}
