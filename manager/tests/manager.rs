use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use common::{net, JobRequest, Message, WorkerId};
use manager::{Manager, ManagerConfig};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);
const IO: Duration = Duration::from_secs(1);

/// Worker de mentira: escucha tareas en un puerto propio
struct FakeWorker {
    listener: TcpListener,
    id: WorkerId,
}

impl FakeWorker {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let id = WorkerId::new("127.0.0.1", listener.local_addr().unwrap().port());
        Self { listener, id }
    }

    async fn register(&self, manager: SocketAddr) -> Option<Message> {
        let msg = Message::Register {
            worker_host: self.id.host.clone(),
            worker_port: self.id.port,
        };
        net::request(&manager.to_string(), &msg, IO).await.unwrap()
    }

    async fn heartbeat(&self, manager: SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let msg = Message::Heartbeat {
            worker_host: self.id.host.clone(),
            worker_port: self.id.port,
        };
        socket.send_to(&msg.to_vec().unwrap(), manager).await.unwrap();
    }

    async fn next_message(&self) -> Message {
        timeout(WAIT, async {
            let (mut stream, _) = self.listener.accept().await.unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.unwrap();
            Message::from_slice(&buf).unwrap()
        })
        .await
        .expect("el worker no recibió ningún mensaje")
    }

    async fn finish(&self, manager: SocketAddr, task_id: u32) {
        let msg = Message::Finished {
            worker_host: self.id.host.clone(),
            worker_port: self.id.port,
            task_id,
        };
        net::send_message(&manager.to_string(), &msg, IO).await.unwrap();
    }
}

struct Cluster {
    root: tempfile::TempDir,
    addr: SocketAddr,
    token: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Cluster {
    async fn start(configure: impl FnOnce(&mut ManagerConfig)) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config =
            ManagerConfig::new("127.0.0.1", 0).with_shared_dir(root.path().join("shared"));
        config.io_timeout = IO;
        configure(&mut config);

        let manager = Manager::bind(config).await.unwrap();
        let addr = manager.local_addr().unwrap();
        let token = manager.shutdown_token();
        let handle = tokio::spawn(manager.run());
        Self {
            root,
            addr,
            token,
            handle,
        }
    }

    fn input_dir(&self, files: &[&str]) -> PathBuf {
        let input = self.root.path().join("input");
        fs::create_dir_all(&input).unwrap();
        for name in files {
            fs::write(input.join(name), format!("contenido de {}\n", name)).unwrap();
        }
        input
    }

    async fn submit(&self, input: &Path, mappers: u32, reducers: u32) -> PathBuf {
        let output = self.root.path().join("output");
        let job = Message::NewManagerJob(JobRequest {
            input_directory: input.to_path_buf(),
            output_directory: output.clone(),
            mapper_executable: "map.sh".into(),
            reducer_executable: "reduce.sh".into(),
            num_mappers: mappers,
            num_reducers: reducers,
        });
        net::send_message(&self.addr.to_string(), &job, IO).await.unwrap();
        output
    }

    async fn shutdown(self) {
        net::send_message(&self.addr.to_string(), &Message::Shutdown, IO)
            .await
            .unwrap();
        timeout(WAIT, self.handle)
            .await
            .expect("el manager no terminó tras el shutdown")
            .unwrap()
            .unwrap();
    }
}

fn names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect()
}

#[tokio::test]
async fn runs_a_job_through_map_and_reduce() {
    let cluster = Cluster::start(|_| {}).await;
    let worker = FakeWorker::start().await;
    assert_eq!(worker.register(cluster.addr).await, Some(Message::RegisterAck));

    let input = cluster.input_dir(&["f0", "f1", "f2"]);
    let output = cluster.submit(&input, 2, 2).await;

    // etapa map: un único worker recibe las dos tareas en orden
    let mut workdir = None;
    let mut map_inputs = Vec::new();
    for expected in 0..2 {
        let m = match worker.next_message().await {
            Message::NewMapTask(m) => m,
            other => panic!("esperaba new_map_task, llegó {:?}", other),
        };
        assert_eq!(m.task_id, expected);
        assert_eq!(m.num_partitions, 2);
        assert_eq!(m.executable, PathBuf::from("map.sh"));
        map_inputs.push(names(&m.input_paths));

        for p in 0..m.num_partitions {
            let name = format!("maptask{:05}-part{:05}", m.task_id, p);
            fs::write(m.output_directory.join(name), "palabra\t1\n").unwrap();
        }
        workdir = Some(m.output_directory.clone());
        worker.finish(cluster.addr, m.task_id).await;
    }
    assert_eq!(map_inputs, vec![vec!["f0", "f2"], vec!["f1"]]);
    let workdir = workdir.unwrap();

    // etapa reduce
    for expected in 0..2u32 {
        let r = match worker.next_message().await {
            Message::NewReduceTask(r) => r,
            other => panic!("esperaba new_reduce_task, llegó {:?}", other),
        };
        assert_eq!(r.task_id, expected);
        assert_eq!(r.output_directory, output);
        assert_eq!(
            names(&r.input_paths),
            vec![
                format!("maptask00000-part{:05}", expected),
                format!("maptask00001-part{:05}", expected),
            ]
        );
        fs::write(r.output_directory.join(format!("part-{:05}", r.task_id)), "ok\n").unwrap();
        worker.finish(cluster.addr, r.task_id).await;
    }

    // al terminar el job se borra el directorio intermedio
    timeout(WAIT, async {
        while workdir.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("el directorio intermedio no se borró");
    assert!(output.join("part-00000").exists());

    cluster.shutdown().await;
    assert_eq!(worker.next_message().await, Message::Shutdown);
}

#[tokio::test]
async fn silent_worker_loses_its_task_to_another() {
    let cluster = Cluster::start(|config| {
        config.heartbeat_timeout = Duration::from_millis(500);
    })
    .await;

    let flaky = FakeWorker::start().await;
    let steady = FakeWorker::start().await;
    flaky.register(cluster.addr).await;
    flaky.heartbeat(cluster.addr).await;
    steady.register(cluster.addr).await;

    let input = cluster.input_dir(&["a", "b", "c"]);
    cluster.submit(&input, 1, 1).await;

    let first = match flaky.next_message().await {
        Message::NewMapTask(m) => m,
        other => panic!("mensaje inesperado: {:?}", other),
    };
    // flaky no vuelve a mandar heartbeats ni termina la tarea

    let retry = match steady.next_message().await {
        Message::NewMapTask(m) => m,
        other => panic!("mensaje inesperado: {:?}", other),
    };
    assert_eq!(retry.task_id, first.task_id);
    assert_eq!(retry.input_paths, first.input_paths);

    // un finished tardío de flaky no cuenta: el job sigue esperando a steady
    flaky.finish(cluster.addr, first.task_id).await;
    steady.finish(cluster.addr, retry.task_id).await;
    match steady.next_message().await {
        Message::NewReduceTask(r) => assert_eq!(r.task_id, 0),
        other => panic!("mensaje inesperado: {:?}", other),
    }

    cluster.shutdown().await;
    assert_eq!(steady.next_message().await, Message::Shutdown);
}

#[tokio::test]
async fn shutdown_reaches_live_workers_even_if_some_are_gone() {
    let cluster = Cluster::start(|_| {}).await;

    let alive = FakeWorker::start().await;
    let gone = FakeWorker::start().await;
    alive.register(cluster.addr).await;
    gone.register(cluster.addr).await;
    drop(gone);

    cluster.shutdown().await;
    assert_eq!(alive.next_message().await, Message::Shutdown);
}

#[tokio::test]
async fn malformed_messages_get_no_reply() {
    let cluster = Cluster::start(|_| {}).await;

    let mut stream = TcpStream::connect(cluster.addr).await.unwrap();
    stream.write_all(b"{not json").await.unwrap();
    stream.shutdown().await.unwrap();
    let mut reply = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert!(reply.is_empty());

    // el manager sigue atendiendo
    let worker = FakeWorker::start().await;
    assert_eq!(worker.register(cluster.addr).await, Some(Message::RegisterAck));

    cluster.shutdown().await;
}

#[tokio::test]
async fn shutdown_while_a_reduce_task_is_held() {
    let cluster = Cluster::start(|_| {}).await;
    let worker = FakeWorker::start().await;
    worker.register(cluster.addr).await;

    let input = cluster.input_dir(&["f0"]);
    cluster.submit(&input, 1, 1).await;

    let m = match worker.next_message().await {
        Message::NewMapTask(m) => m,
        other => panic!("esperaba new_map_task, llegó {:?}", other),
    };
    fs::write(m.output_directory.join("maptask00000-part00000"), "k\t1\n").unwrap();
    worker.finish(cluster.addr, m.task_id).await;

    // el worker se queda con la tarea reduce sin terminarla
    match worker.next_message().await {
        Message::NewReduceTask(r) => assert_eq!(r.task_id, 0),
        other => panic!("esperaba new_reduce_task, llegó {:?}", other),
    }

    cluster.shutdown().await;
    assert_eq!(worker.next_message().await, Message::Shutdown);
}

#[tokio::test]
async fn cancelling_the_token_stops_the_manager_quietly() {
    let cluster = Cluster::start(|_| {}).await;
    let worker = FakeWorker::start().await;
    worker.register(cluster.addr).await;

    cluster.token.cancel();
    timeout(WAIT, cluster.handle)
        .await
        .expect("el manager no terminó al cancelar")
        .unwrap()
        .unwrap();

    // nadie le avisa al worker
    let quiet = timeout(Duration::from_millis(300), worker.listener.accept()).await;
    assert!(quiet.is_err());
}
