use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ProtocolError;
use crate::job::JobRequest;
use crate::task::TaskId;
use crate::worker::WorkerId;

/* --------- Mensajes del canal de control y de heartbeats --------- */

/// Todos los mensajes viajan como JSON con un discriminador `message_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum Message {
    Register {
        worker_host: String,
        worker_port: u16,
    },
    RegisterAck,
    NewManagerJob(JobRequest),
    Finished {
        worker_host: String,
        worker_port: u16,
        task_id: TaskId,
    },
    NewMapTask(MapTaskMessage),
    NewReduceTask(ReduceTaskMessage),
    Heartbeat {
        worker_host: String,
        worker_port: u16,
    },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapTaskMessage {
    pub task_id: TaskId,
    pub input_paths: Vec<PathBuf>,
    pub executable: PathBuf,

    /// Directorio intermedio del job, donde el mapper deja sus particiones
    pub output_directory: PathBuf,
    pub num_partitions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceTaskMessage {
    pub task_id: TaskId,
    pub executable: PathBuf,
    pub input_paths: Vec<PathBuf>,
    pub output_directory: PathBuf,
}

impl Message {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Register { .. } => "register",
            Message::RegisterAck => "register_ack",
            Message::NewManagerJob(_) => "new_manager_job",
            Message::Finished { .. } => "finished",
            Message::NewMapTask(_) => "new_map_task",
            Message::NewReduceTask(_) => "new_reduce_task",
            Message::Heartbeat { .. } => "heartbeat",
            Message::Shutdown => "shutdown",
        }
    }

    /// Identidad del worker que envía el mensaje, si el mensaje la lleva
    pub fn sender(&self) -> Option<WorkerId> {
        match self {
            Message::Register {
                worker_host,
                worker_port,
            }
            | Message::Finished {
                worker_host,
                worker_port,
                ..
            }
            | Message::Heartbeat {
                worker_host,
                worker_port,
            } => Some(WorkerId::new(worker_host.clone(), *worker_port)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_register_from_worker_json() {
        let raw = br#"{"message_type": "register", "worker_host": "localhost", "worker_port": 6001}"#;
        let msg = Message::from_slice(raw).unwrap();

        assert_eq!(
            msg,
            Message::Register {
                worker_host: "localhost".to_string(),
                worker_port: 6001,
            }
        );
        assert_eq!(msg.sender(), Some(WorkerId::new("localhost", 6001)));
    }

    #[test]
    fn parses_new_manager_job() {
        let raw = br#"{
            "message_type": "new_manager_job",
            "input_directory": "tests/input",
            "output_directory": "output",
            "mapper_executable": "exec/wc_map.sh",
            "reducer_executable": "exec/wc_reduce.sh",
            "num_mappers": 2,
            "num_reducers": 3
        }"#;

        match Message::from_slice(raw).unwrap() {
            Message::NewManagerJob(req) => {
                assert_eq!(req.input_directory, PathBuf::from("tests/input"));
                assert_eq!(req.num_mappers, 2);
                assert_eq!(req.num_reducers, 3);
            }
            other => panic!("mensaje inesperado: {:?}", other),
        }
    }

    #[test]
    fn unit_variants_only_carry_the_discriminator() {
        let json: serde_json::Value =
            serde_json::from_slice(&Message::Shutdown.to_vec().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"message_type": "shutdown"}));

        let ack = Message::from_slice(br#"{"message_type":"register_ack"}"#).unwrap();
        assert_eq!(ack, Message::RegisterAck);
    }

    #[test]
    fn map_task_is_flat_on_the_wire() {
        let msg = Message::NewMapTask(MapTaskMessage {
            task_id: 1,
            input_paths: vec![PathBuf::from("in/f1"), PathBuf::from("in/f3")],
            executable: PathBuf::from("map.sh"),
            output_directory: PathBuf::from("/tmp/job"),
            num_partitions: 2,
        });

        let json: serde_json::Value = serde_json::from_slice(&msg.to_vec().unwrap()).unwrap();
        assert_eq!(json["message_type"], "new_map_task");
        assert_eq!(json["task_id"], 1);
        assert_eq!(json["input_paths"][1], "in/f3");
        assert_eq!(json["num_partitions"], 2);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(Message::from_slice(b"not json").is_err());
        assert!(Message::from_slice(br#"{"message_type": "dance"}"#).is_err());
        // falta worker_port
        assert!(Message::from_slice(br#"{"message_type": "register", "worker_host": "h"}"#).is_err());
    }
}
