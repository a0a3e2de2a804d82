//! The connection engine: per-network transport lifecycle, spawning the
//! siphon (inbound) and pump (outbound) tasks and exposing a `Writer`
//! handle that enqueues onto the pump.

pub mod flood;
pub mod pump;
pub mod siphon;
pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::split;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use corvus_interface::{WriteError, Writer};

use crate::conn::flood::{FloodParams, FloodProtector};
use crate::conn::transport::{connect, HostSpec, Transport};
use crate::error::NetworkError;

const WRITE_QUEUE_CAPACITY: usize = 256;

/// Handle to one live connection's I/O tasks: the write-queue sender the
/// `Writer` enqueues onto, the line receiver the supervising task reads
/// from, and a one-shot close flag.
pub struct Connection {
    write_tx: mpsc::Sender<String>,
    pub line_rx: mpsc::Receiver<String>,
    closed: Arc<AtomicBool>,
    pump_task: JoinHandle<()>,
    siphon_task: JoinHandle<()>,
}

impl Connection {
    /// Connects to `spec`, then spawns the pump and siphon tasks.
    pub async fn open(spec: &HostSpec, network_id: String, flood_params: FloodParams) -> Result<Connection, NetworkError> {
        let transport: Transport = connect(spec).await?;
        let (reader, writer) = split(transport);

        let (write_tx, write_rx) = pump::write_channel(WRITE_QUEUE_CAPACITY);
        let (line_tx, line_rx) = siphon::line_channel();

        let flood = FloodProtector::new(flood_params);
        let pump_network_id = network_id.clone();
        let pump_task = tokio::spawn(async move {
            pump::run(writer, write_rx, flood, &pump_network_id).await;
        });
        let siphon_task = tokio::spawn(async move {
            siphon::run(reader, line_tx).await;
        });

        Ok(Connection {
            write_tx,
            line_rx,
            closed: Arc::new(AtomicBool::new(false)),
            pump_task,
            siphon_task,
        })
    }

    pub fn writer_handle(&self) -> ConnectionWriter {
        ConnectionWriter {
            write_tx: self.write_tx.clone(),
            closed: self.closed.clone(),
        }
    }

    /// Idempotently closes the connection: aborts both tasks so pending
    /// socket I/O is interrupted, and marks subsequent writes as failing.
    pub fn close(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pump_task.abort();
        self.siphon_task.abort();
    }
}

/// The per-connection [`Writer`] implementation: enqueues sanitized lines
/// onto the pump's write queue. Cheap to clone; every clone shares the same
/// underlying queue and closed flag.
#[derive(Clone)]
pub struct ConnectionWriter {
    write_tx: mpsc::Sender<String>,
    closed: Arc<AtomicBool>,
}

impl Writer for ConnectionWriter {
    fn raw(&self, _network_id: &str, line: String) -> Result<(), WriteError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WriteError::Closed);
        }
        let line = corvus_interface::line::sanitize(line);
        self.write_tx.try_send(line).map_err(|_| WriteError::Closed)
    }
}
