//! The outbound half of a connection: drains a FIFO write queue through
//! flood protection, and emits a keepalive `PING` when the queue has been
//! empty for longer than the configured interval.
//!
//! Per the explicit precedence rule: if the write queue is non-empty, it is
//! always drained before a keepalive line is considered, so a busy
//! connection never has a `PING` queue-jump a pending write.

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::conn::flood::FloodProtector;

pub fn write_channel(capacity: usize) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
    mpsc::channel(capacity)
}

/// Runs the pump loop against `writer` until the channel closes or a write
/// fails. `network_id` is used as the keepalive `PING` token.
pub async fn run<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<String>,
    mut flood: FloodProtector,
    network_id: &str,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    loop {
        let next = tokio::time::timeout(flood.keepalive_interval(), rx.recv()).await;

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(_elapsed) => format!("PING :{network_id}"),
        };

        flood.throttle().await;

        let mut line = line;
        if !line.ends_with('\n') {
            line.push_str("\r\n");
        }
        if writer.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::flood::FloodParams;
    use std::time::Duration;

    #[tokio::test]
    async fn appends_missing_crlf() {
        let mut out = Vec::new();
        let (tx, rx) = write_channel(4);
        tx.send("PRIVMSG #chan :hi".to_owned()).await.unwrap();
        drop(tx);
        let flood = FloodProtector::new(FloodParams {
            scale: 0.0,
            ..FloodParams::default()
        });
        run(&mut out, rx, flood, "net1").await;
        assert_eq!(out, b"PRIVMSG #chan :hi\r\n");
    }

    #[tokio::test]
    async fn emits_keepalive_when_idle() {
        let mut out = Vec::new();
        let (_tx, rx) = write_channel(4);
        let flood = FloodProtector::new(FloodParams {
            keepalive_interval: Duration::from_millis(10),
            scale: 1.0,
            ..FloodParams::default()
        });
        let result = tokio::time::timeout(Duration::from_millis(200), run(&mut out, rx, flood, "net1")).await;
        assert!(result.is_err(), "run() should loop forever on an open channel");
        assert!(String::from_utf8_lossy(&out).contains("PING :net1"));
    }
}
