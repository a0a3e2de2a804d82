//! The inbound half of a connection: reads bytes, splits on `\r\n`, and
//! emits complete lines to a bounded channel for the network's supervising
//! task to parse.

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

const READ_CHUNK: usize = 4096;
const LINE_CHANNEL_CAPACITY: usize = 256;

/// Runs the siphon loop against `reader` until EOF or error, sending each
/// complete line (without its `\r\n`) to `tx`. Returns when the transport
/// closes or the channel's receiver is dropped (cancellation).
pub async fn run<R>(mut reader: R, tx: mpsc::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        buf.extend_from_slice(&chunk[..n]);

        loop {
            let Some(pos) = find_crlf(&buf) else { break };
            let line = String::from_utf8_lossy(&buf[..pos]).into_owned();
            buf.drain(..pos + 2);
            if tx.send(line).await.is_err() {
                return;
            }
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

pub fn line_channel() -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
    mpsc::channel(LINE_CHANNEL_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn splits_complete_lines_and_keeps_partial_tail() {
        let data = b"PING :one\r\nPING :two\r\nPING :partial".to_vec();
        let (tx, mut rx) = line_channel();
        run(Cursor::new(data), tx).await;

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        assert_eq!(lines, vec!["PING :one".to_owned(), "PING :two".to_owned()]);
    }

    #[tokio::test]
    async fn empty_input_produces_no_lines() {
        let (tx, mut rx) = line_channel();
        run(Cursor::new(Vec::new()), tx).await;
        assert!(rx.try_recv().is_err());
    }
}
