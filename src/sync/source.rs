//! Line source
//!
//! A reader task splits any byte stream on `\n` and forwards each line over
//! an unbounded channel. The channel closing is the end-of-input signal.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Spawn a task reading lines from `reader`.
///
/// Invalid UTF-8 is replaced rather than rejected. The task ends at EOF, on
/// a read error, or when the receiver is dropped; it returns the line count.
pub fn spawn_line_reader<R>(reader: R) -> (mpsc::UnboundedReceiver<String>, JoinHandle<u64>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut count = 0u64;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    count += 1;
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Line source read failed");
                    break;
                }
            }
        }
        debug!(lines = count, "Line source closed");
        count
    });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_all_lines() {
        let input: &[u8] = b"first\r\nsecond\nlast without newline";
        let (mut rx, handle) = spawn_line_reader(input);

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        assert_eq!(lines, vec!["first", "second", "last without newline"]);
        assert_eq!(handle.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let input: &[u8] = b"ok\n\xff\xfe bad\n";
        let (mut rx, _handle) = spawn_line_reader(input);

        assert_eq!(rx.recv().await.as_deref(), Some("ok"));
        let bad = rx.recv().await.unwrap();
        assert!(bad.ends_with(" bad"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_input_closes() {
        let (mut rx, handle) = spawn_line_reader(tokio::io::empty());
        assert!(rx.recv().await.is_none());
        assert_eq!(handle.await.unwrap(), 0);
    }
}
