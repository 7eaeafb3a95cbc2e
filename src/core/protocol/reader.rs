use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::ProtocolMessage;

/// Feed a collected output buffer into a bounded channel, one line per item.
/// `\r\n` endings are normalized; the trailing empty segment is dropped.
pub fn split_lines(output: Bytes, capacity: usize) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        for line in output.split(|b| *b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            if tx.send(line.to_vec()).await.is_err() {
                debug!("Line consumer hung up, stopping output split");
                break;
            }
        }
    });
    rx
}

/// Runs the wrapped release exactly once: explicitly, or when dropped.
struct Releaser<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Releaser<F> {
    fn release(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl<F: FnOnce()> Drop for Releaser<F> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Decode raw lines into protocol messages on a spawned task.
///
/// A line that fails to decode is logged and skipped; it never ends the
/// stream. When the input closes (or the consumer hangs up) `release` runs
/// exactly once and the output closes.
pub fn read_messages<F>(
    mut lines: mpsc::Receiver<Vec<u8>>,
    capacity: usize,
    release: F,
) -> mpsc::Receiver<ProtocolMessage>
where
    F: FnOnce() + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        let mut releaser = Releaser(Some(release));
        while let Some(line) = lines.recv().await {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<ProtocolMessage>(&line) {
                Ok(msg) => {
                    if tx.send(msg).await.is_err() {
                        debug!("Message consumer hung up, stopping protocol reader");
                        break;
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "Error decoding protocol message: {}",
                        String::from_utf8_lossy(&line)
                    );
                }
            }
        }
        releaser.release();
        drop(tx);
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::MessageType;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_release() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn drain<T>(mut rx: mpsc::Receiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn split_lines_handles_crlf_and_trailing_newline() {
        let rx = split_lines(Bytes::from_static(b"a\r\nb\n\nc\n"), 2);
        let lines = drain(rx).await;
        assert_eq!(lines, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[tokio::test]
    async fn emits_one_message_per_wellformed_line_in_order() {
        let output = Bytes::from_static(
            b"{\"type\":\"LOG\",\"log\":{\"message\":\"starting\"}}\n\
              not json at all\n\
              {\"type\":\"RECORD\",\"record\":{\"schema_name\":\"users\",\"data\":{}}}\n\
              {\"type\":\"BOGUS\"}\n\
              {\"type\":\"STATE\"}\n",
        );
        let (count, release) = counting_release();
        let messages = drain(read_messages(split_lines(output, 1), 1, release)).await;

        let kinds: Vec<MessageType> = messages.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![MessageType::Log, MessageType::Record, MessageType::State]
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn releases_exactly_once_on_empty_input() {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(1);
        drop(tx);
        let (count, release) = counting_release();
        let messages = drain(read_messages(rx, 4, release)).await;
        assert!(messages.is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn releases_once_when_consumer_hangs_up() {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(8);
        let (count, release) = counting_release();
        let out = read_messages(rx, 1, release);
        drop(out);

        for _ in 0..4 {
            let line = br#"{"type":"STATE"}"#.to_vec();
            if tx.send(line).await.is_err() {
                break;
            }
        }
        drop(tx);

        for _ in 0..50 {
            if count.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_malformed_input_yields_nothing_but_still_releases() {
        let output = Bytes::from_static(b"{oops\n[1,2,3]\n\"str\"\n");
        let (count, release) = counting_release();
        let messages = drain(read_messages(split_lines(output, 4), 4, release)).await;
        assert!(messages.is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
