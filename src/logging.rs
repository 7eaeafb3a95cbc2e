use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Lines kept for slow `/api/logs` subscribers before they see a lag marker.
const LOG_BUFFER: usize = 500;

/// Writes every formatted log line to stdout and to a broadcast channel.
#[derive(Clone)]
pub(crate) struct BroadcastMakeWriter {
    pub sender: broadcast::Sender<String>,
    pub suppress_stdout: bool,
}

impl<'a> MakeWriter<'a> for BroadcastMakeWriter {
    type Writer = BroadcastWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BroadcastWriter {
            sender: self.sender.clone(),
            suppress_stdout: self.suppress_stdout,
        }
    }
}

pub(crate) struct BroadcastWriter {
    sender: broadcast::Sender<String>,
    suppress_stdout: bool,
}

impl std::io::Write for BroadcastWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = String::from_utf8_lossy(buf).to_string();
        let _ = self.sender.send(msg); // no receivers is fine
        if !self.suppress_stdout {
            std::io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.suppress_stdout {
            std::io::stdout().flush()?;
        }
        Ok(())
    }
}

/// Install the global subscriber. `RUST_LOG` picks the filter, `info` when
/// unset. Returns the sender the log tail endpoint subscribes to.
pub(crate) fn init(suppress_stdout: bool) -> broadcast::Sender<String> {
    let (log_tx, _) = broadcast::channel::<String>(LOG_BUFFER);
    let make_writer = BroadcastMakeWriter {
        sender: log_tx.clone(),
        suppress_stdout,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    // Already set when the worker restarts inside one process.
    tracing::subscriber::set_global_default(subscriber).ok();
    log_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn lines_reach_subscribers() {
        let (tx, mut rx) = broadcast::channel(4);
        let make_writer = BroadcastMakeWriter {
            sender: tx,
            suppress_stdout: true,
        };
        let mut writer = make_writer.make_writer();
        writer.write_all(b"worker ready\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(rx.try_recv().unwrap(), "worker ready\n");
    }

    #[test]
    fn writing_without_subscribers_succeeds() {
        let (tx, rx) = broadcast::channel::<String>(4);
        drop(rx);
        let make_writer = BroadcastMakeWriter {
            sender: tx,
            suppress_stdout: true,
        };
        assert_eq!(make_writer.make_writer().write(b"dropped").unwrap(), 7);
    }
}
