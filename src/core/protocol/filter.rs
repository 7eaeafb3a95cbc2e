use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{MessageType, ProtocolMessage, Record};

/// Narrow a message stream to data-bearing records.
///
/// The output channel holds at most one record, so a slow consumer blocks the
/// upstream reader instead of anything being dropped. The output closes only
/// when the input does (or the consumer goes away).
pub fn read_records(mut messages: mpsc::Receiver<ProtocolMessage>) -> mpsc::Receiver<Record> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        while let Some(msg) = messages.recv().await {
            match msg {
                ProtocolMessage {
                    kind: MessageType::Record,
                    record: Some(record),
                    ..
                } => {
                    if tx.send(record).await.is_err() {
                        debug!("Record consumer hung up, stopping record filter");
                        break;
                    }
                }
                ProtocolMessage {
                    kind: MessageType::Record,
                    record: None,
                    ..
                } => {
                    warn!("Dropping RECORD message without a record payload");
                }
                other => {
                    debug!("Message type is not record: {}", other.kind.as_str());
                }
            }
        }
    });
    rx
}
