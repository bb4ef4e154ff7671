//! JSON-lines transport.
//!
//! Each non-blank line is `{"source_id", "source_name", "event_id", "text"}`.
//! The arrival time is stamped here from the clock.

use std::sync::Arc;

use common::RawMessage;
use serde::Deserialize;
use streak_engine::Clock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::warn;

#[derive(Debug, Deserialize)]
struct InboundLine {
    source_id: String,
    #[serde(default)]
    source_name: String,
    #[serde(default)]
    event_id: Option<i64>,
    text: String,
}

pub struct LineTransport<R> {
    lines: Lines<R>,
    clock: Arc<dyn Clock>,
    line_no: u64,
    malformed: u64,
}

impl<R: AsyncBufRead + Unpin> LineTransport<R> {
    pub fn new(reader: R, clock: Arc<dyn Clock>) -> Self {
        Self {
            lines: reader.lines(),
            clock,
            line_no: 0,
            malformed: 0,
        }
    }

    /// Next message, or `None` at end of input. Blank and malformed lines
    /// are skipped.
    pub async fn next_message(&mut self) -> std::io::Result<Option<RawMessage>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<InboundLine>(line) {
                Ok(inbound) => {
                    return Ok(Some(RawMessage {
                        text: inbound.text,
                        source_id: inbound.source_id,
                        source_name: inbound.source_name,
                        event_id: inbound.event_id,
                        received_at: self.clock.now(),
                    }));
                }
                Err(e) => {
                    self.malformed += 1;
                    warn!("line {}: not a transport message: {}", self.line_no, e);
                }
            }
        }
        Ok(None)
    }

    /// Lines skipped because they were not valid messages.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}
