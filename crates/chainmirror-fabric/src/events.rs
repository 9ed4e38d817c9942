//! WebSocket event subscription.
//!
//! Each text frame is either a chain event
//! (`{"eventName", "blockNumber", "payload": <base64>}`) or an error report
//! (`{"error": "..."}`), after which the gateway closes the socket.

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use chainmirror_core::{ChainEvent, ChainEventStream, FaultCode, LedgerFault};

#[derive(Deserialize)]
#[serde(untagged)]
enum Frame {
    Error { error: String },
    Event(ChainEvent),
}

/// Decode one text frame.
pub fn parse_frame(text: &str) -> Result<ChainEvent, LedgerFault> {
    match serde_json::from_str::<Frame>(text) {
        Ok(Frame::Event(event)) => Ok(event),
        Ok(Frame::Error { error }) => Err(LedgerFault::new(FaultCode::Unavailable, error)),
        Err(e) => Err(LedgerFault::new(
            FaultCode::Unknown,
            format!("malformed event frame: {e}"),
        )),
    }
}

/// Open the socket and turn it into a chain event stream.
///
/// The stream ends when the gateway closes the connection; transport errors
/// are yielded as items.
pub async fn connect(url: Url) -> Result<ChainEventStream, LedgerFault> {
    tracing::info!(url = %url, "connecting to event stream");
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| LedgerFault::new(FaultCode::Unavailable, format!("event stream connect: {e}")))?;

    let events = stream::unfold(ws, |mut ws| async move {
        loop {
            match ws.next().await? {
                Ok(Message::Text(text)) => return Some((parse_frame(text.as_str()), ws)),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => {
                    let fault = LedgerFault::new(FaultCode::Unavailable, e.to_string());
                    return Some((Err(fault), ws));
                }
            }
        }
    });
    Ok(events.boxed())
}
