use futures::{Sink, SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::dispatcher::DispatcherHandle;
use crate::error::BridgeError;
use crate::protocol::{decode_frame, encode_outbound};
use crate::types::OutboundEvent;

enum Exit {
    Shutdown,
    Disconnected(String),
}

/// Websocket connection to the backend push channel.
///
/// Inbound frames are decoded and queued on the dispatcher. Outbound events
/// wait in their channel while the link is down and go out on reconnect.
pub struct BackendLink {
    url: String,
    reconnect: Duration,
}

impl BackendLink {
    pub fn new(url: impl Into<String>, reconnect: Duration) -> Self {
        Self {
            url: url.into(),
            reconnect,
        }
    }

    pub async fn run(self, dispatcher: DispatcherHandle, mut outbound: mpsc::UnboundedReceiver<OutboundEvent>) {
        // A frame that failed to send is resent first after reconnecting.
        let mut unsent: Option<String> = None;

        loop {
            match connect_async(self.url.as_str()).await {
                Ok((socket, _)) => {
                    info!("Connected to backend at {}", self.url);
                    let (sink, source) = socket.split();
                    match pump(sink, source, &dispatcher, &mut outbound, &mut unsent).await {
                        Exit::Shutdown => break,
                        Exit::Disconnected(reason) => warn!("Backend link dropped: {}", reason),
                    }
                }
                Err(e) => warn!("Could not reach backend at {}: {}", self.url, e),
            }

            if dispatcher.is_closed() {
                break;
            }
            tokio::time::sleep(self.reconnect).await;
        }
        info!("Backend link stopped");
    }
}

async fn pump<W, R>(
    mut sink: W,
    mut source: R,
    dispatcher: &DispatcherHandle,
    outbound: &mut mpsc::UnboundedReceiver<OutboundEvent>,
    unsent: &mut Option<String>,
) -> Exit
where
    W: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    if let Some(frame) = unsent.take() {
        if let Err(e) = sink.send(Message::Text(frame.clone().into())).await {
            *unsent = Some(frame);
            return Exit::Disconnected(e.to_string());
        }
    }

    loop {
        tokio::select! {
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if route_frame(text.as_str(), dispatcher).is_err() {
                        return Exit::Shutdown;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Exit::Disconnected("closed by backend".into());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Exit::Disconnected(e.to_string()),
            },
            event = outbound.recv() => {
                let Some(event) = event else {
                    let _ = sink.close().await;
                    return Exit::Shutdown;
                };
                let frame = encode_outbound(&event);
                debug!("-> {}", frame.chars().take(120).collect::<String>());
                if let Err(e) = sink.send(Message::Text(frame.clone().into())).await {
                    *unsent = Some(frame);
                    return Exit::Disconnected(e.to_string());
                }
            }
        }
    }
}

/// Decode one inbound frame and queue it. Undecodable frames are logged and
/// dropped; only a closed dispatcher is an error.
pub fn route_frame(text: &str, dispatcher: &DispatcherHandle) -> Result<(), BridgeError> {
    match decode_frame(text) {
        Ok(command) => {
            debug!("<- {} for {}", command.kind(), command.work_id());
            dispatcher.submit(command)
        }
        Err(e) => {
            warn!("Dropping backend frame: {}", e);
            Ok(())
        }
    }
}
