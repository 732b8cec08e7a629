//! Listens on the backend websocket for results that are pushed independently
//! of any request.

use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, Stream, StreamExt, future};
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tokio::time::{self, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, protocol::Message};

use crate::logger::{SharedLogger, with_logger};

use super::model::{ClientMessage, CommandResult, PushMessage};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25);

/// Spawns the listener and returns the receiving end of the pushed results.
/// A dropped connection is retried after `reconnect_delay`, forever, until the
/// receiver goes away.
pub fn spawn_listener(
    url: String,
    reconnect_delay: Duration,
    logger: SharedLogger,
) -> Receiver<CommandResult> {
    let (tx, rx) = channel(32);

    tokio::spawn(async move {
        loop {
            match listen_once(&url, &tx, &logger).await {
                Ok(()) => with_logger(&logger, |l| l.debug("Push connection closed")),
                Err(err) => with_logger(&logger, |l| {
                    l.debug(&format!("Push connection to {url} unavailable: {err:#}"));
                }),
            }
            if tx.is_closed() {
                break;
            }
            time::sleep(reconnect_delay).await;
        }
    });

    rx
}

async fn listen_once(
    url: &str,
    tx: &Sender<CommandResult>,
    logger: &SharedLogger,
) -> anyhow::Result<()> {
    let (ws_stream, _res) = connect_async(url)
        .await
        .context("Failed to open the push websocket")?;
    with_logger(logger, |l| l.debug(&format!("Listening for pushed results on {url}")));

    let (mut ws_write, ws_read) = ws_stream.split();
    let mut events = Box::pin(to_push_stream(ws_read, logger.clone()));

    let ping = serde_json::to_string(&ClientMessage::Ping)?;
    let mut keepalive = time::interval(KEEPALIVE_INTERVAL);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = keepalive.tick() => {
                ws_write
                    .send(Message::Text(ping.clone().into()))
                    .await
                    .context("Failed to send keep-alive ping")?;
            }
            event = events.next() => match event {
                None => return Ok(()),
                Some(Err(err)) => return Err(err),
                Some(Ok(PushMessage::CommandResult { data })) => {
                    if tx.send(data).await.is_err() {
                        return Ok(());
                    }
                }
                Some(Ok(PushMessage::Pong { .. })) => (),
            },
        }
    }
}

fn to_push_stream<S>(
    ws_stream: S,
    logger: SharedLogger,
) -> impl Stream<Item = anyhow::Result<PushMessage>>
where
    S: Stream<Item = Result<Message, tungstenite::Error>>,
{
    ws_stream.filter_map(move |try_msg| {
        let event = match try_msg {
            Err(err) => Some(Err(anyhow::Error::new(err).context("Push websocket failed"))),
            Ok(Message::Text(msg)) => match decode_push(msg.as_str()) {
                Ok(push) => Some(Ok(push)),
                Err(err) => {
                    with_logger(&logger, |l| l.debug(&format!("Ignoring pushed message: {err:#}")));
                    None
                }
            },
            Ok(_) => None,
        };
        future::ready(event)
    })
}

/// Parses one text frame. Frames this client does not know about are errors
/// the caller may skip.
pub fn decode_push(text: &str) -> anyhow::Result<PushMessage> {
    serde_json::from_str::<PushMessage>(text).context(format!("Unexpected push message {text}"))
}
