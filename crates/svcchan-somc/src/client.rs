//! Persistent, reconnecting matching-server client. One background task owns the websocket; callers
//! talk to it through a command channel so that the single in-flight writer and the pending-reply
//! map never need a lock shared with the public API. On any transport error every pending request
//! and endpoint-wait is failed uniformly, and the task reconnects after `reconnect_period`,
//! repeating until [`SomcClient::close`].

use std::collections::HashMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use svcchan_types::ids::ChannelId;
use svcchan_types::model::{Blob, Hash32};

use crate::error::SomcError;
use crate::wire::{methods, Frame};

type Reply = oneshot::Sender<Result<Value, SomcError>>;
type EndpointReply = oneshot::Sender<Result<Blob, SomcError>>;

enum Command {
    Request {
        method: String,
        params: Value,
        reply: Reply,
    },
    Subscribe {
        channel: ChannelId,
        reply: EndpointReply,
    },
    Close,
}

/// A handle to the background client task. Cheap to clone-by-reference
/// (the underlying `mpsc::Sender` is cloneable); typically held as one
/// shared instance per daemon.
#[derive(Clone)]
pub struct SomcClient {
    cmd_tx: mpsc::Sender<Command>,
}

#[derive(Deserialize)]
struct OfferingEntry {
    hash: Hash32,
    data: Blob,
}

impl SomcClient {
    /// Spawns the background connection task and returns a handle to it.
    /// Connection happens lazily inside the task; this call never blocks.
    pub fn spawn(url: Url, reconnect_period: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(run(url, reconnect_period, cmd_rx));
        Self { cmd_tx }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, SomcError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Request {
                method: method.to_string(),
                params,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SomcError::Closed)?;
        reply_rx.await.map_err(|_| SomcError::Closed)?
    }

    /// Pushes a signed offering message to the matching server (`newOffering`).
    pub async fn publish_offering(&self, hash: &Hash32, data: &Blob) -> Result<(), SomcError> {
        let params = serde_json::json!({"hash": hash, "data": data});
        self.call(methods::NEW_OFFERING, params).await?;
        Ok(())
    }

    /// Looks up offerings by hash (`getOfferings`), verifying that each
    /// returned entry's hash equals Keccak-256 of its data.
    pub async fn find_offerings(&self, hashes: &[Hash32]) -> Result<Vec<(Hash32, Blob)>, SomcError> {
        let params = serde_json::json!({"hashes": hashes});
        let result = self.call(methods::GET_OFFERINGS, params).await?;
        let entries: Vec<OfferingEntry> =
            serde_json::from_value(result).map_err(|e| SomcError::Protocol(e.to_string()))?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let digest = svcchan_crypto::hash::keccak256(&entry.data.0);
            if digest != entry.hash {
                return Err(SomcError::HashMismatch);
            }
            out.push((entry.hash, entry.data));
        }
        Ok(out)
    }

    /// Pushes a sealed endpoint message for `channel` (`connectionInfo`).
    pub async fn publish_endpoint(&self, channel: ChannelId, bytes: &Blob) -> Result<(), SomcError> {
        let params = serde_json::json!({"stateChannel": channel.to_string(), "endpoint": bytes});
        self.call(methods::CONNECTION_INFO, params).await?;
        Ok(())
    }

    /// Subscribes to `channel` and waits for the matching server to push its
    /// endpoint bytes back (`subscribe`, then the resulting notification).
    pub async fn wait_for_endpoint(&self, channel: ChannelId) -> Result<Blob, SomcError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Subscribe {
                channel,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SomcError::Closed)?;
        let params = serde_json::json!({"stateChannel": channel.to_string()});
        self.call(methods::SUBSCRIBE, params).await?;
        reply_rx.await.map_err(|_| SomcError::Closed)?
    }

    /// Stops the background task, failing any outstanding requests.
    pub async fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close).await;
    }
}

async fn run(url: Url, reconnect_period: Duration, mut cmd_rx: mpsc::Receiver<Command>) {
    let mut next_id: u64 = 1;
    let mut pending: HashMap<u64, Reply> = HashMap::new();
    let mut waiters: HashMap<String, EndpointReply> = HashMap::new();

    'reconnect: loop {
        debug!(url = %url, "connecting to matching server");
        let ws_stream = match connect_async(url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!(error = %e, "matching server connection failed, retrying");
                fail_all(&mut pending, &mut waiters, SomcError::Transport(e.to_string()));
                if !wait_or_close(reconnect_period, &mut cmd_rx).await {
                    return;
                }
                continue 'reconnect;
            }
        };
        info!("connected to matching server");
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        None => return,
                        Some(Command::Close) => {
                            let _ = write.send(Message::Close(None)).await;
                            fail_all(&mut pending, &mut waiters, SomcError::Closed);
                            return;
                        }
                        Some(Command::Request { method, params, reply }) => {
                            let id = next_id;
                            next_id += 1;
                            let frame = Frame::request(id, &method, params);
                            match serde_json::to_string(&frame) {
                                Ok(text) => {
                                    if let Err(e) = write.send(Message::Text(text)).await {
                                        let _ = reply.send(Err(SomcError::Transport(e.to_string())));
                                    } else {
                                        pending.insert(id, reply);
                                    }
                                }
                                Err(e) => {
                                    let _ = reply.send(Err(SomcError::Protocol(e.to_string())));
                                }
                            }
                        }
                        Some(Command::Subscribe { channel, reply }) => {
                            waiters.insert(channel.to_string(), reply);
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            handle_incoming(&text, &mut pending, &mut waiters);
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("matching server closed the connection");
                            fail_all(&mut pending, &mut waiters, SomcError::Transport("connection closed".into()));
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "matching server transport error");
                            fail_all(&mut pending, &mut waiters, SomcError::Transport(e.to_string()));
                            break;
                        }
                    }
                }
            }
        }

        if !wait_or_close(reconnect_period, &mut cmd_rx).await {
            return;
        }
    }
}

/// Sleeps for `period` before the next reconnect attempt, but keeps
/// draining `cmd_rx` so a concurrent [`SomcClient::close`] is honored
/// immediately and any request issued while disconnected fails fast
/// instead of queuing silently. Returns `false` if the task should stop.
async fn wait_or_close(period: Duration, cmd_rx: &mut mpsc::Receiver<Command>) -> bool {
    let sleep = tokio::time::sleep(period);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => {
                match cmd {
                    None | Some(Command::Close) => return false,
                    Some(Command::Request { reply, .. }) => {
                        let _ = reply.send(Err(SomcError::Transport("reconnecting".into())));
                    }
                    Some(Command::Subscribe { reply, .. }) => {
                        let _ = reply.send(Err(SomcError::Transport("reconnecting".into())));
                    }
                }
            }
        }
    }
}

fn fail_all(pending: &mut HashMap<u64, Reply>, waiters: &mut HashMap<String, EndpointReply>, err: SomcError) {
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(err.clone()));
    }
    for (_, waiter) in waiters.drain() {
        let _ = waiter.send(Err(err.clone()));
    }
}

fn handle_incoming(text: &str, pending: &mut HashMap<u64, Reply>, waiters: &mut HashMap<String, EndpointReply>) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "undecodable frame from matching server");
            return;
        }
    };
    if frame.is_reply() {
        let Some(id) = frame.id else { return };
        if let Some(reply) = pending.remove(&id) {
            let result = match frame.error {
                Some(err) => Err(SomcError::Rpc {
                    code: err.code,
                    message: err.message,
                }),
                None => Ok(frame.result.unwrap_or(Value::Null)),
            };
            let _ = reply.send(result);
        }
        return;
    }

    // Server-initiated notification: a publish-endpoint callback keyed by
    // state-channel id.
    let Some(params) = frame.params else { return };
    let Some(channel) = params.get("stateChannel").and_then(Value::as_str) else {
        return;
    };
    let Some(waiter) = waiters.remove(channel) else {
        return;
    };
    let reply = match params.get("endpoint").cloned() {
        Some(v) => serde_json::from_value::<Blob>(v).map_err(|e| SomcError::Protocol(e.to_string())),
        None => Err(SomcError::Protocol("notification missing endpoint bytes".into())),
    };
    let _ = waiter.send(reply);
}
