//! Per-connection pumps and the task group that runs them.
//!
//! Each upgraded socket is split in two halves, each served by its own
//! task:
//!
//! - the **inbound pump** reads client frames, wraps each one into a user
//!   envelope and submits it to the coordinator for broadcast;
//! - the **outbound pump** drains the connection's outbound queue into the
//!   socket.
//!
//! Both tasks live in a [`JoinSet`] owned by [`serve_connection`]. The
//! session ends as soon as either pump does: the other one is aborted, the
//! connection is unregistered and both socket halves are dropped, which
//! closes the transport. Both pumps also watch the connection's closed
//! signal, so an evicted peer is torn down even while its writer is blocked
//! on a full socket.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::app_state::AppState;
use crate::domain::coordinator::user_broadcast;
use crate::domain::{Connection, ConnectionId, HubHandle, OutboundQueue};

/// How an inbound pump ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundExit {
    /// The peer sent a close frame or the stream ended.
    RemoteClosed,
    /// Reading from the transport failed.
    ReadFailed,
    /// The coordinator stopped accepting messages.
    HubClosed,
    /// The hub dropped the connection.
    Dropped,
}

/// How an outbound pump ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundExit {
    /// The outbound queue was closed and fully drained.
    QueueClosed,
    /// Writing to the transport failed.
    WriteFailed,
    /// The hub dropped the connection while a write was pending.
    Dropped,
}

#[derive(Debug)]
enum PumpExit {
    Inbound(InboundExit),
    Outbound(OutboundExit),
}

/// Reads frames from `stream` and submits them for broadcast until the
/// stream closes or fails, or `closed` fires. Then unregisters the
/// connection.
///
/// Text frames are forwarded as-is; binary frames are decoded as lossy
/// UTF-8. Ping and pong frames are ignored, the transport answers pings
/// on its own. Once `closed` has fired nothing more is read.
pub async fn inbound_pump<S, E>(
    mut stream: S,
    id: ConnectionId,
    peer_addr: SocketAddr,
    server_ip: Arc<str>,
    hub: HubHandle,
    closed: CancellationToken,
) -> InboundExit
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let exit = loop {
        let next = tokio::select! {
            biased;
            () = closed.cancelled() => break InboundExit::Dropped,
            next = stream.next() => next,
        };
        let content = match next {
            Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
            Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => break InboundExit::RemoteClosed,
            Some(Err(err)) => {
                tracing::debug!(connection_id = %id, error = %err, "ws read failed");
                break InboundExit::ReadFailed;
            }
        };

        let broadcast = match user_broadcast(id, content, &server_ip, peer_addr) {
            Ok(broadcast) => broadcast,
            Err(err) => {
                tracing::warn!(connection_id = %id, error = %err, "dropping unencodable message");
                continue;
            }
        };
        if hub.broadcast(broadcast).await.is_err() {
            break InboundExit::HubClosed;
        }
    };

    drop(stream);
    if let Err(err) = hub.unregister(id).await {
        tracing::debug!(connection_id = %id, error = %err, "unregister not delivered");
    }
    exit
}

/// Writes every frame from `queue` to `sink` in order, then closes the
/// sink.
///
/// A write still pending when `closed` fires is abandoned and the sink is
/// left as is; its owner drops it. A write failure does not unregister the
/// connection, [`serve_connection`] does that once this pump returns.
pub async fn outbound_pump<W>(
    mut sink: W,
    mut queue: OutboundQueue,
    id: ConnectionId,
    closed: CancellationToken,
) -> OutboundExit
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let exit = loop {
        let Some(frame) = queue.recv().await else {
            break OutboundExit::QueueClosed;
        };
        let written = tokio::select! {
            biased;
            written = sink.send(Message::Text(frame)) => written,
            () = closed.cancelled() => break OutboundExit::Dropped,
        };
        if let Err(err) = written {
            tracing::debug!(connection_id = %id, error = %err, "ws write failed");
            break OutboundExit::WriteFailed;
        }
    };

    drop(queue);
    match exit {
        OutboundExit::Dropped => {}
        OutboundExit::QueueClosed | OutboundExit::WriteFailed => {
            if let Err(err) = sink.close().await {
                tracing::trace!(connection_id = %id, error = %err, "ws close failed");
            }
        }
    }
    exit
}

/// Drives one upgraded socket until its session ends.
pub async fn run_connection(socket: WebSocket, peer_addr: SocketAddr, state: AppState) {
    let (sink, stream) = socket.split();
    serve_connection(stream, sink, peer_addr, state).await;
}

/// Opens and registers a [`Connection`] for the given transport halves,
/// then runs both pumps until the first of them finishes.
///
/// The remaining pump is aborted and the connection unregistered, so when
/// this returns the hub no longer knows the peer and both halves have been
/// dropped.
pub async fn serve_connection<S, E, W>(stream: S, sink: W, peer_addr: SocketAddr, state: AppState)
where
    S: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display + Send,
{
    let (connection, queue) = Connection::open(peer_addr, state.outbound_queue_capacity);
    let id = connection.id();
    let closed = connection.closed_signal();

    if let Err(err) = state.hub.register(connection).await {
        tracing::warn!(connection_id = %id, error = %err, "could not register connection");
        return;
    }

    let hub = state.hub.clone();
    let outbound_closed = closed.clone();
    let mut pumps = JoinSet::new();
    pumps.spawn(async move {
        PumpExit::Outbound(outbound_pump(sink, queue, id, outbound_closed).await)
    });
    pumps.spawn(async move {
        PumpExit::Inbound(
            inbound_pump(stream, id, peer_addr, state.server_ip, state.hub, closed).await,
        )
    });

    match pumps.join_next().await {
        Some(Ok(PumpExit::Inbound(exit))) => {
            tracing::debug!(connection_id = %id, exit = ?exit, "inbound pump finished");
        }
        Some(Ok(PumpExit::Outbound(exit))) => {
            tracing::debug!(connection_id = %id, exit = ?exit, "outbound pump finished");
        }
        Some(Err(err)) => {
            tracing::error!(connection_id = %id, error = %err, "pump task failed");
        }
        None => {}
    }
    pumps.abort_all();
    while pumps.join_next().await.is_some() {}

    if let Err(err) = hub.unregister(id).await {
        tracing::debug!(connection_id = %id, error = %err, "unregister not delivered");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use axum::body::Bytes;
    use futures_util::stream;
    use tokio::time::{sleep, timeout};
    use tokio_test::assert_ok;

    use super::*;
    use crate::config::HubConfig;
    use crate::domain::envelope::{CONNECTED_NOTICE, DISCONNECTED_NOTICE};
    use crate::domain::{Coordinator, EnqueueError, Envelope, Frame};

    const SERVER_IP: &str = "10.9.8.7";

    /// Sink that records text frames and whether it was closed.
    #[derive(Debug, Default)]
    struct Recorder {
        written: Vec<String>,
        closed: bool,
        fail_at: Option<usize>,
    }

    impl Sink<Message> for Recorder {
        type Error = io::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(mut self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            if self.fail_at == Some(self.written.len()) {
                return Err(io::Error::other("broken pipe"));
            }
            if let Message::Text(text) = item {
                self.written.push(text.as_str().to_owned());
            }
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            self.closed = true;
            Poll::Ready(Ok(()))
        }
    }

    /// Sink whose peer never reads: no write ever completes.
    #[derive(Debug)]
    struct Stalled;

    impl Sink<Message> for Stalled {
        type Error = io::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn silent_stream() -> stream::Pending<Result<Message, io::Error>> {
        stream::pending()
    }

    async fn next(queue: &mut OutboundQueue) -> Envelope {
        let Ok(Some(frame)) = timeout(Duration::from_secs(2), queue.recv()).await else {
            panic!("expected a frame");
        };
        let Ok(envelope) = serde_json::from_str(frame.as_str()) else {
            panic!("frame is not an envelope");
        };
        envelope
    }

    async fn assert_nothing_queued(queue: &mut OutboundQueue) {
        let pending = timeout(Duration::from_millis(100), queue.recv()).await;
        assert!(pending.is_err(), "unexpected frame: {pending:?}");
    }

    /// Starts a hub with an observer and a sender registered, in that order.
    /// Returns the sender's closed signal alongside its id.
    async fn hub_with_pair() -> (HubHandle, OutboundQueue, ConnectionId, CancellationToken) {
        let (coordinator, hub) = Coordinator::new(Arc::from(SERVER_IP), 4);
        coordinator.spawn();

        let (observer, observer_queue) = Connection::open(addr(6001), 16);
        assert_ok!(hub.register(observer).await);
        let (sender, _sender_queue) = Connection::open(addr(6002), 16);
        let sender_id = sender.id();
        let sender_closed = sender.closed_signal();
        assert_ok!(hub.register(sender).await);
        (hub, observer_queue, sender_id, sender_closed)
    }

    async fn first_peer(hub: &HubHandle) -> ConnectionId {
        for _ in 0..200 {
            let Ok(peers) = hub.peers().await else {
                panic!("coordinator stopped");
            };
            if let Some(id) = peers.first() {
                return *id;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("session never registered");
    }

    #[tokio::test]
    async fn inbound_forwards_frames_then_unregisters_on_close() {
        let (hub, mut observer, sender_id, closed) = hub_with_pair().await;
        let frames = stream::iter(vec![
            Ok::<_, io::Error>(Message::text("hi")),
            Ok(Message::Ping(Bytes::from_static(b"p"))),
            Ok(Message::binary(vec![b'o', b'k', 0xff])),
            Ok(Message::Close(None)),
            Ok(Message::text("never read")),
        ]);

        let exit =
            inbound_pump(frames, sender_id, addr(6002), Arc::from(SERVER_IP), hub, closed).await;
        assert_eq!(exit, InboundExit::RemoteClosed);

        assert_eq!(next(&mut observer).await.content, CONNECTED_NOTICE);

        let hi = next(&mut observer).await;
        assert_eq!(hi.sender, sender_id.to_string());
        assert_eq!(hi.content, "hi");
        assert_eq!(hi.server_ip, SERVER_IP);
        assert_eq!(hi.sender_ip, "127.0.0.1:6002");

        assert_eq!(next(&mut observer).await.content, "ok\u{fffd}");

        let bye = next(&mut observer).await;
        assert_eq!(bye.content, DISCONNECTED_NOTICE);
        assert_eq!(bye.sender_ip, "127.0.0.1:6002");
    }

    #[tokio::test]
    async fn inbound_read_error_unregisters() {
        let (hub, mut observer, sender_id, closed) = hub_with_pair().await;
        let frames = stream::iter(vec![Err::<Message, _>(io::Error::other("reset"))]);

        let exit = inbound_pump(
            frames,
            sender_id,
            addr(6002),
            Arc::from(SERVER_IP),
            hub.clone(),
            closed,
        )
        .await;
        assert_eq!(exit, InboundExit::ReadFailed);

        assert_eq!(next(&mut observer).await.content, CONNECTED_NOTICE);
        assert_eq!(next(&mut observer).await.content, DISCONNECTED_NOTICE);
        let Ok(peers) = hub.peers().await else {
            panic!("coordinator stopped");
        };
        assert!(!peers.contains(&sender_id));
    }

    #[tokio::test]
    async fn inbound_stops_when_hub_is_gone() {
        let (coordinator, hub) = Coordinator::new(Arc::from(SERVER_IP), 1);
        drop(coordinator);
        let frames = stream::iter(vec![Ok::<_, io::Error>(Message::text("orphan"))]);

        let exit = inbound_pump(
            frames,
            ConnectionId::new(),
            addr(6003),
            Arc::from(SERVER_IP),
            hub,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(exit, InboundExit::HubClosed);
    }

    #[tokio::test]
    async fn dropped_connection_no_longer_broadcasts_what_it_reads() {
        let (hub, mut observer, sender_id, closed) = hub_with_pair().await;
        assert_eq!(next(&mut observer).await.content, CONNECTED_NOTICE);
        assert_ok!(hub.unregister(sender_id).await);
        assert_eq!(next(&mut observer).await.content, DISCONNECTED_NOTICE);

        // The socket still has a frame to give, but the hub is done with it.
        let frames = stream::iter(vec![Ok::<_, io::Error>(Message::text("late"))]);
        let exit =
            inbound_pump(frames, sender_id, addr(6002), Arc::from(SERVER_IP), hub, closed).await;

        assert_eq!(exit, InboundExit::Dropped);
        assert_nothing_queued(&mut observer).await;
    }

    #[tokio::test]
    async fn inbound_waiting_for_a_frame_stops_when_dropped() {
        let (coordinator, hub) = Coordinator::new(Arc::from(SERVER_IP), 4);
        coordinator.spawn();
        let (connection, _queue) = Connection::open(addr(6009), 4);
        let id = connection.id();
        let closed = connection.closed_signal();
        assert_ok!(hub.register(connection).await);

        let pump = tokio::spawn(inbound_pump(
            silent_stream(),
            id,
            addr(6009),
            Arc::from(SERVER_IP),
            hub.clone(),
            closed,
        ));
        assert_ok!(hub.unregister(id).await);

        let Ok(Ok(exit)) = timeout(Duration::from_secs(2), pump).await else {
            panic!("inbound pump outlived its connection");
        };
        assert_eq!(exit, InboundExit::Dropped);
    }

    #[tokio::test]
    async fn outbound_writes_in_order_and_closes_on_queue_close() {
        let (connection, queue) = Connection::open(addr(6004), 8);
        let id = connection.id();
        let closed = connection.closed_signal();
        for text in ["a", "b", "c"] {
            assert_eq!(connection.try_enqueue(Frame::from_static(text)), Ok(()));
        }
        drop(connection);

        let mut sink = Recorder::default();
        let exit = outbound_pump(&mut sink, queue, id, closed).await;

        assert_eq!(exit, OutboundExit::QueueClosed);
        assert_eq!(sink.written, vec!["a", "b", "c"]);
        assert!(sink.closed);
    }

    #[tokio::test]
    async fn outbound_write_failure_closes_sink_and_queue() {
        let (connection, queue) = Connection::open(addr(6005), 8);
        let id = connection.id();
        let closed = connection.closed_signal();
        assert_eq!(connection.try_enqueue(Frame::from_static("first")), Ok(()));
        assert_eq!(connection.try_enqueue(Frame::from_static("second")), Ok(()));

        let mut sink = Recorder {
            fail_at: Some(1),
            ..Recorder::default()
        };
        let exit = outbound_pump(&mut sink, queue, id, closed).await;

        assert_eq!(exit, OutboundExit::WriteFailed);
        assert_eq!(sink.written, vec!["first"]);
        assert!(sink.closed);
        // The coordinator will now see the queue as closed and evict.
        assert_eq!(
            connection.try_enqueue(Frame::from_static("third")),
            Err(EnqueueError::Closed)
        );
    }

    #[tokio::test]
    async fn outbound_blocked_on_a_stalled_sink_stops_when_dropped() {
        let (connection, queue) = Connection::open(addr(6008), 4);
        let id = connection.id();
        let closed = connection.closed_signal();
        assert_eq!(connection.try_enqueue(Frame::from_static("stuck")), Ok(()));

        let pump = tokio::spawn(outbound_pump(Stalled, queue, id, closed));
        sleep(Duration::from_millis(50)).await;
        assert!(!pump.is_finished());

        drop(connection);
        let Ok(Ok(exit)) = timeout(Duration::from_secs(2), pump).await else {
            panic!("outbound pump stayed blocked after its connection was dropped");
        };
        assert_eq!(exit, OutboundExit::Dropped);
    }

    #[tokio::test]
    async fn write_failure_ends_the_whole_session() {
        let (coordinator, hub) = Coordinator::new(Arc::from(SERVER_IP), 4);
        coordinator.spawn();
        let config = HubConfig {
            server_ip: Arc::from(SERVER_IP),
            outbound_queue_capacity: 8,
            ..HubConfig::default()
        };
        let sink = Recorder {
            fail_at: Some(0),
            ..Recorder::default()
        };
        let session = tokio::spawn(serve_connection(
            silent_stream(),
            sink,
            addr(6010),
            AppState::new(hub.clone(), &config),
        ));
        let served_id = first_peer(&hub).await;

        // The join notice is the first write the session attempts; it fails.
        let (observer, mut observer_queue) = Connection::open(addr(6011), 8);
        assert_ok!(hub.register(observer).await);

        let Ok(Ok(())) = timeout(Duration::from_secs(2), session).await else {
            panic!("session outlived its failed transport");
        };
        let left = next(&mut observer_queue).await;
        assert_eq!(left.content, DISCONNECTED_NOTICE);
        assert_eq!(left.sender_ip, "127.0.0.1:6010");
        let Ok(peers) = hub.peers().await else {
            panic!("coordinator stopped");
        };
        assert!(!peers.contains(&served_id));
    }

    #[tokio::test]
    async fn remote_close_ends_the_session_and_unregisters() {
        let (coordinator, hub) = Coordinator::new(Arc::from(SERVER_IP), 4);
        coordinator.spawn();
        let (observer, mut observer_queue) = Connection::open(addr(6012), 8);
        assert_ok!(hub.register(observer).await);

        let config = HubConfig {
            server_ip: Arc::from(SERVER_IP),
            ..HubConfig::default()
        };
        let frames = stream::iter(vec![
            Ok::<_, io::Error>(Message::text("bye soon")),
            Ok(Message::Close(None)),
        ]);
        let Ok(()) = timeout(
            Duration::from_secs(2),
            serve_connection(frames, Recorder::default(), addr(6013), AppState::new(hub.clone(), &config)),
        )
        .await
        else {
            panic!("session did not end on remote close");
        };

        assert_eq!(next(&mut observer_queue).await.content, CONNECTED_NOTICE);
        assert_eq!(next(&mut observer_queue).await.content, "bye soon");
        assert_eq!(next(&mut observer_queue).await.content, DISCONNECTED_NOTICE);
        assert_nothing_queued(&mut observer_queue).await;
    }
}
