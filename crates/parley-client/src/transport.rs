//! Envelope transports.
//!
//! Provides [`Link`], a pair of queues connecting one endpoint to the
//! host/engine channel, and two ways to obtain one:
//!
//! - [`Bus::attach`]: a shared broadcast bus. Every envelope published by any
//!   endpoint is delivered to every endpoint, the publisher included, so
//!   receivers must filter their own traffic by [`parley_proto::Side`].
//! - [`connect_stream`]: length-prefixed frames over an `AsyncRead` /
//!   `AsyncWrite` pair such as a child process's stdio. Direction is implied
//!   by the stream, so nothing echoes back.
//!
//! Transports only move envelopes. Correlation lives in
//! [`crate::Correlator`].

use bytes::BytesMut;
use parley_proto::{Envelope, LENGTH_PREFIX_SIZE};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{broadcast, mpsc},
    task::AbortHandle,
};

use crate::TransportError;

/// One endpoint's connection to the envelope channel.
pub struct Link {
    /// Envelopes to publish on the channel.
    pub outgoing: mpsc::Sender<Envelope>,
    /// Envelopes observed on the channel.
    pub incoming: mpsc::Receiver<Envelope>,
    /// Handle to stop the pump tasks behind this link.
    pub handle: LinkHandle,
}

impl Link {
    /// Build a link from raw queues with no pump tasks behind it.
    ///
    /// Useful when the caller drives both ends itself.
    pub fn from_channels(
        outgoing: mpsc::Sender<Envelope>,
        incoming: mpsc::Receiver<Envelope>,
    ) -> Self {
        Self { outgoing, incoming, handle: LinkHandle::default() }
    }

    /// Stop the pump tasks behind this link.
    pub fn stop(&self) {
        self.handle.stop();
    }
}

/// Abort handles for a link's pump tasks.
#[derive(Debug, Clone, Default)]
pub struct LinkHandle {
    tasks: Vec<AbortHandle>,
}

impl LinkHandle {
    /// Abort all pump tasks. Idempotent.
    pub fn stop(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Shared broadcast bus.
///
/// Models a single message bus that both the host and the engine publish to
/// and listen on. Cloning the bus shares it.
#[derive(Debug, Clone)]
pub struct Bus {
    tx: broadcast::Sender<Envelope>,
    link_capacity: usize,
}

impl Bus {
    /// Create a bus buffering up to `capacity` envelopes per subscriber, with
    /// `link_capacity`-deep queues on each attached link.
    pub fn new(capacity: usize, link_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, link_capacity: link_capacity.max(1) }
    }

    /// Attach a new endpoint.
    ///
    /// The endpoint observes every envelope published after this call,
    /// including its own. Must be called from within a Tokio runtime.
    pub fn attach(&self) -> Link {
        let (outgoing, mut to_bus) = mpsc::channel::<Envelope>(self.link_capacity);
        let (from_bus, incoming) = mpsc::channel::<Envelope>(self.link_capacity);

        let bus_tx = self.tx.clone();
        let publisher = tokio::spawn(async move {
            while let Some(envelope) = to_bus.recv().await {
                // Err only means no endpoint is listening; the envelope is lost
                // just as it would be on a real broadcast channel.
                if bus_tx.send(envelope).is_err() {
                    tracing::debug!("bus has no subscribers, envelope dropped");
                }
            }
        });

        let mut bus_rx = self.tx.subscribe();
        let subscriber = tokio::spawn(async move {
            loop {
                match bus_rx.recv().await {
                    Ok(envelope) => {
                        if from_bus.send(envelope).await.is_err() {
                            break;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "bus subscriber lagged, envelopes dropped");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Link {
            outgoing,
            incoming,
            handle: LinkHandle { tasks: vec![publisher.abort_handle(), subscriber.abort_handle()] },
        }
    }

    /// Publish an envelope directly, bypassing any link.
    ///
    /// Returns the number of subscribers that will observe it.
    pub fn publish(&self, envelope: Envelope) -> usize {
        self.tx.send(envelope).unwrap_or(0)
    }

    /// Number of attached endpoints.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Carry envelopes as length-prefixed frames over a byte stream.
///
/// Spawns a reader task decoding frames from `reader` into
/// [`Link::incoming`] and a writer task encoding [`Link::outgoing`] onto
/// `writer`. A malformed frame or I/O error ends the reader, which closes
/// `incoming`; the correlator then fails outstanding calls. Must be called
/// from within a Tokio runtime.
pub fn connect_stream<R, W>(reader: R, writer: W, capacity: usize) -> Link
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outgoing, to_stream) = mpsc::channel::<Envelope>(capacity.max(1));
    let (from_stream, incoming) = mpsc::channel::<Envelope>(capacity.max(1));

    let read_task = tokio::spawn(async move {
        if let Err(e) = read_frames(reader, from_stream).await {
            tracing::error!(error = %e, "stream reader stopped");
        }
    });

    let write_task = tokio::spawn(async move {
        if let Err(e) = write_frames(writer, to_stream).await {
            tracing::error!(error = %e, "stream writer stopped");
        }
    });

    Link {
        outgoing,
        incoming,
        handle: LinkHandle { tasks: vec![read_task.abort_handle(), write_task.abort_handle()] },
    }
}

/// Decode frames until EOF, an error, or the link is dropped.
async fn read_frames<R>(mut reader: R, tx: mpsc::Sender<Envelope>) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        match reader.read_exact(&mut prefix).await {
            Ok(_) => {},
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let len = Envelope::body_len(prefix)?;
        body.resize(len, 0);
        reader.read_exact(&mut body).await?;

        let envelope = Envelope::decode_body(&body)?;
        tracing::trace!(seq = envelope.seq, "frame received");
        tx.send(envelope).await.map_err(|_| TransportError::Closed)?;
    }
}

/// Encode envelopes from the link until it is dropped.
async fn write_frames<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<Envelope>,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    while let Some(envelope) = rx.recv().await {
        buf.clear();
        envelope.encode(&mut buf)?;
        writer.write_all(&buf).await?;
        writer.flush().await?;
    }
    writer.shutdown().await?;
    Ok(())
}
