//! Async OBEX client over any byte stream.
//!
//! The [`ClientBuilder`] collects a [`ClientConfig`] and starts the client on
//! a stream. The [`ObexClient`] then manages the lifecycle:
//! 1. Split the stream and spawn the writer task
//! 2. Spawn the read loop feeding every read into the [`RequestExchange`]
//! 3. Resolve each request when its response is dispatched
//! 4. Fail pending requests with `ConnectionClosed` when the stream ends
//!
//! # Example
//!
//! ```no_run
//! use obex_engine::ObexClient;
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = TcpStream::connect("127.0.0.1:6500").await?;
//!     let mut client = ObexClient::builder().max_packet_size(8192).start(stream)?;
//!
//!     client.connect().await?;
//!     client
//!         .put("hello.txt", &b"hello"[..], |p| println!("{}/{}", p.sent, p.total))
//!         .await?;
//!     client.disconnect().await?;
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{ObexError, Result};
use crate::exchange::RequestExchange;
use crate::protocol::{
    response_code, AbortRequest, ConnectRequest, ConnectResponse, DisconnectRequest, GetRequest,
    HeaderIdentifier, Request, ResponsePacket, ResponseReassembler,
};
use crate::transfer::{ChunkedPutTransfer, TransferProgress};
use crate::writer::{spawn_writer_task, WriterHandle};

type SharedExchange = Arc<Mutex<RequestExchange<WriterHandle>>>;

/// Builder for configuring and starting an [`ObexClient`].
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Packet size announced in the Connect request.
    ///
    /// Default: 255
    pub fn max_packet_size(mut self, size: u16) -> Self {
        self.config.max_packet_size = size;
        self
    }

    /// Object bytes per PUT packet.
    ///
    /// Default: 8192
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Read buffer size.
    ///
    /// Default: 64 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Writer queue capacity.
    ///
    /// Default: 64
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Validate the configuration and start the client on `stream`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S>(self, stream: S) -> Result<ObexClient>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.config.validate()?;
        ObexClient::start(self.config, stream)
    }
}

/// A running OBEX client session.
pub struct ObexClient {
    exchange: SharedExchange,
    config: ClientConfig,
    /// Set by the read loop once the stream ended.
    closed: Arc<AtomicBool>,
    peer_max_packet_size: Option<u16>,
    connection_id: Option<u32>,
    shutdown_rx: oneshot::Receiver<()>,
    read_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl ObexClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    fn start<S>(config: ClientConfig, stream: S) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(write_half, config.channel_capacity);

        let reassembler = ResponseReassembler::with_capacity(config.read_buffer_size);
        let exchange = Arc::new(Mutex::new(RequestExchange::with_reassembler(
            writer,
            reassembler,
        )));
        let closed = Arc::new(AtomicBool::new(false));

        // Writer failures go to the same error channel as read failures.
        let monitor_exchange = exchange.clone();
        let monitor_closed = closed.clone();
        let writer_task = tokio::spawn(async move {
            let outcome = match writer_task.await {
                Ok(result) => result,
                Err(e) => Err(ObexError::Transport(format!("writer task failed: {}", e))),
            };
            if let Err(e) = outcome {
                let mut exchange = monitor_exchange.lock().await;
                exchange.report_error(&e.into_transport());
                monitor_closed.store(true, Ordering::Release);
                exchange.clear_pending();
            }
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let read_exchange = exchange.clone();
        let read_closed = closed.clone();
        let buffer_size = config.read_buffer_size;
        let read_task = tokio::spawn(async move {
            let result = Self::read_loop(reader, &read_exchange, buffer_size).await;

            let mut exchange = read_exchange.lock().await;
            match result {
                Ok(()) => tracing::debug!("stream closed by peer"),
                Err(e) => exchange.report_error(&e),
            }
            read_closed.store(true, Ordering::Release);
            let dropped = exchange.clear_pending();
            if dropped > 0 {
                tracing::warn!(dropped, "pending requests abandoned on close");
            }
            let _ = shutdown_tx.send(());
        });

        Ok(Self {
            exchange,
            config,
            closed,
            peer_max_packet_size: None,
            connection_id: None,
            shutdown_rx,
            read_task,
            writer_task,
        })
    }

    /// Read until EOF, feeding every chunk into the exchange.
    ///
    /// A protocol violation ends the loop: the stream can no longer be
    /// trusted to stay in step with the request queue.
    async fn read_loop<R: AsyncRead + Unpin>(
        mut reader: R,
        exchange: &SharedExchange,
        buffer_size: usize,
    ) -> Result<()> {
        let mut buf = vec![0u8; buffer_size];

        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| ObexError::Transport(e.to_string()))?;
            if n == 0 {
                return Ok(());
            }
            tracing::trace!(bytes = n, "read from stream");
            exchange.lock().await.receive(&buf[..n])?;
        }
    }

    /// Send one request and wait for its response.
    ///
    /// No response code check is done here.
    pub async fn request<R: Request + ?Sized>(&self, request: &R) -> Result<ResponsePacket> {
        let (tx, rx) = oneshot::channel();
        {
            let mut exchange = self.exchange.lock().await;
            if self.closed.load(Ordering::Acquire) {
                return Err(ObexError::ConnectionClosed);
            }
            exchange.send_request(request, move |_, response| {
                let _ = tx.send(response);
            })?;
        }
        rx.await.map_err(|_| ObexError::ConnectionClosed)
    }

    /// Open the OBEX session, announcing the configured packet size.
    pub async fn connect(&mut self) -> Result<ConnectResponse> {
        let mut request = ConnectRequest::new();
        request.set_max_packet_size(self.config.max_packet_size);
        self.connect_with(&request).await
    }

    /// Open the OBEX session with a prepared Connect request (e.g. with a Target).
    ///
    /// Records the peer's packet size and any ConnectionId it assigned.
    pub async fn connect_with(&mut self, request: &ConnectRequest) -> Result<ConnectResponse> {
        let packet = self.request(request).await?;
        // A refusal may come without the fixed Connect fields.
        if !packet.is_success() {
            return Err(ObexError::ResponseError(packet.code()));
        }
        let response = ConnectResponse::from_packet(packet)?;

        self.peer_max_packet_size = Some(response.max_packet_size());
        self.connection_id = response
            .headers()?
            .get_u32(HeaderIdentifier::ConnectionId)?;
        tracing::info!(
            version = response.version(),
            peer_max_packet_size = response.max_packet_size(),
            connection_id = ?self.connection_id,
            "connected"
        );
        Ok(response)
    }

    /// Close the OBEX session. The stream stays open.
    pub async fn disconnect(&mut self) -> Result<()> {
        let mut request = DisconnectRequest::new();
        if let Some(id) = self.connection_id {
            request.set_connection_id(id);
        }
        let response = self.request(&request).await?;
        if !response.is_success() {
            return Err(ObexError::ResponseError(response.code()));
        }
        self.connection_id = None;
        tracing::info!("disconnected");
        Ok(())
    }

    /// Send `data` as object `name`, reporting progress after every chunk.
    pub async fn put<F>(
        &self,
        name: &str,
        data: impl Into<Bytes>,
        progress: F,
    ) -> Result<TransferProgress>
    where
        F: FnMut(TransferProgress),
    {
        let transfer =
            ChunkedPutTransfer::new(name, data)?.with_chunk_size(self.config.chunk_size)?;
        self.put_transfer(transfer, progress).await
    }

    /// Run a prepared transfer to completion.
    ///
    /// The session's ConnectionId is attached unless the transfer has one.
    pub async fn put_transfer<F>(
        &self,
        mut transfer: ChunkedPutTransfer,
        mut progress: F,
    ) -> Result<TransferProgress>
    where
        F: FnMut(TransferProgress),
    {
        if transfer.connection_id().is_none() {
            if let Some(id) = self.connection_id {
                transfer.set_connection_id(id);
            }
        }
        if let Some(peer) = self.peer_max_packet_size {
            if transfer.chunk_size() > peer as usize {
                tracing::warn!(
                    chunk_size = transfer.chunk_size(),
                    peer_max_packet_size = peer,
                    "chunk size exceeds the peer's packet size"
                );
            }
        }

        tracing::debug!(name = transfer.name(), total = transfer.total(), "put started");
        while let Some(chunk) = transfer.next_chunk() {
            let response = self.request(&chunk.request).await?;
            transfer.complete(&chunk, &response)?;
            progress(transfer.progress());
        }
        Ok(transfer.progress())
    }

    /// Fetch an object by name and/or type.
    ///
    /// Keeps sending GetFinal while the peer answers Continue, collecting
    /// Body and EndOfBody until Success.
    pub async fn get(&self, name: Option<&str>, mime_type: Option<&[u8]>) -> Result<Bytes> {
        let mut request = GetRequest::new();
        request.set_final(true);
        if let Some(id) = self.connection_id {
            request.set_connection_id(id);
        }
        if let Some(name) = name {
            request.set_name(name);
        }
        if let Some(mime) = mime_type {
            request.set_type(Bytes::copy_from_slice(mime));
        }

        let mut body = BytesMut::new();
        loop {
            let response = self.request(&request).await?;
            let headers = response.headers()?;
            for id in [HeaderIdentifier::Body, HeaderIdentifier::EndOfBody] {
                if let Some(chunk) = headers.get_bytes(id)? {
                    body.extend_from_slice(chunk);
                }
            }

            match response.code() {
                response_code::CONTINUE => {
                    tracing::trace!(received = body.len(), "get continues");
                    request = GetRequest::new();
                    request.set_final(true);
                    if let Some(id) = self.connection_id {
                        request.set_connection_id(id);
                    }
                }
                response_code::SUCCESS => {
                    tracing::debug!(received = body.len(), "get finished");
                    return Ok(body.freeze());
                }
                code => return Err(ObexError::ResponseError(code)),
            }
        }
    }

    /// Abort the multi-packet operation in progress.
    pub async fn abort(&self) -> Result<()> {
        let mut request = AbortRequest::new();
        if let Some(id) = self.connection_id {
            request.set_connection_id(id);
        }
        let response = self.request(&request).await?;
        if !response.is_success() {
            return Err(ObexError::ResponseError(response.code()));
        }
        Ok(())
    }

    /// Register the transport error handler, replacing any previous one.
    pub async fn on_error<F>(&self, handler: F)
    where
        F: FnMut(&ObexError) + Send + 'static,
    {
        self.exchange.lock().await.on_error(handler);
    }

    /// Message of the most recent transport failure.
    pub async fn last_error(&self) -> Option<String> {
        self.exchange.lock().await.last_error().map(str::to_owned)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// ConnectionId assigned by the peer on connect.
    pub fn connection_id(&self) -> Option<u32> {
        self.connection_id
    }

    /// Packet size the peer announced on connect.
    pub fn peer_max_packet_size(&self) -> Option<u16> {
        self.peer_max_packet_size
    }

    /// Check if the stream has ended.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the client: flush queued frames, close the write side and stop
    /// reading. Pending requests resolve with `ConnectionClosed`.
    pub async fn shutdown(self) -> Result<()> {
        self.exchange.lock().await.transport_mut().close();
        let _ = self.writer_task.await;

        self.read_task.abort();
        let _ = self.read_task.await;

        let mut exchange = self.exchange.lock().await;
        self.closed.store(true, Ordering::Release);
        exchange.clear_pending();
        tracing::debug!("client shut down");
        Ok(())
    }

    /// Wait until the peer closes the stream, then release the writer.
    pub async fn wait_for_shutdown(self) -> Result<()> {
        let _ = self.shutdown_rx.await;
        self.exchange.lock().await.transport_mut().close();
        let _ = self.writer_task.await;
        Ok(())
    }
}
