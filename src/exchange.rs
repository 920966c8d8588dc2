//! Request/response correlation over one logical connection.
//!
//! [`RequestExchange`] owns the transport's send side, a
//! [`ResponseReassembler`] and a FIFO of typed continuations. OBEX keeps a
//! single request outstanding, so matching is positional: the oldest pending
//! handler receives the next reassembled response.
//!
//! The exchange does no I/O of its own. Bytes go out through [`Transport`]
//! and come back in through [`RequestExchange::receive`], which makes the
//! whole state machine drivable from tests with an in-memory transport.
//!
//! ```text
//! send_request ─► serialize ─► Transport::send
//!      │
//!      └─► pending.push_back(handler)
//!
//! receive(chunk) ─► reassembler ─► pending.pop_front() ─► handler(response)
//! ```

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::{ObexError, Result};
use crate::protocol::{Request, ResponsePacket, ResponseReassembler};

/// Send side of a byte transport.
///
/// Implementations hand the bytes to the underlying stream and report how
/// many were accepted. Errors carry the transport's message.
pub trait Transport {
    fn send(&mut self, bytes: Bytes) -> Result<usize>;
}

/// Continuation run with the response to one request.
///
/// It gets the exchange back so it can send the next request of a
/// multi-packet operation.
pub type ResponseHandler<T> = Box<dyn FnOnce(&mut RequestExchange<T>, ResponsePacket) + Send>;

/// Callback for transport failures.
pub type ErrorHandler = Box<dyn FnMut(&ObexError) + Send>;

/// FIFO request/response matcher bound to one transport.
pub struct RequestExchange<T> {
    transport: T,
    reassembler: ResponseReassembler,
    pending: VecDeque<ResponseHandler<T>>,
    error_handler: Option<ErrorHandler>,
    last_error: Option<String>,
}

impl<T: Transport> RequestExchange<T> {
    pub fn new(transport: T) -> Self {
        Self::with_reassembler(transport, ResponseReassembler::new())
    }

    /// Create an exchange with a specific reassembler (e.g. a custom buffer size).
    pub fn with_reassembler(transport: T, reassembler: ResponseReassembler) -> Self {
        Self {
            transport,
            reassembler,
            pending: VecDeque::new(),
            error_handler: None,
            last_error: None,
        }
    }

    /// Serialize `request`, queue `handler` and send the bytes.
    ///
    /// The handler is queued before the transport is called, so a response
    /// that races the send completion is still matched. If the send fails
    /// the handler is dequeued again, the error handler fires and the
    /// failure is returned as [`ObexError::Transport`].
    pub fn send_request<R, F>(&mut self, request: &R, handler: F) -> Result<()>
    where
        R: Request + ?Sized,
        F: FnOnce(&mut RequestExchange<T>, ResponsePacket) + Send + 'static,
    {
        let bytes = request.serialize()?;
        let opcode = request.opcode();
        let length = bytes.len();

        self.pending.push_back(Box::new(handler));
        match self.transport.send(bytes) {
            Ok(written) => {
                tracing::debug!(
                    opcode,
                    length,
                    written,
                    pending = self.pending.len(),
                    "request sent"
                );
                Ok(())
            }
            Err(e) => {
                self.pending.pop_back();
                let error = e.into_transport();
                self.report_error(&error);
                Err(error)
            }
        }
    }

    /// Feed bytes read from the transport.
    ///
    /// Every complete response is handed to the oldest pending handler.
    /// An empty chunk is accepted and only flushes frames still buffered.
    /// Returns the number of responses dispatched.
    ///
    /// A response with no pending handler is a [`ObexError::ProtocolViolation`];
    /// bytes after it stay buffered.
    pub fn receive(&mut self, chunk: &[u8]) -> Result<usize> {
        let mut dispatched = 0;
        let mut next = self.reassembler.add_data(chunk)?;
        while let Some(response) = next {
            self.dispatch(response)?;
            dispatched += 1;
            next = self.reassembler.add_data(&[])?;
        }
        Ok(dispatched)
    }

    fn dispatch(&mut self, response: ResponsePacket) -> Result<()> {
        let Some(handler) = self.pending.pop_front() else {
            tracing::warn!(
                opcode = response.opcode(),
                "response arrived with no pending request"
            );
            return Err(ObexError::ProtocolViolation(format!(
                "response {:#04x} arrived with no pending request",
                response.opcode()
            )));
        };
        tracing::trace!(
            code = response.code(),
            is_final = response.is_final(),
            "dispatching response"
        );
        handler(self, response);
        Ok(())
    }

    /// Register the error handler, replacing any previous one.
    pub fn on_error<F>(&mut self, handler: F)
    where
        F: FnMut(&ObexError) + Send + 'static,
    {
        self.error_handler = Some(Box::new(handler));
    }

    /// Record a transport failure and notify the error handler.
    ///
    /// Pending handlers are left queued.
    pub fn report_error(&mut self, error: &ObexError) {
        tracing::error!(error = %error, "exchange error");
        self.last_error = Some(error.to_string());
        if let Some(handler) = self.error_handler.as_mut() {
            handler(error);
        }
    }

    /// Message of the most recent reported failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Number of requests still waiting for a response.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop every pending handler without running it.
    ///
    /// Used when the connection is gone; handlers that own a channel sender
    /// signal their waiter by being dropped.
    pub fn clear_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.reassembler.clear();
        dropped
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::{ConnectRequest, DisconnectRequest, GetRequest};
    use std::sync::{Arc, Mutex};

    /// In-memory transport recording every frame sent.
    #[derive(Default, Clone)]
    pub(crate) struct RecordingTransport {
        pub sent: Arc<Mutex<Vec<Bytes>>>,
        pub fail_with: Option<String>,
    }

    impl RecordingTransport {
        pub fn frames(&self) -> Vec<Bytes> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, bytes: Bytes) -> Result<usize> {
            if let Some(message) = &self.fail_with {
                return Err(ObexError::Transport(message.clone()));
            }
            let len = bytes.len();
            self.sent.lock().unwrap().push(bytes);
            Ok(len)
        }
    }

    type Log = Arc<Mutex<Vec<(&'static str, u8)>>>;

    fn recorder(
        log: &Log,
        tag: &'static str,
    ) -> impl FnOnce(&mut RequestExchange<RecordingTransport>, ResponsePacket) + Send + 'static {
        let log = log.clone();
        move |_, response| log.lock().unwrap().push((tag, response.opcode()))
    }

    #[test]
    fn test_send_request_writes_serialized_frame() {
        let transport = RecordingTransport::default();
        let mut exchange = RequestExchange::new(transport.clone());

        exchange
            .send_request(&DisconnectRequest::new(), |_, _| {})
            .unwrap();

        assert_eq!(transport.frames(), vec![Bytes::from_static(&[0x81, 0x00, 0x03])]);
        assert_eq!(exchange.pending_len(), 1);
    }

    #[test]
    fn test_responses_match_requests_in_order() {
        let log: Log = Arc::default();
        let mut exchange = RequestExchange::new(RecordingTransport::default());

        exchange
            .send_request(&ConnectRequest::new(), recorder(&log, "connect"))
            .unwrap();
        exchange
            .send_request(&DisconnectRequest::new(), recorder(&log, "disconnect"))
            .unwrap();

        // Both responses coalesced in one read.
        let dispatched = exchange
            .receive(&[0xA0, 0x00, 0x07, 0x10, 0x00, 0x00, 0xFF, 0xD0, 0x00, 0x03])
            .unwrap();

        assert_eq!(dispatched, 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec![("connect", 0xA0), ("disconnect", 0xD0)]
        );
        assert_eq!(exchange.pending_len(), 0);
    }

    #[test]
    fn test_split_response_waits_for_rest() {
        let log: Log = Arc::default();
        let mut exchange = RequestExchange::new(RecordingTransport::default());
        exchange
            .send_request(&DisconnectRequest::new(), recorder(&log, "d"))
            .unwrap();

        assert_eq!(exchange.receive(&[0xA0]).unwrap(), 0);
        assert_eq!(exchange.receive(&[]).unwrap(), 0);
        assert_eq!(exchange.receive(&[0x00, 0x03]).unwrap(), 1);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_response_without_request_is_violation() {
        let mut exchange = RequestExchange::new(RecordingTransport::default());
        let err = exchange.receive(&[0xA0, 0x00, 0x03]).unwrap_err();
        assert!(matches!(err, ObexError::ProtocolViolation(_)));
    }

    #[test]
    fn test_unmatched_second_response_keeps_first_dispatch() {
        let log: Log = Arc::default();
        let mut exchange = RequestExchange::new(RecordingTransport::default());
        exchange
            .send_request(&DisconnectRequest::new(), recorder(&log, "d"))
            .unwrap();

        let err = exchange
            .receive(&[0xA0, 0x00, 0x03, 0xA0, 0x00, 0x03])
            .unwrap_err();
        assert!(matches!(err, ObexError::ProtocolViolation(_)));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_handler_can_send_follow_up() {
        let transport = RecordingTransport::default();
        let log: Log = Arc::default();
        let mut exchange = RequestExchange::new(transport.clone());

        let inner = recorder(&log, "second");
        exchange
            .send_request(&GetRequest::new(), move |exchange, response| {
                assert!(response.is_continue());
                exchange.send_request(&GetRequest::new(), inner).unwrap();
            })
            .unwrap();

        exchange.receive(&[0x90, 0x00, 0x03]).unwrap();
        assert_eq!(transport.frames().len(), 2);
        assert_eq!(exchange.pending_len(), 1);

        exchange.receive(&[0xA0, 0x00, 0x03]).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![("second", 0xA0)]);
    }

    #[test]
    fn test_send_failure_reports_and_dequeues() {
        let transport = RecordingTransport {
            fail_with: Some("socket closed".into()),
            ..Default::default()
        };
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut exchange = RequestExchange::new(transport);

        let sink = seen.clone();
        exchange.on_error(move |e| sink.lock().unwrap().push(e.to_string()));

        let err = exchange
            .send_request(&DisconnectRequest::new(), |_, _| {})
            .unwrap_err();

        assert!(matches!(err, ObexError::Transport(ref m) if m == "socket closed"));
        assert_eq!(exchange.pending_len(), 0);
        assert_eq!(exchange.last_error(), Some("Transport error: socket closed"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_on_error_replaces_previous_handler() {
        let first = Arc::new(Mutex::new(0));
        let second = Arc::new(Mutex::new(0));
        let mut exchange = RequestExchange::new(RecordingTransport::default());

        let counter = first.clone();
        exchange.on_error(move |_| *counter.lock().unwrap() += 1);
        let counter = second.clone();
        exchange.on_error(move |_| *counter.lock().unwrap() += 1);

        exchange.report_error(&ObexError::Transport("read failed".into()));

        assert_eq!(*first.lock().unwrap(), 0);
        assert_eq!(*second.lock().unwrap(), 1);
    }

    #[test]
    fn test_report_error_keeps_pending() {
        let mut exchange = RequestExchange::new(RecordingTransport::default());
        exchange
            .send_request(&DisconnectRequest::new(), |_, _| {})
            .unwrap();

        exchange.report_error(&ObexError::Transport("read failed".into()));
        assert_eq!(exchange.pending_len(), 1);
        assert_eq!(exchange.clear_pending(), 1);
        assert_eq!(exchange.pending_len(), 0);
    }
}
