//! Message transports.

use crate::error::ProxyError;
use crate::messages::Envelope;
use crate::remote::Interpreter;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// A bidirectional channel for envelopes.
///
/// `poll` is the host's scheduler tick: it may block for at most `wait` and
/// returns the next inbound envelope if one arrived.
pub trait Transport {
    fn send(&mut self, envelope: Envelope) -> Result<(), ProxyError>;
    fn poll(&mut self, wait: Duration) -> Result<Option<Envelope>, ProxyError>;
}

type Responder = Box<dyn FnMut(&Envelope) -> Vec<Envelope>>;

/// In-memory transport that records outbound envelopes and replays an inbox.
///
/// An optional responder produces replies to each outbound envelope, which
/// are appended to the inbox.
#[derive(Default)]
pub struct MemoryTransport {
    sent: Vec<Envelope>,
    inbox: VecDeque<Envelope>,
    responder: Option<Responder>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&Envelope) -> Vec<Envelope> + 'static,
    {
        MemoryTransport {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Queues an inbound envelope.
    pub fn push_inbound(&mut self, envelope: Envelope) {
        self.inbox.push_back(envelope);
    }

    pub fn sent(&self) -> &[Envelope] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.sent)
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("sent", &self.sent)
            .field("inbox", &self.inbox)
            .field("responder", &self.responder.is_some())
            .finish()
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, envelope: Envelope) -> Result<(), ProxyError> {
        if let Some(responder) = self.responder.as_mut() {
            self.inbox.extend(responder(&envelope));
        }
        self.sent.push(envelope);
        Ok(())
    }

    fn poll(&mut self, wait: Duration) -> Result<Option<Envelope>, ProxyError> {
        match self.inbox.pop_front() {
            Some(envelope) => Ok(Some(envelope)),
            None => {
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
                Ok(None)
            }
        }
    }
}

/// Transport wired straight to an in-process [`Interpreter`].
///
/// The remote side announces readiness with a `rendered` envelope as soon
/// as the transport is created.
pub struct LoopbackTransport {
    interpreter: Interpreter,
    inbox: VecDeque<Envelope>,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::with_interpreter(Interpreter::new())
    }

    pub fn with_interpreter(interpreter: Interpreter) -> Self {
        let mut inbox = VecDeque::new();
        inbox.push_back(Envelope::rendered());
        LoopbackTransport { interpreter, inbox }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Mutable access for driving remote-side events from tests.
    pub fn interpreter_mut(&mut self) -> &mut Interpreter {
        &mut self.interpreter
    }

    fn drain_remote(&mut self) {
        while let Some(envelope) = self.interpreter.take_outbound() {
            self.inbox.push_back(envelope);
        }
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, envelope: Envelope) -> Result<(), ProxyError> {
        self.interpreter.receive(&envelope)?;
        self.drain_remote();
        Ok(())
    }

    fn poll(&mut self, _wait: Duration) -> Result<Option<Envelope>, ProxyError> {
        // Events raised directly on the interpreter land here too.
        self.drain_remote();
        Ok(self.inbox.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{self, Inbound};
    use serde_json::json;
    use std::time::Instant;

    #[test]
    fn memory_transport_replays_responses() {
        let mut t = MemoryTransport::with_responder(|env| {
            vec![Envelope::results(env.payload[0].as_u64().unwrap_or(0), json!([1]), None)]
        });
        t.send(Envelope::commands(9, vec![json!(["window"])], 1)).unwrap();
        assert_eq!(t.sent().len(), 1);
        let reply = t.poll(Duration::ZERO).unwrap().unwrap();
        assert_eq!(reply.payload, json!([9, [1]]));
        assert!(t.poll(Duration::ZERO).unwrap().is_none());
    }

    #[test]
    fn memory_transport_waits_when_idle() {
        let mut t = MemoryTransport::new();
        let start = Instant::now();
        assert!(t.poll(Duration::from_millis(5)).unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn loopback_announces_readiness_and_executes() {
        let mut t = LoopbackTransport::new();
        let first = t.poll(Duration::ZERO).unwrap().unwrap();
        assert_eq!(first.indicator, messages::RENDERED);
        t.send(Envelope::commands(0, vec![json!(["method", ["window"], "parseInt", "7"])], 1))
            .unwrap();
        let reply = t.poll(Duration::ZERO).unwrap().unwrap();
        assert_eq!(
            Inbound::parse(&reply).unwrap(),
            Inbound::Results { id: 0, value: json!([7]), error: None }
        );
    }
}
