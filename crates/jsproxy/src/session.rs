//! Session state: correlation ids, pending continuations, readiness
//! buffering and synchronous evaluation.
//!
//! A session is single-threaded. Every inbound message is handled by
//! [`Session::handle_message`], either driven externally or from the pump
//! loop inside [`Session::evaluate`]. Commands sent before the remote side
//! reports readiness are held in order and transmitted as one batch when
//! the `rendered` signal arrives.

use crate::callback::{
    event_handler, result_handler, CallbackEvent, CallbackResult, Callable, EventHandler,
    ResultHandler,
};
use crate::codec::{encode, HostValue, MAX_NESTING};
use crate::config::SessionConfig;
use crate::error::ProxyError;
use crate::messages::{self, parse_callback_results, Envelope, Inbound};
use crate::proxy::Proxy;
use crate::segment::{split_for_send, Reassembler};
use crate::transport::Transport;
use indexmap::IndexMap;
use jsproxy_command::{validate_command, Command, CommandError, MAX_CALLBACK_DEPTH};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// What happened to a batch handed to [`Session::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Transmitted under this correlation id.
    Sent(u64),
    /// Held until the remote side is ready.
    Buffered,
}

impl SendOutcome {
    pub fn id(&self) -> Option<u64> {
        match self {
            SendOutcome::Sent(id) => Some(*id),
            SendOutcome::Buffered => None,
        }
    }
}

enum Pending {
    /// One handler receiving the whole results value.
    Single(ResultHandler),
    /// Several merged batches, each receiving its own slice of the results.
    Split(Vec<(Range<usize>, ResultHandler)>),
}

/// Commands awaiting transmission, with the handlers of the batches they
/// came from.
#[derive(Default)]
struct OutboundBuffer {
    commands: Vec<Command>,
    handlers: Vec<(Range<usize>, ResultHandler)>,
    depth: u32,
    segment: Option<usize>,
}

impl OutboundBuffer {
    fn push_batch(&mut self, commands: Vec<Command>, handler: Option<ResultHandler>, depth: u32) {
        let start = self.commands.len();
        self.commands.extend(commands);
        if let Some(handler) = handler {
            self.handlers.push((start..self.commands.len(), handler));
        }
        self.depth = self.depth.max(depth);
    }

    fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.handlers.is_empty()
    }

    fn into_pending(self) -> Option<Pending> {
        let len = self.commands.len();
        let mut handlers = self.handlers;
        match handlers.len() {
            0 => None,
            1 if handlers[0].0 == (0..len) => handlers.pop().map(|(_, h)| Pending::Single(h)),
            _ => Some(Pending::Split(handlers)),
        }
    }
}

pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    ready: bool,
    counter: u64,
    buffer: OutboundBuffer,
    pending: HashMap<u64, Pending>,
    callbacks: HashMap<u64, EventHandler>,
    callables: HashMap<String, Command>,
    default_callback: Option<EventHandler>,
    fragments: Reassembler,
    pub(crate) fragile_generation: u64,
    unique_counter: u64,
    status: String,
    error_message: String,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Session::build(transport, SessionConfig::default())
    }

    /// Creates a session with `config`, which must pass [`SessionConfig::validate`].
    pub fn with_config(transport: T, config: SessionConfig) -> Result<Self, ProxyError> {
        config.validate()?;
        Ok(Session::build(transport, config))
    }

    fn build(transport: T, config: SessionConfig) -> Self {
        Session {
            transport,
            config,
            ready: false,
            counter: 0,
            buffer: OutboundBuffer::default(),
            pending: HashMap::new(),
            callbacks: HashMap::new(),
            callables: HashMap::new(),
            default_callback: None,
            fragments: Reassembler::new(),
            fragile_generation: 0,
            unique_counter: 0,
            status: String::new(),
            error_message: String::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Last diagnostic status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Last remote or callback error, for display.
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn buffered_commands(&self) -> &[Command] {
        &self.buffer.commands
    }

    /// Session-scoped unique number, used for generated DOM ids.
    pub fn unique_id(&mut self) -> u64 {
        self.unique_counter += 1;
        self.unique_counter
    }

    fn next_id(&mut self) -> u64 {
        let id = self.counter;
        self.counter += 1;
        id
    }

    fn set_status(&mut self, status: String) {
        trace!(status = %status);
        self.status = status;
    }

    // ── Outbound ───────────────────────────────────────────────────────────

    /// Sends a batch of commands.
    ///
    /// Every command is validated first; a malformed one fails the whole
    /// batch before anything is buffered or transmitted. While the remote
    /// side is not ready the batch is buffered. Once ready, anything still
    /// buffered is transmitted ahead of it in the same message.
    pub fn send(
        &mut self,
        commands: Vec<Command>,
        on_result: Option<ResultHandler>,
        depth: u32,
    ) -> Result<SendOutcome, ProxyError> {
        self.submit(commands, on_result, depth, None)
    }

    fn submit(
        &mut self,
        commands: Vec<Command>,
        on_result: Option<ResultHandler>,
        depth: u32,
        segment: Option<usize>,
    ) -> Result<SendOutcome, ProxyError> {
        check_depth(depth)?;
        let commands = validate_all(commands)?;
        self.buffer.push_batch(commands, on_result, depth);
        if segment.is_some() {
            self.buffer.segment = segment;
        }
        if !self.ready {
            debug!(buffered = self.buffer.commands.len(), "remote not ready; buffering batch");
            let buffered = self.buffer.commands.len();
            self.set_status(format!("awaiting render: {} commands buffered", buffered));
            return Ok(SendOutcome::Buffered);
        }
        self.transmit_buffer().map(SendOutcome::Sent)
    }

    /// Sends one command with the configured depth.
    pub fn send_command(
        &mut self,
        command: impl Into<Command>,
        on_result: Option<ResultHandler>,
    ) -> Result<SendOutcome, ProxyError> {
        let depth = self.config.depth;
        self.send(vec![command.into()], on_result, depth)
    }

    /// Like [`Session::send`], but the serialized batch always travels as
    /// `cm_fragment` / `cm_final` chunks of `chunk_size` characters.
    pub fn send_segmented(
        &mut self,
        commands: Vec<Command>,
        on_result: Option<ResultHandler>,
        depth: u32,
        chunk_size: usize,
    ) -> Result<SendOutcome, ProxyError> {
        if chunk_size == 0 {
            return Err(ProxyError::InvalidSegmentSize);
        }
        self.submit(commands, on_result, depth, Some(chunk_size))
    }

    /// Appends a command to the buffer without sending it.
    ///
    /// With `auto_flush` configured the buffer is flushed right away.
    pub fn queue(&mut self, command: impl Into<Command>) -> Result<Command, ProxyError> {
        let command = validate_one(command.into())?;
        let depth = self.config.depth;
        self.buffer.push_batch(vec![command.clone()], None, depth);
        if self.config.auto_flush {
            self.flush(None)?;
        }
        Ok(command)
    }

    /// Sends everything queued, delivering the combined results to
    /// `on_result`.
    pub fn flush(&mut self, on_result: Option<ResultHandler>) -> Result<SendOutcome, ProxyError> {
        let depth = self.config.depth;
        self.send(Vec::new(), on_result, depth)
    }

    /// Handles the readiness signal. Only the first call has any effect.
    pub fn mark_rendered(&mut self) -> Result<(), ProxyError> {
        if self.ready {
            debug!("duplicate readiness signal ignored");
            return Ok(());
        }
        self.ready = true;
        info!(buffered = self.buffer.commands.len(), "remote side ready");
        self.set_status("rendered".into());
        if !self.buffer.is_empty() {
            self.transmit_buffer()?;
        }
        Ok(())
    }

    /// Sends the buffer as one batch. If the transport fails, the commands and
    /// their handlers go back into the buffer so a later send or flush retries
    /// them. A segmented batch may already have delivered some fragments by then.
    fn transmit_buffer(&mut self) -> Result<u64, ProxyError> {
        let buffer = std::mem::take(&mut self.buffer);
        let depth = buffer.depth.max(1);
        let count = buffer.commands.len();
        let wire: Vec<Value> = buffer.commands.iter().map(Command::to_wire).collect();
        let id = self.next_id();

        let result = match buffer.segment.or(self.config.segment_size) {
            Some(size) => self.transmit_segmented(id, wire, depth, size),
            None => self.transmit(Envelope::commands(id, wire, depth)),
        };
        if let Err(e) = result {
            warn!(id, count, error = %e, "send failed; batch kept in buffer");
            self.buffer = buffer;
            self.error_message = e.to_string();
            return Err(e);
        }
        if let Some(pending) = buffer.into_pending() {
            self.pending.insert(id, pending);
        }
        debug!(id, count, depth, "sent command batch");
        self.set_status(format!("sent batch {} ({} commands)", id, count));
        Ok(id)
    }

    fn transmit_segmented(
        &mut self,
        id: u64,
        wire: Vec<Value>,
        depth: u32,
        size: usize,
    ) -> Result<(), ProxyError> {
        let text = serde_json::to_string(&json!([id, wire, depth]))?;
        let segments = split_for_send(&text, size)?;
        debug!(id, fragments = segments.len(), size, "segmenting command batch");
        for segment in segments {
            let indicator = if segment.is_final {
                messages::CM_FINAL
            } else {
                messages::CM_FRAGMENT
            };
            self.transmit(Envelope::new(indicator, Value::String(segment.chunk)))?;
        }
        Ok(())
    }

    fn transmit(&mut self, envelope: Envelope) -> Result<(), ProxyError> {
        if self.config.verbose {
            debug!(indicator = %envelope.indicator, payload = %envelope.payload, "outbound");
        } else {
            trace!(indicator = %envelope.indicator, "outbound");
        }
        self.transport.send(envelope)
    }

    // ── Callbacks ──────────────────────────────────────────────────────────

    /// Registers a recurring handler and returns the command that creates
    /// its remote stub.
    ///
    /// `depth` bounds how deeply the remote side converts invocation
    /// arguments and must be within `1..=5`. With `segmented`, invocations
    /// come back as fragments of at most that many characters.
    pub fn callback(
        &mut self,
        handler: EventHandler,
        data: Value,
        depth: u32,
        segmented: Option<u64>,
    ) -> Result<Command, ProxyError> {
        check_depth(depth)?;
        if segmented == Some(0) {
            return Err(ProxyError::InvalidSegmentSize);
        }
        let id = self.next_id();
        self.callbacks.insert(id, handler);
        debug!(id, depth, "registered callback");
        Ok(Command::Callback {
            id,
            data,
            depth,
            segmented,
        })
    }

    /// Registers a closure under `key`; repeated calls with the same key
    /// return the identical command.
    pub fn callable<F>(&mut self, key: &str, f: F) -> Result<Command, ProxyError>
    where
        F: FnMut(&CallbackEvent) -> CallbackResult + 'static,
    {
        if let Some(cmd) = self.callables.get(key) {
            return Ok(cmd.clone());
        }
        let depth = self.config.depth;
        self.register_callable(&Callable::from_handler(key, event_handler(f)), depth)
    }

    /// Registration for a [`Callable`], cached by its key.
    pub fn register_callable(
        &mut self,
        callable: &Callable,
        depth: u32,
    ) -> Result<Command, ProxyError> {
        if let Some(cmd) = self.callables.get(callable.key()) {
            return Ok(cmd.clone());
        }
        let data = Value::String(callable.key().into());
        let cmd = self.callback(callable.handler(), data, depth, None)?;
        self.callables.insert(callable.key().to_string(), cmd.clone());
        Ok(cmd)
    }

    /// Replaces every callable inside `value` with its registration.
    pub fn wrap_callables(
        &mut self,
        value: HostValue,
        depth: u32,
    ) -> Result<HostValue, ProxyError> {
        self.wrap_at(value, depth, 0)
    }

    fn wrap_at(
        &mut self,
        value: HostValue,
        depth: u32,
        nesting: usize,
    ) -> Result<HostValue, ProxyError> {
        if nesting > MAX_NESTING {
            return Err(CommandError::UntranslatableValue {
                type_name: format!("value nested deeper than {}", MAX_NESTING),
            }
            .into());
        }
        Ok(match value {
            HostValue::Callable(c) => HostValue::Command(self.register_callable(&c, depth)?),
            HostValue::List(items) => HostValue::List(
                items
                    .into_iter()
                    .map(|item| self.wrap_at(item, depth, nesting + 1))
                    .collect::<Result<_, _>>()?,
            ),
            HostValue::Map(entries) => {
                let mut out = IndexMap::with_capacity(entries.len());
                for (k, v) in entries {
                    out.insert(k, self.wrap_at(v, depth, nesting + 1)?);
                }
                HostValue::Map(out)
            }
            other => other,
        })
    }

    /// Lowers a host value, callables included, to a command.
    pub fn lower(&mut self, value: impl Into<HostValue>) -> Result<Command, ProxyError> {
        let depth = self.config.depth;
        let value = self.wrap_callables(value.into(), depth)?;
        Ok(encode(&value)?)
    }

    /// Invokes `target`, registering any callables among the arguments.
    pub fn invoke(&mut self, target: &Proxy, args: Vec<HostValue>) -> Result<Proxy, ProxyError> {
        let depth = self.config.depth;
        let args = args
            .into_iter()
            .map(|arg| self.wrap_callables(arg, depth))
            .collect::<Result<Vec<_>, _>>()?;
        target.call(args)
    }

    /// Drops the handler for callback `id`. Later deliveries are no-ops.
    pub fn forget_callback(&mut self, id: u64) -> bool {
        let removed = self.callbacks.remove(&id).is_some();
        self.callables
            .retain(|_, cmd| !matches!(cmd, Command::Callback { id: cid, .. } if *cid == id));
        removed
    }

    /// Drops the callable registered under `key`.
    pub fn forget_callable(&mut self, key: &str) -> bool {
        match self.callables.remove(key) {
            Some(Command::Callback { id, .. }) => self.callbacks.remove(&id).is_some(),
            _ => false,
        }
    }

    /// Handler for callback events whose id has no registration.
    pub fn set_default_callback(&mut self, handler: Option<EventHandler>) {
        self.default_callback = handler;
    }

    // ── Inbound ────────────────────────────────────────────────────────────

    /// Dispatches one inbound message.
    ///
    /// Errors raised by host handlers propagate from here after the
    /// diagnostic slots are updated; one-shot handlers have already been
    /// removed by then, so the session stays consistent.
    pub fn handle_message(&mut self, envelope: Envelope) -> Result<(), ProxyError> {
        if self.config.verbose {
            debug!(indicator = %envelope.indicator, payload = %envelope.payload, "inbound");
        } else {
            trace!(indicator = %envelope.indicator, "inbound");
        }
        let inbound = Inbound::parse(&envelope).map_err(|e| self.record_error(e))?;
        match inbound {
            Inbound::Results { id, value, error } => self.deliver_results(id, value, error),
            Inbound::CallbackResults(event) => self.deliver_event(event),
            Inbound::Fragment(chunk) => {
                self.fragments.push(&chunk);
                self.set_status(format!("callback fragment {} received", self.fragments.len()));
                Ok(())
            }
            Inbound::Final(chunk) => {
                let payload = self.fragments.finish(&chunk).map_err(|e| self.record_error(e))?;
                let event = parse_callback_results(&payload).map_err(|e| self.record_error(e))?;
                self.deliver_event(event)
            }
            Inbound::Rendered(true) => self.mark_rendered(),
            Inbound::Rendered(false) => Ok(()),
            Inbound::Unknown(indicator) => {
                warn!(indicator = %indicator, "unknown message indicator");
                self.set_status(format!("unknown message indicator {:?}", indicator));
                Ok(())
            }
        }
    }

    fn record_error(&mut self, e: ProxyError) -> ProxyError {
        self.error_message = e.to_string();
        e
    }

    fn deliver_results(
        &mut self,
        id: u64,
        value: Value,
        error: Option<String>,
    ) -> Result<(), ProxyError> {
        let Some(pending) = self.pending.remove(&id) else {
            debug!(id, "results for unknown correlation id ignored");
            self.set_status(format!("orphan results {}", id));
            return Ok(());
        };
        if let Some(message) = &error {
            warn!(id, error = %message, "remote execution failed");
            self.error_message = message.clone();
        }
        self.set_status(format!("results {}", id));

        let outcome = match pending {
            Pending::Single(handler) => handler(match error {
                Some(message) => Err(ProxyError::RemoteExecution(message)),
                None => Ok(value),
            }),
            Pending::Split(handlers) => {
                let results = match value {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                let mut first_failure = None;
                for (range, handler) in handlers {
                    let slice = if range.end <= results.len() {
                        Ok(Value::Array(results[range].to_vec()))
                    } else {
                        Err(ProxyError::RemoteExecution(
                            error.clone().unwrap_or_else(|| "missing results".into()),
                        ))
                    };
                    if let Err(e) = handler(slice) {
                        first_failure.get_or_insert(e);
                    }
                }
                first_failure.map_or(Ok(()), Err)
            }
        };
        outcome.map_err(|e| {
            let err = ProxyError::Callback {
                id,
                message: e.to_string(),
            };
            self.record_error(err)
        })
    }

    fn deliver_event(&mut self, event: CallbackEvent) -> Result<(), ProxyError> {
        let handler = match self.callbacks.get(&event.id) {
            Some(h) => Rc::clone(h),
            None => match &self.default_callback {
                Some(h) => Rc::clone(h),
                None => {
                    debug!(id = event.id, "callback results for unknown id ignored");
                    self.set_status(format!("orphan callback {}", event.id));
                    return Ok(());
                }
            },
        };
        self.set_status(format!("callback {} #{}", event.id, event.counter));
        let outcome = (&mut *handler.borrow_mut())(&event);
        outcome.map_err(|e| {
            let err = ProxyError::Callback {
                id: event.id,
                message: e.to_string(),
            };
            self.record_error(err)
        })
    }

    /// Waits up to `wait` for one message and handles it.
    pub fn pump(&mut self, wait: Duration) -> Result<bool, ProxyError> {
        match self.transport.poll(wait)? {
            Some(envelope) => {
                self.handle_message(envelope)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Handles every message that is already available.
    pub fn drain(&mut self) -> Result<usize, ProxyError> {
        let mut handled = 0;
        while self.pump(Duration::ZERO)? {
            handled += 1;
        }
        Ok(handled)
    }

    // ── Synchronous evaluation ─────────────────────────────────────────────

    /// Sends `command` and pumps messages until its result arrives.
    pub fn evaluate(
        &mut self,
        command: impl Into<Command>,
        timeout: Duration,
    ) -> Result<Value, ProxyError> {
        let mut results = self.evaluate_commands(vec![command.into()], timeout)?;
        if results.is_empty() {
            return Err(ProxyError::Protocol("empty results for evaluated command".into()));
        }
        Ok(results.swap_remove(0))
    }

    /// Sends a batch and pumps messages until its results arrive or
    /// `timeout` elapses. Other messages are handled while waiting.
    pub fn evaluate_commands(
        &mut self,
        commands: Vec<Command>,
        timeout: Duration,
    ) -> Result<Vec<Value>, ProxyError> {
        let slot: Rc<RefCell<Option<Result<Value, ProxyError>>>> = Rc::new(RefCell::new(None));
        let writer = Rc::clone(&slot);
        let handler = result_handler(move |result| {
            *writer.borrow_mut() = Some(result);
            Ok(())
        });
        let depth = self.config.depth;
        let outcome = self.send(commands, Some(handler), depth)?;

        let start = Instant::now();
        let poll = self.config.poll_interval();
        loop {
            if let Some(result) = slot.borrow_mut().take() {
                return match result? {
                    Value::Array(items) => Ok(items),
                    other => Err(ProxyError::Protocol(format!(
                        "results must be a list, got {}",
                        other
                    ))),
                };
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                if let Some(id) = outcome.id() {
                    self.pending.remove(&id);
                }
                warn!(?elapsed, ?timeout, "timed out waiting for command results");
                let err = ProxyError::SyncTimeout { elapsed, timeout };
                return Err(self.record_error(err));
            }
            self.pump(poll.min(timeout - elapsed))?;
        }
    }

    /// [`Session::evaluate`] with the configured default timeout.
    pub fn evaluate_default(&mut self, command: impl Into<Command>) -> Result<Value, ProxyError> {
        let timeout = self.config.sync_timeout();
        self.evaluate(command, timeout)
    }

    // ── Buffered conveniences ──────────────────────────────────────────────

    /// Queues `element[name] = reference` and returns `element[name]`.
    pub fn save(
        &mut self,
        name: &str,
        reference: impl Into<HostValue>,
    ) -> Result<Proxy, ProxyError> {
        let element = Proxy::element();
        let value = self.lower(reference)?;
        self.queue(Command::set(element.command().clone(), name, value))?;
        Ok(element.attr(name))
    }

    /// Queues construction of `new ctor(...args)` saved as `element[name]`.
    pub fn save_new(
        &mut self,
        name: &str,
        ctor: &Proxy,
        args: Vec<HostValue>,
    ) -> Result<Proxy, ProxyError> {
        let instance = self.construct(ctor, args)?;
        self.save(name, instance)
    }

    /// `element.New(ctor, [args])`.
    pub fn construct(&mut self, ctor: &Proxy, args: Vec<HostValue>) -> Result<Proxy, ProxyError> {
        let args = self.lower(HostValue::List(args))?;
        Proxy::element().method("New", vec![ctor.into(), HostValue::Command(args)])
    }

    /// A remote function built from parameter names and a body.
    pub fn function(&mut self, params: &[&str], body: &str) -> Result<Proxy, ProxyError> {
        let mut args: Vec<HostValue> = params.iter().map(|p| HostValue::from(*p)).collect();
        args.push(body.into());
        self.construct(&Proxy::window().attr("Function"), args)
    }

    /// Queues a remote function saved as `element[name]`.
    pub fn save_function(
        &mut self,
        name: &str,
        params: &[&str],
        body: &str,
    ) -> Result<Proxy, ProxyError> {
        let f = self.function(params, body)?;
        self.save(name, f)
    }

    /// Breaks in the remote debugger, passing `element`.
    pub fn js_debug(&mut self) -> Result<SendOutcome, ProxyError> {
        let f = self.function(&["element"], "debugger;")?;
        let call = f.call(vec![Proxy::element().into()])?;
        self.send_command(call, None)
    }
}

fn check_depth(depth: u32) -> Result<(), ProxyError> {
    if depth == 0 || depth > MAX_CALLBACK_DEPTH {
        return Err(ProxyError::InvalidDepth(depth));
    }
    Ok(())
}

fn validate_one(command: Command) -> Result<Command, ProxyError> {
    Ok(validate_command(&command.to_wire(), true)?)
}

fn validate_all(commands: Vec<Command>) -> Result<Vec<Command>, ProxyError> {
    commands
        .into_iter()
        .enumerate()
        .map(|(index, command)| {
            validate_one(command).map_err(|e| match e {
                ProxyError::Command(CommandError::InvalidCommand(msg)) => {
                    CommandError::InvalidCommand(format!(
                        "Error in command [index = {}] ({}).",
                        index, msg
                    ))
                    .into()
                }
                other => other,
            })
        })
        .collect()
}
