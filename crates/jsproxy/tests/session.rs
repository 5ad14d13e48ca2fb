use jsproxy::messages::{CALLBACK_RESULTS, CM_FINAL, CM_FRAGMENT, COMMANDS, JCB_FINAL, JCB_RESULTS};
use jsproxy::{
    event_handler, reassemble, result_handler, Callable, CallbackEvent, Command, Envelope,
    MemoryTransport, ProxyError, SendOutcome, Session, SessionConfig, Transport,
};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

type Seen<T> = Rc<RefCell<Vec<T>>>;

fn recorder() -> (Seen<Result<Value, String>>, impl Fn() -> jsproxy::ResultHandler) {
    let seen: Seen<Result<Value, String>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let make = move || {
        let sink = Rc::clone(&sink);
        result_handler(move |r| {
            sink.borrow_mut().push(r.map_err(|e| e.to_string()));
            Ok(())
        })
    };
    (seen, make)
}

fn ready_session() -> Session<MemoryTransport> {
    let mut s = Session::new(MemoryTransport::new());
    s.mark_rendered().unwrap();
    s
}

#[test]
fn buffered_batch_is_sent_when_ready() {
    let mut s = Session::new(MemoryTransport::new());
    let get = Command::get(Command::window(), "location");
    let outcome = s.send(vec![get], None, 1).unwrap();
    assert_eq!(outcome, SendOutcome::Buffered);
    assert!(s.transport().sent().is_empty());

    s.handle_message(Envelope::rendered()).unwrap();
    let sent = s.transport().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].indicator, COMMANDS);
    assert_eq!(sent[0].payload, json!([0, [["get", ["window"], "location"]], 1]));
    assert!(s.is_ready());
}

#[test]
fn buffered_commands_precede_later_ones() {
    let mut s = Session::new(MemoryTransport::new());
    s.send(vec![Command::window()], None, 1).unwrap();
    s.send(vec![Command::element()], None, 1).unwrap();
    s.mark_rendered().unwrap();
    s.send(vec![Command::get(Command::window(), "x")], None, 1).unwrap();

    let batches: Vec<Value> = s
        .transport()
        .sent()
        .iter()
        .flat_map(|env| env.payload[1].as_array().cloned().unwrap_or_default())
        .collect();
    assert_eq!(
        batches,
        vec![json!(["window"]), json!(["element"]), json!(["get", ["window"], "x"])]
    );
}

#[test]
fn queued_commands_ride_along_with_the_next_send() {
    let mut s = ready_session();
    s.queue(Command::window()).unwrap();
    assert!(s.transport().sent().is_empty());
    s.send(vec![Command::element()], None, 1).unwrap();
    let sent = s.transport().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload[1], json!([["window"], ["element"]]));
}

#[test]
fn auto_flush_sends_every_queued_command() {
    let config = SessionConfig {
        auto_flush: true,
        ..SessionConfig::default()
    };
    let mut s = Session::with_config(MemoryTransport::new(), config).unwrap();
    s.mark_rendered().unwrap();
    s.queue(Command::window()).unwrap();
    s.queue(Command::element()).unwrap();
    assert_eq!(s.transport().sent().len(), 2);
}

/// Memory transport whose sends fail while `offline` is set.
#[derive(Default)]
struct FlakyTransport {
    offline: bool,
    inner: MemoryTransport,
}

impl Transport for FlakyTransport {
    fn send(&mut self, envelope: Envelope) -> Result<(), ProxyError> {
        if self.offline {
            return Err(ProxyError::Transport("connection reset".into()));
        }
        self.inner.send(envelope)
    }

    fn poll(&mut self, wait: Duration) -> Result<Option<Envelope>, ProxyError> {
        self.inner.poll(wait)
    }
}

#[test]
fn failed_readiness_flush_keeps_the_buffer() {
    let (seen, handler) = recorder();
    let transport = FlakyTransport {
        offline: true,
        ..FlakyTransport::default()
    };
    let mut s = Session::new(transport);
    s.send(vec![Command::window()], Some(handler()), 1).unwrap();

    let err = s.mark_rendered().unwrap_err();
    assert!(matches!(err, ProxyError::Transport(_)));
    assert!(s.is_ready());
    assert_eq!(s.buffered_commands(), &[Command::window()]);
    assert_eq!(s.pending_count(), 0);
    assert!(s.error_message().contains("connection reset"));

    s.transport_mut().offline = false;
    let outcome = s.flush(None).unwrap();
    let id = outcome.id().unwrap();
    assert!(s.buffered_commands().is_empty());
    let sent = s.transport().inner.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload[1], json!([["window"]]));

    s.handle_message(Envelope::results(id, json!([7]), None)).unwrap();
    assert_eq!(*seen.borrow(), vec![Ok(json!([7]))]);
}

#[test]
fn failed_send_is_retried_with_the_next_batch() {
    let (seen, handler) = recorder();
    let mut s = Session::new(FlakyTransport::default());
    s.mark_rendered().unwrap();

    s.transport_mut().offline = true;
    assert!(s.send(vec![Command::element()], Some(handler()), 1).is_err());
    assert_eq!(s.buffered_commands(), &[Command::element()]);
    assert!(s.transport().inner.sent().is_empty());

    s.transport_mut().offline = false;
    let get = Command::get(Command::window(), "x");
    let id = s.send(vec![get], Some(handler()), 1).unwrap().id().unwrap();
    let sent = s.transport().inner.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload[1], json!([["element"], ["get", ["window"], "x"]]));

    s.handle_message(Envelope::results(id, json!([1, 2]), None)).unwrap();
    assert_eq!(*seen.borrow(), vec![Ok(json!([1])), Ok(json!([2]))]);
    assert_eq!(s.pending_count(), 0);
}

#[test]
fn merged_batches_get_their_own_results() {
    let (seen, handler) = recorder();
    let mut s = Session::new(MemoryTransport::new());
    s.send(vec![Command::window()], Some(handler()), 1).unwrap();
    s.send(vec![Command::element(), Command::get(Command::window(), "y")], Some(handler()), 1)
        .unwrap();
    s.mark_rendered().unwrap();
    assert_eq!(s.pending_count(), 1);

    s.handle_message(Envelope::results(0, json!([1, 2, 3]), None)).unwrap();
    assert_eq!(*seen.borrow(), vec![Ok(json!([1])), Ok(json!([2, 3]))]);
    assert_eq!(s.pending_count(), 0);
}

#[test]
fn partial_results_fail_the_unfinished_batches() {
    let (seen, handler) = recorder();
    let mut s = Session::new(MemoryTransport::new());
    s.send(vec![Command::window()], Some(handler()), 1).unwrap();
    s.send(vec![Command::element()], Some(handler()), 1).unwrap();
    s.mark_rendered().unwrap();

    s.handle_message(Envelope::results(0, json!([1]), Some("TypeError: nope")))
        .unwrap();
    let seen = seen.borrow();
    assert_eq!(seen[0], Ok(json!([1])));
    assert!(seen[1].as_ref().unwrap_err().contains("TypeError: nope"));
    assert_eq!(s.error_message(), "TypeError: nope");
}

#[test]
fn evaluate_returns_the_first_result() {
    let transport = MemoryTransport::with_responder(|env| {
        if env.indicator != COMMANDS {
            return Vec::new();
        }
        let id = env.payload[0].as_u64().unwrap_or(0);
        vec![Envelope::results(id, json!([42]), None)]
    });
    let mut s = Session::new(transport);
    s.mark_rendered().unwrap();
    let call = Command::call(Command::window(), "parseInt", vec!["42".into()]);
    let value = s.evaluate(call, Duration::from_millis(1000)).unwrap();
    assert_eq!(value, json!(42));
    assert_eq!(s.pending_count(), 0);
}

#[test]
fn evaluate_times_out_and_forgets_the_request() {
    let mut s = ready_session();
    let timeout = Duration::from_millis(10);
    let start = Instant::now();
    let err = s.evaluate(Command::window(), timeout).unwrap_err();
    assert!(start.elapsed() >= timeout);
    match err {
        ProxyError::SyncTimeout { elapsed, timeout: t } => {
            assert!(elapsed >= timeout);
            assert_eq!(t, timeout);
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert_eq!(s.pending_count(), 0);

    // A late reply for the abandoned id is ignored.
    s.handle_message(Envelope::results(0, json!([1]), None)).unwrap();
    assert_eq!(s.status(), "orphan results 0");
}

#[test]
fn evaluate_surfaces_remote_errors() {
    let transport = MemoryTransport::with_responder(|env| {
        let id = env.payload[0].as_u64().unwrap_or(0);
        vec![Envelope::results(id, json!([]), Some("ReferenceError: nope"))]
    });
    let mut s = Session::new(transport);
    s.mark_rendered().unwrap();
    let err = s.evaluate(Command::window(), Duration::from_secs(1)).unwrap_err();
    assert!(matches!(err, ProxyError::RemoteExecution(ref m) if m == "ReferenceError: nope"));
}

#[test]
fn segmented_callback_results_are_reassembled() {
    let mut s = ready_session();
    s.callback(event_handler(|_| Ok(())), Value::Null, 1, None).unwrap();
    let events: Seen<CallbackEvent> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    let cb = s
        .callback(
            event_handler(move |e| {
                sink.borrow_mut().push(e.clone());
                Ok(())
            }),
            Value::Null,
            1,
            Some(5),
        )
        .unwrap();
    assert!(matches!(cb, Command::Callback { id: 1, segmented: Some(5), .. }));

    s.handle_message(Envelope::new(JCB_RESULTS, json!("[1,2,"))).unwrap();
    assert!(events.borrow().is_empty());
    s.handle_message(Envelope::new(JCB_FINAL, json!("3]"))).unwrap();

    let events = events.borrow();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, 1);
    assert_eq!(events[0].data, json!(2));
    assert_eq!(events[0].arguments, json!(3));
    assert_eq!(reassemble(["[1,2,", "3]"]).unwrap(), json!([1, 2, 3]));
}

#[test]
fn callbacks_fire_on_every_delivery() {
    let mut s = ready_session();
    let count = Rc::new(RefCell::new(0));
    let c = Rc::clone(&count);
    let cmd = s
        .callback(
            event_handler(move |e| {
                assert_eq!(e.argument(0), Some(&json!("a")));
                *c.borrow_mut() += 1;
                Ok(())
            }),
            json!("data"),
            2,
            None,
        )
        .unwrap();
    let Command::Callback { id, .. } = cmd else {
        panic!("expected a callback command");
    };
    for counter in 1..=2 {
        s.handle_message(Envelope::callback_results(id, json!("data"), json!({"0": "a"}), counter))
            .unwrap();
    }
    assert_eq!(*count.borrow(), 2);

    assert!(s.forget_callback(id));
    s.handle_message(Envelope::callback_results(id, json!("data"), json!({"0": "a"}), 3))
        .unwrap();
    assert_eq!(*count.borrow(), 2);
}

#[test]
fn callable_registration_is_cached_by_key() {
    let mut s = ready_session();
    let a = s.callable("clicked", |_| Ok(())).unwrap();
    let b = s.callable("clicked", |_| Ok(())).unwrap();
    assert_eq!(a, b);
    let callable = Callable::new("clicked", |_| Ok(()));
    assert_eq!(s.register_callable(&callable, 1).unwrap(), a);
    let other = s.callable("hovered", |_| Ok(())).unwrap();
    assert_ne!(a, other);
    assert!(matches!(a, Command::Callback { ref data, .. } if data == &json!("clicked")));
}

#[test]
fn orphan_deliveries_are_ignored_or_defaulted() {
    let mut s = ready_session();
    s.handle_message(Envelope::results(77, json!([]), None)).unwrap();
    s.handle_message(Envelope::callback_results(78, Value::Null, json!({}), 1))
        .unwrap();
    assert_eq!(s.status(), "orphan callback 78");

    let seen: Seen<u64> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    s.set_default_callback(Some(event_handler(move |e| {
        sink.borrow_mut().push(e.id);
        Ok(())
    })));
    s.handle_message(Envelope::callback_results(79, Value::Null, json!({}), 1))
        .unwrap();
    assert_eq!(*seen.borrow(), vec![79]);
}

#[test]
fn handler_errors_propagate_and_the_session_survives() {
    let mut s = ready_session();
    let outcome = s
        .send(
            vec![Command::window()],
            Some(result_handler(|_| Err("boom".into()))),
            1,
        )
        .unwrap();
    let id = outcome.id().unwrap();
    let err = s.handle_message(Envelope::results(id, json!([1]), None)).unwrap_err();
    assert!(matches!(
        err,
        ProxyError::Callback { id: i, ref message } if i == id && message == "boom"
    ));
    assert!(s.error_message().contains("boom"));
    assert_eq!(s.pending_count(), 0);

    let (seen, handler) = recorder();
    let next = s.send(vec![Command::element()], Some(handler()), 1).unwrap();
    s.handle_message(Envelope::results(next.id().unwrap(), json!([2]), None))
        .unwrap();
    assert_eq!(*seen.borrow(), vec![Ok(json!([2]))]);
}

#[test]
fn callback_handler_errors_propagate() {
    let mut s = ready_session();
    let cmd = s
        .callback(event_handler(|_| Err("bad click".into())), Value::Null, 1, None)
        .unwrap();
    let Command::Callback { id, .. } = cmd else {
        panic!("expected a callback command");
    };
    let err = s
        .handle_message(Envelope::new(CALLBACK_RESULTS, json!([id, null, {}, 1])))
        .unwrap_err();
    assert!(matches!(err, ProxyError::Callback { ref message, .. } if message == "bad click"));
}

#[test]
fn unknown_indicators_only_update_status() {
    let mut s = ready_session();
    s.handle_message(Envelope::new("telemetry", json!({}))).unwrap();
    assert!(s.status().contains("telemetry"));
}

#[test]
fn malformed_inbound_messages_are_protocol_errors() {
    let mut s = ready_session();
    let err = s.handle_message(Envelope::new("results", json!("x"))).unwrap_err();
    assert!(matches!(err, ProxyError::Protocol(_)));
    assert!(!s.error_message().is_empty());
}

#[test]
fn configured_segmentation_splits_every_batch() {
    let config = SessionConfig {
        segment_size: Some(8),
        ..SessionConfig::default()
    };
    let mut s = Session::with_config(MemoryTransport::new(), config).unwrap();
    s.mark_rendered().unwrap();
    s.send(vec![Command::get(Command::window(), "document")], None, 1).unwrap();

    let sent = s.transport().sent();
    assert!(sent.len() > 1);
    let (last, fragments) = sent.split_last().unwrap();
    assert_eq!(last.indicator, CM_FINAL);
    assert!(fragments.iter().all(|env| env.indicator == CM_FRAGMENT));
    let payload = reassemble(sent.iter().map(|env| env.payload.as_str().unwrap())).unwrap();
    assert_eq!(payload, json!([0, [["get", ["window"], "document"]], 1]));
}

#[test]
fn send_segmented_applies_to_one_batch() {
    let mut s = ready_session();
    s.send_segmented(vec![Command::window()], None, 1, 4).unwrap();
    s.send(vec![Command::element()], None, 1).unwrap();
    let sent = s.transport().sent();
    assert_eq!(sent.last().unwrap().indicator, COMMANDS);
    assert!(sent[..sent.len() - 1]
        .iter()
        .all(|env| env.indicator == CM_FRAGMENT || env.indicator == CM_FINAL));
    assert!(matches!(
        s.send_segmented(vec![Command::window()], None, 1, 0),
        Err(ProxyError::InvalidSegmentSize)
    ));
}

#[test]
fn invalid_configs_are_rejected_at_construction() {
    let zero_depth = SessionConfig {
        depth: 0,
        ..SessionConfig::default()
    };
    let busy_loop = SessionConfig {
        poll_interval_ms: 0,
        ..SessionConfig::default()
    };
    let empty_chunks = SessionConfig {
        segment_size: Some(0),
        ..SessionConfig::default()
    };
    for config in [zero_depth, busy_loop, empty_chunks] {
        let result = Session::with_config(MemoryTransport::new(), config);
        assert!(matches!(result, Err(ProxyError::Config(_))));
    }
    let s = Session::with_config(MemoryTransport::new(), SessionConfig::default()).unwrap();
    assert_eq!(s.config(), &SessionConfig::default());
}
