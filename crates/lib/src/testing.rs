//! Recording connector for exercising the dispatcher and facade offline,
//! plus generators for property tests and a log capture

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use crate::protocol::{Call, Reply};
use crate::transport::{Channel, Connector, TransportError};
use crate::value::{ParameterSet, Value};

/// In-memory log sink for a `tracing_subscriber::fmt` subscriber
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Any non-container value
pub(crate) fn scalar_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-1.0e12..1.0e12f64).prop_map(Value::Float),
        ".{0,16}".prop_map(Value::Str),
    ]
}

/// Ordered sets with scalar values and keys matching `keys`.
///
/// Duplicate generated keys collapse into one entry, so keys stay unique.
pub(crate) fn scalar_params(keys: &'static str) -> impl Strategy<Value = ParameterSet> {
    proptest::collection::vec((keys, scalar_value()), 0..12)
        .prop_map(|pairs| pairs.into_iter().collect())
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    replies: VecDeque<Result<Reply, TransportError>>,
    refuse: bool,
    opened: usize,
    closed: usize,
}

/// Replays queued replies in order and records every call it sees.
///
/// Once the queue runs dry every call gets an empty response.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    state: Rc<RefCell<State>>,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(self, reply: Reply) -> Self {
        self.state.borrow_mut().replies.push_back(Ok(reply));
        self
    }

    pub(crate) fn fault(self, code: &str, message: &str) -> Self {
        self.state
            .borrow_mut()
            .replies
            .push_back(Err(TransportError::Fault {
                code: code.into(),
                message: message.into(),
            }));
        self
    }

    pub(crate) fn refuse_connections(self) -> Self {
        self.state.borrow_mut().refuse = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub(crate) fn opened(&self) -> usize {
        self.state.borrow().opened
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.borrow().closed
    }
}

impl Connector for FakeConnector {
    fn connect(&self) -> Result<Box<dyn Channel>, TransportError> {
        let mut state = self.state.borrow_mut();
        if state.refuse {
            return Err(TransportError::Connection {
                url: "fake://".into(),
                message: "connection refused".into(),
            });
        }
        state.opened += 1;
        Ok(Box::new(FakeChannel {
            state: Rc::clone(&self.state),
        }))
    }
}

struct FakeChannel {
    state: Rc<RefCell<State>>,
}

impl Channel for FakeChannel {
    fn invoke(&mut self, call: &Call) -> Result<Reply, TransportError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(call.clone());
        state
            .replies
            .pop_front()
            .unwrap_or_else(|| Ok(Reply::Record(Vec::new())))
    }
}

impl Drop for FakeChannel {
    fn drop(&mut self) {
        self.state.borrow_mut().closed += 1;
    }
}
