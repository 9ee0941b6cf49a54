//! Waits on multiple channel operations and commits exactly one.
//!
//! [select] takes a set of pending operations built with [send] and [recv],
//! tries each once in the supplied order, and otherwise arms them all and
//! parks until one settles. Exclusivity comes from a shared [AbortPredicate]:
//! the first channel about to settle its armed waiter claims the predicate,
//! which marks the select committed in the same step, and every other channel
//! later observes an aborted waiter and discards it. Those losing waiters
//! linger in their queues until that lazy check happens; the predicate stays
//! valid long after the select returned.

use std::sync::{Arc, Condvar, Mutex};

use crate::chan::{AbortPredicate, Chan, NeedAbort};
use crate::error::{TryRecvError, TrySendError};
use crate::stop::StopToken;

// The coordination point shared by every operation of one select call.
struct Context {
    committed: Mutex<bool>,
    condvar: Condvar,
}

impl Context {
    fn new() -> Arc<Context> {
        Arc::new(Context { committed: Mutex::new(false), condvar: Condvar::new() })
    }

    fn cancel(&self) {
        let mut committed = self.committed.lock().unwrap();
        if !*committed {
            *committed = true;
            self.condvar.notify_one();
        }
    }

    fn wait(&self) {
        let mut committed = self.committed.lock().unwrap();
        while !*committed {
            committed = self.condvar.wait(committed).unwrap();
        }
    }
}

impl AbortPredicate for Context {
    fn inspect(&self) -> bool {
        *self.committed.lock().unwrap()
    }

    // Commit on check: the first settlement attempt that finds the select
    // pending claims it and may proceed; every later one aborts.
    fn claim(&self) -> bool {
        let mut committed = self.committed.lock().unwrap();
        if *committed {
            return true;
        }
        *committed = true;
        self.condvar.notify_one();
        false
    }
}

/// One pending operation of a [select] call, built with [send] or [recv].
///
/// Operations are single use; running one through a second select panics.
pub trait Operation {
    /// Attempts to commit immediately. Returns true if this operation
    /// settled, firing its callback.
    fn try_execute(&mut self) -> bool;

    /// Arms this operation on its channel with the select's shared predicate.
    fn schedule(&mut self, need_abort: NeedAbort);
}

/// Pending send of a value, built with [send].
pub struct SendOp<'a, T: Send + 'static> {
    chan: &'a Chan<T>,
    value: Option<T>,
    on_settled: Option<Box<dyn FnOnce(bool) + Send>>,
}

/// Pending receive, built with [recv].
pub struct RecvOp<'a, T: Send + 'static> {
    chan: &'a Chan<T>,
    on_settled: Option<Box<dyn FnOnce(Option<T>) + Send>>,
    consumed: bool,
}

/// Constructs a pending send for [select]. Anything convertible into the
/// message type is accepted, e.g. a string literal for a `Chan<String>`.
pub fn send<T: Send + 'static>(chan: &Chan<T>, value: impl Into<T>) -> SendOp<'_, T> {
    SendOp { chan, value: Some(value.into()), on_settled: None }
}

/// Constructs a pending receive for [select].
pub fn recv<T: Send + 'static>(chan: &Chan<T>) -> RecvOp<'_, T> {
    RecvOp { chan, on_settled: None, consumed: false }
}

impl<'a, T: Send + 'static> SendOp<'a, T> {
    /// Attaches a callback observing whether the send committed (`true`) or
    /// the channel closed first (`false`).
    pub fn on_settled(mut self, f: impl FnOnce(bool) + Send + 'static) -> Self {
        self.on_settled = Some(Box::new(f));
        self
    }
}

impl<'a, T: Send + 'static> RecvOp<'a, T> {
    /// Attaches a callback observing the received value, or [None] if the
    /// channel closed first.
    pub fn on_settled(mut self, f: impl FnOnce(Option<T>) + Send + 'static) -> Self {
        self.on_settled = Some(Box::new(f));
        self
    }
}

impl<'a, T: Send + 'static> Operation for SendOp<'a, T> {
    fn try_execute(&mut self) -> bool {
        let value = self.value.take().expect("select operation already consumed");
        match self.chan.try_send(value) {
            Ok(()) => {
                if let Some(on_settled) = self.on_settled.take() {
                    on_settled(true);
                }
                true
            },
            Err(TrySendError::Full(value)) => {
                self.value = Some(value);
                false
            },
            Err(TrySendError::Closed(_)) => {
                if let Some(on_settled) = self.on_settled.take() {
                    on_settled(false);
                }
                true
            },
        }
    }

    fn schedule(&mut self, need_abort: NeedAbort) {
        let value = self.value.take().expect("select operation already consumed");
        let on_settled = self.on_settled.take();
        self.chan.send_sched_arc(
            value,
            need_abort,
            Box::new(move |ok| {
                if let Some(on_settled) = on_settled {
                    on_settled(ok);
                }
            }),
        );
    }
}

impl<'a, T: Send + 'static> Operation for RecvOp<'a, T> {
    fn try_execute(&mut self) -> bool {
        assert!(!self.consumed, "select operation already consumed");
        match self.chan.try_recv() {
            Ok(value) => {
                self.consumed = true;
                if let Some(on_settled) = self.on_settled.take() {
                    on_settled(Some(value));
                }
                true
            },
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Closed) => {
                self.consumed = true;
                if let Some(on_settled) = self.on_settled.take() {
                    on_settled(None);
                }
                true
            },
        }
    }

    fn schedule(&mut self, need_abort: NeedAbort) {
        assert!(!self.consumed, "select operation already consumed");
        self.consumed = true;
        let on_settled = self.on_settled.take();
        self.chan.recv_sched_arc(
            need_abort,
            Box::new(move |value| {
                if let Some(on_settled) = on_settled {
                    on_settled(value);
                }
            }),
        );
    }
}

/// Waits until exactly one of `ops` settles.
///
/// Each operation is first tried in the supplied order; if one commits (or
/// observes a closed channel), its callback fires and the others are left
/// untouched. Otherwise all operations are armed on their channels and the
/// calling thread parks until one of them settles. At most one callback
/// fires.
pub fn select(ops: &mut [&mut dyn Operation]) {
    select_impl(&StopToken::never(), ops, None::<fn()>);
}

/// Same as [select], additionally returning without any settlement once
/// `stop` fires.
pub fn select_stop(stop: &StopToken, ops: &mut [&mut dyn Operation]) {
    select_impl(stop, ops, None::<fn()>);
}

/// Nonblocking [select]: if no operation commits eagerly, `fallback` runs
/// and nothing is armed.
pub fn select_or(ops: &mut [&mut dyn Operation], fallback: impl FnOnce()) {
    select_impl(&StopToken::never(), ops, Some(fallback));
}

fn select_impl<F: FnOnce()>(stop: &StopToken, ops: &mut [&mut dyn Operation], fallback: Option<F>) {
    for op in ops.iter_mut() {
        if op.try_execute() {
            return;
        }
    }
    if let Some(fallback) = fallback {
        fallback();
        return;
    }

    let context = Context::new();
    let _registration = stop.on_stop({
        let context = context.clone();
        move || context.cancel()
    });
    let need_abort: NeedAbort = context.clone();
    for op in ops.iter_mut() {
        op.schedule(need_abort.clone());
    }
    context.wait();
}
