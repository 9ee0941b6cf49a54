//! Typed channels for communication across threads.
//!
//! A [Chan] couples a FIFO buffer with two FIFO waiter queues behind one lock.
//! Three capacities exist: [rendezvous] channels hand values directly from
//! sender to receiver, [bounded] channels buffer up to a fixed number of
//! values, and [unbounded] channels never refuse a send.
//!
//! Every operation comes in three shapes: nonblocking ([Chan::try_send],
//! [Chan::try_recv]), blocking ([Chan::send], [Chan::recv] and their
//! `_stop` forms), and scheduled ([Chan::send_sched], [Chan::recv_sched]),
//! which register a settlement callback and return immediately.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use static_assertions::assert_impl_all;

use crate::error::{RecvError, SendError, TryRecvError, TrySendError};
use crate::stop::StopToken;

/// Abort predicate attached to a scheduled operation.
///
/// Channels consult it lazily: [AbortPredicate::inspect] while pruning queues
/// and reporting [Chan::size], and [AbortPredicate::claim] exactly once at the
/// point a waiter is about to settle. A true result discards the waiter
/// without settlement, so its callback never runs.
pub trait AbortPredicate: Send + Sync {
    /// Observes whether the waiter should be discarded. Must have no effects.
    fn inspect(&self) -> bool;

    /// Consulted at the commit point. Returning false commits the waiter to
    /// settlement; an implementation may transition state in the same step.
    fn claim(&self) -> bool {
        self.inspect()
    }
}

/// Shared handle to the abort predicate of a scheduled operation.
pub type NeedAbort = Arc<dyn AbortPredicate>;

struct FnAbort<F>(F);

impl<F: Fn() -> bool + Send + Sync> AbortPredicate for FnAbort<F> {
    fn inspect(&self) -> bool {
        (self.0)()
    }
}

struct ThreadWaker<R> {
    condvar: Condvar,
    aborted: AtomicBool,
    result: UnsafeCell<Option<R>>,
}

// SAFETY: The result slot is read and written only under its channel's mutex.
unsafe impl<R: Send> Sync for ThreadWaker<R> {}

impl<R> ThreadWaker<R> {
    fn new() -> Arc<ThreadWaker<R>> {
        Arc::new(ThreadWaker { condvar: Condvar::new(), aborted: AtomicBool::new(false), result: UnsafeCell::new(None) })
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    // This should be called under the channel mutex for result mutation.
    unsafe fn wake(&self, r: R) {
        let result = &mut *self.result.get();
        *result = Some(r);
        self.condvar.notify_one();
    }

    // Claims the waiter for cancellation unless it already settled. This
    // should be called under the channel mutex.
    unsafe fn cancel(&self, r: R) {
        let result = &mut *self.result.get();
        if result.is_some() {
            return;
        }
        self.aborted.store(true, Ordering::Relaxed);
        *result = Some(r);
        self.condvar.notify_one();
    }

    // This should be called under the channel mutex.
    unsafe fn take(&self) -> Option<R> {
        (*self.result.get()).take()
    }
}

enum SendWaiter<T: Send + 'static> {
    Thread { value: T, waker: Arc<ThreadWaker<Result<(), SendError<T>>>> },
    Sched { value: T, need_abort: NeedAbort, on_settled: Box<dyn FnOnce(bool) + Send> },
}

enum RecvWaiter<T: Send + 'static> {
    Thread { waker: Arc<ThreadWaker<Result<T, RecvError>>> },
    Sched { need_abort: NeedAbort, on_settled: Box<dyn FnOnce(Option<T>) + Send> },
}

#[derive(Copy, Clone)]
enum Scan {
    Skip,
    Discard,
    Candidate,
}

impl<T: Send + 'static> SendWaiter<T> {
    fn is_aborted(&self) -> bool {
        match self {
            SendWaiter::Thread { waker, .. } => waker.is_aborted(),
            SendWaiter::Sched { need_abort, .. } => need_abort.inspect(),
        }
    }

    fn claim_aborted(&self) -> bool {
        match self {
            SendWaiter::Thread { waker, .. } => waker.is_aborted(),
            SendWaiter::Sched { need_abort, .. } => need_abort.claim(),
        }
    }

    fn scan(&self, need_abort: &NeedAbort) -> Scan {
        match self {
            SendWaiter::Sched { need_abort: own, .. } if Arc::ptr_eq(own, need_abort) => Scan::Skip,
            SendWaiter::Thread { waker, .. } if waker.is_aborted() => Scan::Discard,
            _ => Scan::Candidate,
        }
    }

    // Settles with delivery, yielding the value to deposit or hand off.
    fn settle(self) -> T {
        match self {
            SendWaiter::Thread { value, waker } => {
                // SAFETY: settlement happens under the channel mutex.
                unsafe { waker.wake(Ok(())) };
                value
            },
            SendWaiter::Sched { value, on_settled, .. } => {
                on_settled(true);
                value
            },
        }
    }

    fn settle_closed(self) {
        match self {
            SendWaiter::Thread { value, waker } => {
                // SAFETY: settlement happens under the channel mutex.
                unsafe { waker.wake(Err(SendError::Closed(value))) }
            },
            SendWaiter::Sched { on_settled, .. } => on_settled(false),
        }
    }
}

impl<T: Send + 'static> RecvWaiter<T> {
    fn is_aborted(&self) -> bool {
        match self {
            RecvWaiter::Thread { waker } => waker.is_aborted(),
            RecvWaiter::Sched { need_abort, .. } => need_abort.inspect(),
        }
    }

    fn claim_aborted(&self) -> bool {
        match self {
            RecvWaiter::Thread { waker } => waker.is_aborted(),
            RecvWaiter::Sched { need_abort, .. } => need_abort.claim(),
        }
    }

    fn scan(&self, need_abort: &NeedAbort) -> Scan {
        match self {
            RecvWaiter::Sched { need_abort: own, .. } if Arc::ptr_eq(own, need_abort) => Scan::Skip,
            RecvWaiter::Thread { waker } if waker.is_aborted() => Scan::Discard,
            _ => Scan::Candidate,
        }
    }

    fn settle(self, value: T) {
        match self {
            RecvWaiter::Thread { waker } => {
                // SAFETY: settlement happens under the channel mutex.
                unsafe { waker.wake(Ok(value)) }
            },
            RecvWaiter::Sched { on_settled, .. } => on_settled(Some(value)),
        }
    }

    fn settle_closed(self) {
        match self {
            RecvWaiter::Thread { waker } => {
                // SAFETY: settlement happens under the channel mutex.
                unsafe { waker.wake(Err(RecvError::Closed)) }
            },
            RecvWaiter::Sched { on_settled, .. } => on_settled(None),
        }
    }
}

/// Capacity of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// Fixed buffer room. `Bounded(0)` is a rendezvous channel with no room
    /// at all.
    Bounded(usize),
    /// A send never waits for room.
    Unbounded,
}

impl Capacity {
    fn has_room(self, buffered: usize) -> bool {
        match self {
            Capacity::Bounded(bound) => buffered < bound,
            Capacity::Unbounded => true,
        }
    }
}

struct State<T: Send + 'static> {
    closed: bool,
    capacity: Capacity,
    buffer: VecDeque<T>,
    send_waiters: VecDeque<SendWaiter<T>>,
    recv_waiters: VecDeque<RecvWaiter<T>>,
}

impl<T: Send + 'static> State<T> {
    fn new(capacity: Capacity) -> Self {
        let buffer = match capacity {
            Capacity::Bounded(bound) => VecDeque::with_capacity(bound),
            Capacity::Unbounded => VecDeque::new(),
        };
        State { closed: false, capacity, buffer, send_waiters: VecDeque::new(), recv_waiters: VecDeque::new() }
    }

    // A live waiter returned from here must be settled by the caller:
    // claiming a scheduled waiter may commit its select in the same step.
    fn pop_live_receiver(&mut self) -> Option<RecvWaiter<T>> {
        while let Some(waiter) = self.recv_waiters.pop_front() {
            if waiter.claim_aborted() {
                continue;
            }
            return Some(waiter);
        }
        None
    }

    fn pop_live_sender(&mut self) -> Option<SendWaiter<T>> {
        while let Some(waiter) = self.send_waiters.pop_front() {
            if waiter.claim_aborted() {
                continue;
            }
            return Some(waiter);
        }
        None
    }

    // Refills freed buffer room from queued senders.
    fn promote_senders(&mut self) {
        while self.capacity.has_room(self.buffer.len()) {
            match self.pop_live_sender() {
                None => break,
                Some(waiter) => {
                    let value = waiter.settle();
                    self.buffer.push_back(value);
                },
            }
        }
    }

    fn try_send_now(&mut self, value: T) -> Result<(), T> {
        debug_assert!(!self.closed);
        if let Some(waiter) = self.pop_live_receiver() {
            waiter.settle(value);
            return Ok(());
        }
        if self.capacity.has_room(self.buffer.len()) {
            self.buffer.push_back(value);
            return Ok(());
        }
        Err(value)
    }

    fn try_recv_now(&mut self) -> Option<T> {
        debug_assert!(!self.closed);
        if let Some(value) = self.buffer.pop_front() {
            self.promote_senders();
            return Some(value);
        }
        let waiter = self.pop_live_sender()?;
        Some(waiter.settle())
    }

    // Scans for a waiter a scheduled send could pair with, discarding thread
    // waiters already claimed by cancellation. Waiters armed by the same
    // select are stepped over: an operation cannot pair with its own select.
    // Foreign scheduled waiters end the scan as candidates; their predicates
    // are consulted later, at settlement.
    fn has_recv_candidate(&mut self, need_abort: &NeedAbort) -> bool {
        let mut index = 0;
        loop {
            let scan = match self.recv_waiters.get(index) {
                None => return false,
                Some(waiter) => waiter.scan(need_abort),
            };
            match scan {
                Scan::Skip => index += 1,
                Scan::Discard => {
                    self.recv_waiters.remove(index);
                },
                Scan::Candidate => return true,
            }
        }
    }

    fn has_send_candidate(&mut self, need_abort: &NeedAbort) -> bool {
        let mut index = 0;
        loop {
            let scan = match self.send_waiters.get(index) {
                None => return false,
                Some(waiter) => waiter.scan(need_abort),
            };
            match scan {
                Scan::Skip => index += 1,
                Scan::Discard => {
                    self.send_waiters.remove(index);
                },
                Scan::Candidate => return true,
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        while let Some(waiter) = self.recv_waiters.pop_front() {
            if !waiter.claim_aborted() {
                waiter.settle_closed();
            }
        }
        while let Some(waiter) = self.send_waiters.pop_front() {
            if !waiter.claim_aborted() {
                waiter.settle_closed();
            }
        }
    }
}

struct Channel<T: Send + 'static> {
    state: Mutex<State<T>>,
}

/// A typed FIFO channel exposing both the sending and the receiving end.
/// Clones share the same channel.
pub struct Chan<T: Send + 'static> {
    channel: Arc<Channel<T>>,
}

assert_impl_all!(Chan<()>: Send, Sync);

impl<T: Send + 'static> Clone for Chan<T> {
    fn clone(&self) -> Self {
        Chan { channel: self.channel.clone() }
    }
}

impl<T: Send + 'static> Chan<T> {
    /// Attempts to send a value without blocking.
    ///
    /// Fails with [TrySendError::Full] if no buffer room is available and no
    /// receiver is waiting; on a rendezvous channel without a waiting receiver
    /// it therefore never succeeds.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut state = self.channel.state.lock().unwrap();
        if state.closed {
            return Err(TrySendError::Closed(value));
        }
        match state.try_send_now(value) {
            Ok(()) => Ok(()),
            Err(value) => Err(TrySendError::Full(value)),
        }
    }

    /// Attempts to receive a value without blocking.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut state = self.channel.state.lock().unwrap();
        if state.closed {
            return Err(TryRecvError::Closed);
        }
        match state.try_recv_now() {
            Some(value) => Ok(value),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Sends a value, blocking until it is committed or the channel closes.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        self.send_stop(&StopToken::never(), value)
    }

    /// Sends a value, blocking until it is committed, the channel closes, or
    /// `stop` fires.
    pub fn send_stop(&self, stop: &StopToken, value: T) -> Result<(), SendError<T>> {
        let mut state = self.channel.state.lock().unwrap();
        if stop.stop_requested() {
            return Err(SendError::Canceled);
        }
        if state.closed {
            return Err(SendError::Closed(value));
        }
        let value = match state.try_send_now(value) {
            Ok(()) => return Ok(()),
            Err(value) => value,
        };
        let waker = ThreadWaker::new();
        state.send_waiters.push_back(SendWaiter::Thread { value, waker: waker.clone() });
        drop(state);

        // Registered outside the channel lock because the callback takes it.
        let _registration = stop.on_stop({
            let channel = self.channel.clone();
            let waker = waker.clone();
            move || {
                let _state = channel.state.lock().unwrap();
                // SAFETY: the channel mutex is held.
                unsafe { waker.cancel(Err(SendError::Canceled)) };
            }
        });

        let mut state = self.channel.state.lock().unwrap();
        loop {
            // SAFETY: the channel mutex is held.
            if let Some(result) = unsafe { waker.take() } {
                drop(state);
                return result;
            }
            state = waker.condvar.wait(state).unwrap();
        }
    }

    /// Receives a value, blocking until one is committed or the channel
    /// closes.
    pub fn recv(&self) -> Result<T, RecvError> {
        self.recv_stop(&StopToken::never())
    }

    /// Receives a value, blocking until one is committed, the channel closes,
    /// or `stop` fires.
    pub fn recv_stop(&self, stop: &StopToken) -> Result<T, RecvError> {
        let mut state = self.channel.state.lock().unwrap();
        if stop.stop_requested() {
            return Err(RecvError::Canceled);
        }
        if state.closed {
            return Err(RecvError::Closed);
        }
        if let Some(value) = state.try_recv_now() {
            return Ok(value);
        }
        let waker = ThreadWaker::new();
        state.recv_waiters.push_back(RecvWaiter::Thread { waker: waker.clone() });
        drop(state);

        let _registration = stop.on_stop({
            let channel = self.channel.clone();
            let waker = waker.clone();
            move || {
                let _state = channel.state.lock().unwrap();
                // SAFETY: the channel mutex is held.
                unsafe { waker.cancel(Err(RecvError::Canceled)) };
            }
        });

        let mut state = self.channel.state.lock().unwrap();
        loop {
            // SAFETY: the channel mutex is held.
            if let Some(result) = unsafe { waker.take() } {
                drop(state);
                return result;
            }
            state = waker.condvar.wait(state).unwrap();
        }
    }

    /// Registers a send intent and returns immediately.
    ///
    /// `on_settled(true)` fires once the value is committed, `on_settled(false)`
    /// once the channel closes first; a waiter whose `need_abort` reports true
    /// is discarded without any callback. The callback runs on whichever
    /// thread settles the operation, while that channel's lock is held, so it
    /// must not operate on this channel reentrantly.
    pub fn send_sched<A, F>(&self, value: T, need_abort: A, on_settled: F)
    where
        A: Fn() -> bool + Send + Sync + 'static,
        F: FnOnce(bool) + Send + 'static,
    {
        self.send_sched_arc(value, Arc::new(FnAbort(need_abort)), Box::new(on_settled));
    }

    /// Same as [Chan::send_sched] with an abort predicate observing `stop`.
    /// Does nothing if `stop` already fired.
    pub fn send_sched_stop<F>(&self, stop: &StopToken, value: T, on_settled: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        if stop.stop_requested() {
            return;
        }
        let stop = stop.clone();
        self.send_sched(value, move || stop.stop_requested(), on_settled);
    }

    pub(crate) fn send_sched_arc(&self, value: T, need_abort: NeedAbort, on_settled: Box<dyn FnOnce(bool) + Send>) {
        let mut state = self.channel.state.lock().unwrap();
        if state.closed {
            if !need_abort.claim() {
                on_settled(false);
            }
            return;
        }
        if state.has_recv_candidate(&need_abort) {
            if need_abort.claim() {
                return;
            }
            // Committed; the candidate may still turn out aborted once its
            // own predicate is claimed.
            match state.pop_live_receiver() {
                Some(waiter) => {
                    waiter.settle(value);
                    on_settled(true);
                },
                None => self.deposit_committed(&mut state, value, on_settled),
            }
            return;
        }
        if state.capacity.has_room(state.buffer.len()) {
            if !need_abort.claim() {
                state.buffer.push_back(value);
                on_settled(true);
            }
            return;
        }
        state.send_waiters.push_back(SendWaiter::Sched { value, need_abort, on_settled });
    }

    // Completes an already committed scheduled send whose partner vanished:
    // deposit if room, otherwise stay queued unconditionally.
    fn deposit_committed(&self, state: &mut State<T>, value: T, on_settled: Box<dyn FnOnce(bool) + Send>) {
        if state.capacity.has_room(state.buffer.len()) {
            state.buffer.push_back(value);
            on_settled(true);
        } else {
            let committed: NeedAbort = Arc::new(FnAbort(|| false));
            state.send_waiters.push_back(SendWaiter::Sched { value, need_abort: committed, on_settled });
        }
    }

    /// Registers a receive intent and returns immediately.
    ///
    /// `on_settled(Some(value))` fires once a value is committed,
    /// `on_settled(None)` once the channel closes first; a waiter whose
    /// `need_abort` reports true is discarded without any callback. On a
    /// closed channel the callback fires in place, before this returns. The
    /// same reentrancy contract as [Chan::send_sched] applies.
    pub fn recv_sched<A, F>(&self, need_abort: A, on_settled: F)
    where
        A: Fn() -> bool + Send + Sync + 'static,
        F: FnOnce(Option<T>) + Send + 'static,
    {
        self.recv_sched_arc(Arc::new(FnAbort(need_abort)), Box::new(on_settled));
    }

    /// Same as [Chan::recv_sched] with an abort predicate observing `stop`.
    /// Does nothing if `stop` already fired.
    pub fn recv_sched_stop<F>(&self, stop: &StopToken, on_settled: F)
    where
        F: FnOnce(Option<T>) + Send + 'static,
    {
        if stop.stop_requested() {
            return;
        }
        let stop = stop.clone();
        self.recv_sched(move || stop.stop_requested(), on_settled);
    }

    pub(crate) fn recv_sched_arc(&self, need_abort: NeedAbort, on_settled: Box<dyn FnOnce(Option<T>) + Send>) {
        let mut state = self.channel.state.lock().unwrap();
        if state.closed {
            if !need_abort.claim() {
                on_settled(None);
            }
            return;
        }
        if !state.buffer.is_empty() && need_abort.claim() {
            return;
        }
        if let Some(value) = state.buffer.pop_front() {
            state.promote_senders();
            on_settled(Some(value));
            return;
        }
        if state.has_send_candidate(&need_abort) {
            if need_abort.claim() {
                return;
            }
            match state.pop_live_sender() {
                Some(waiter) => on_settled(Some(waiter.settle())),
                None => {
                    // Committed; stay queued unconditionally.
                    let committed: NeedAbort = Arc::new(FnAbort(|| false));
                    state.recv_waiters.push_back(RecvWaiter::Sched { need_abort: committed, on_settled });
                },
            }
            return;
        }
        state.recv_waiters.push_back(RecvWaiter::Sched { need_abort, on_settled });
    }

    /// Closes the channel. Idempotent.
    ///
    /// Every queued waiter is settled with failure in FIFO order and every
    /// subsequent operation fails with a closed error. Buffered values are
    /// dropped with the channel.
    pub fn close(&self) {
        let mut state = self.channel.state.lock().unwrap();
        state.close();
    }

    /// Returns the capacity this channel was constructed with.
    pub fn capacity(&self) -> Capacity {
        let state = self.channel.state.lock().unwrap();
        state.capacity
    }

    /// Reports buffered values plus hanging senders minus hanging receivers.
    ///
    /// Negative while receivers hang; greater than the capacity while senders
    /// hang. For diagnostics only: the value may be stale as soon as the lock
    /// is released.
    pub fn size(&self) -> isize {
        let mut state = self.channel.state.lock().unwrap();
        while state.recv_waiters.front().map_or(false, RecvWaiter::is_aborted) {
            state.recv_waiters.pop_front();
        }
        while state.send_waiters.front().map_or(false, SendWaiter::is_aborted) {
            state.send_waiters.pop_front();
        }
        state.buffer.len() as isize + state.send_waiters.len() as isize - state.recv_waiters.len() as isize
    }
}

fn channel<T: Send + 'static>(capacity: Capacity) -> Chan<T> {
    Chan { channel: Arc::new(Channel { state: Mutex::new(State::new(capacity)) }) }
}

/// Constructs a rendezvous channel: every send pairs with a receive in time.
pub fn rendezvous<T: Send + 'static>() -> Chan<T> {
    channel(Capacity::Bounded(0))
}

/// Constructs a bounded FIFO channel. A bound of zero is a rendezvous
/// channel.
pub fn bounded<T: Send + 'static>(bound: usize) -> Chan<T> {
    channel(Capacity::Bounded(bound))
}

/// Constructs an unbounded FIFO channel.
pub fn unbounded<T: Send + 'static>() -> Chan<T> {
    channel(Capacity::Unbounded)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn bounded_send_and_receive() {
        let chan = bounded::<i32>(2);
        chan.send(1).unwrap();
        chan.send(2).unwrap();
        assert_eq!(chan.recv(), Ok(1));
        assert_eq!(chan.recv(), Ok(2));
    }

    #[test]
    fn bounded_try_send_full() {
        let chan = bounded::<i32>(2);
        chan.try_send(1).unwrap();
        chan.try_send(2).unwrap();
        assert_eq!(chan.try_send(3), Err(TrySendError::Full(3)));
        assert_eq!(chan.try_recv(), Ok(1));
    }

    #[test]
    fn unbounded_try_send_never_refuses() {
        let chan = unbounded::<i32>();
        for value in 0..100 {
            chan.try_send(value).unwrap();
        }
        assert_eq!(chan.size(), 100);
        assert_eq!(chan.recv(), Ok(0));
    }

    #[test]
    fn rendezvous_try_send_has_no_room() {
        let chan = rendezvous::<i32>();
        assert_eq!(chan.try_send(42), Err(TrySendError::Full(42)));
        assert_eq!(chan.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn close_is_idempotent() {
        let chan = bounded::<i32>(1);
        chan.close();
        chan.close();
        assert_eq!(chan.send(1), Err(SendError::Closed(1)));
        assert_eq!(chan.try_send(2), Err(TrySendError::Closed(2)));
        assert_eq!(chan.recv(), Err(RecvError::Closed));
        assert_eq!(chan.try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    fn size_matches_buffer_when_idle() {
        let chan = bounded::<i32>(3);
        assert_eq!(chan.capacity(), Capacity::Bounded(3));
        assert_eq!(chan.size(), 0);
        chan.try_send(1).unwrap();
        chan.try_send(2).unwrap();
        assert_eq!(chan.size(), 2);
        assert_eq!(chan.try_recv(), Ok(1));
        assert_eq!(chan.size(), 1);
    }

    #[test]
    fn recv_sched_on_closed_settles_in_place() {
        let chan = rendezvous::<i32>();
        chan.close();
        let fired = Arc::new(AtomicUsize::new(0));
        chan.recv_sched(|| false, {
            let fired = fired.clone();
            move |value| {
                assert_eq!(value, None);
                fired.fetch_add(1, Ordering::Relaxed);
            }
        });
        assert_eq!(fired.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn send_sched_deposits_into_buffer() {
        let chan = bounded::<i32>(1);
        let fired = Arc::new(AtomicUsize::new(0));
        chan.send_sched(7, || false, {
            let fired = fired.clone();
            move |ok| {
                assert!(ok);
                fired.fetch_add(1, Ordering::Relaxed);
            }
        });
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert_eq!(chan.try_recv(), Ok(7));
    }

    #[test]
    fn send_sched_waits_for_room_and_settles_on_receive() {
        let chan = bounded::<i32>(1);
        chan.try_send(1).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        chan.send_sched(2, || false, {
            let fired = fired.clone();
            move |ok| {
                assert!(ok);
                fired.fetch_add(1, Ordering::Relaxed);
            }
        });
        assert_eq!(fired.load(Ordering::Relaxed), 0);
        assert_eq!(chan.size(), 2);

        // Receiving promotes the queued sender into the freed room.
        assert_eq!(chan.recv(), Ok(1));
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert_eq!(chan.try_recv(), Ok(2));
    }

    #[test]
    fn aborted_sched_waiter_is_discarded() {
        let chan = rendezvous::<i32>();
        let abort = Arc::new(AtomicBool::new(false));
        chan.send_sched(
            5,
            {
                let abort = abort.clone();
                move || abort.load(Ordering::Relaxed)
            },
            |_| panic!("aborted waiter must not settle"),
        );
        assert_eq!(chan.size(), 1);

        abort.store(true, Ordering::Relaxed);
        assert_eq!(chan.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(chan.size(), 0);
    }

    #[test]
    fn recv_sched_takes_rendezvous_handoff() {
        let chan = rendezvous::<i32>();
        let got = Arc::new(AtomicUsize::new(0));
        chan.recv_sched(|| false, {
            let got = got.clone();
            move |value| {
                got.store(value.unwrap() as usize, Ordering::Relaxed);
            }
        });
        assert_eq!(chan.size(), -1);
        chan.send(9).unwrap();
        assert_eq!(got.load(Ordering::Relaxed), 9);
        assert_eq!(chan.size(), 0);
    }

    #[test]
    fn close_drains_waiters_in_order() {
        let chan = rendezvous::<i32>();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for index in 0..3 {
            let order = order.clone();
            chan.recv_sched(|| false, move |value| {
                assert_eq!(value, None);
                order.lock().unwrap().push(index);
            });
        }
        chan.close();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(chan.size(), 0);
    }
}
