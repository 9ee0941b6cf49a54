//! # CSP style channels with multi-way select
//!
//! `sluice` provides typed first-in first-out channels for communication
//! across threads, in three shapes sharing one contract: [rendezvous]
//! channels pair every send with a receive in time, [bounded] channels buffer
//! up to a fixed number of values, and [unbounded] channels never refuse a
//! send. A [Chan] handle exposes both ends and is shared by cloning.
//!
//! ## Usage
//! * Use [Chan::send] and [Chan::recv] to block until a value moves, or the
//!   `_stop` forms with a [StopToken] to give up when stop is requested.
//! * Use [Chan::try_send] and [Chan::try_recv] when blocking is not an
//!   option.
//! * Use [Chan::send_sched] and [Chan::recv_sched] to register a settlement
//!   callback instead of holding a thread.
//! * Use [select] with operations built by [select::send] and [select::recv]
//!   to wait on several channels at once and commit exactly one.
//! * Use [Chan::close] to drain and fail every pending operation; closing is
//!   idempotent and closed channels fail fast.
//!
//! ## Example
//! ```rust
//! use std::thread;
//!
//! use sluice::select::{self, select};
//! use sluice::{rendezvous, unbounded};
//!
//! let numbers = rendezvous::<i32>();
//! let words = unbounded::<String>();
//!
//! let worker = thread::spawn({
//!     let numbers = numbers.clone();
//!     move || numbers.send(42)
//! });
//!
//! assert_eq!(numbers.recv(), Ok(42));
//! worker.join().unwrap().unwrap();
//!
//! let mut put = select::send(&words, "hello");
//! let mut get = select::recv(&numbers);
//! select(&mut [&mut put, &mut get]);
//!
//! assert_eq!(words.recv().as_deref(), Ok("hello"));
//! ```

pub mod chan;
pub mod error;
pub mod select;
pub mod stop;

pub use chan::{bounded, rendezvous, unbounded, AbortPredicate, Capacity, Chan, NeedAbort};
pub use error::{RecvError, SendError, TryRecvError, TrySendError};
pub use select::{select, select_or, select_stop, Operation, RecvOp, SendOp};
pub use stop::{StopCallback, StopSource, StopToken};
