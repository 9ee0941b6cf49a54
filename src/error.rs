//! Common errors for channel operations.

/// Error for blocking send.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SendError<T> {
    /// Channel closed before the value was committed. Hands the value back.
    Closed(T),
    /// Stop token fired before the value was committed.
    Canceled,
}

/// Error for nonblocking send.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrySendError<T> {
    /// No buffer room and no waiting receiver.
    Full(T),
    /// Channel closed before the value was committed. Hands the value back.
    Closed(T),
}

/// Error for blocking receive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecvError {
    Closed,
    Canceled,
}

/// Error for nonblocking receive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TryRecvError {
    Empty,
    Closed,
}
