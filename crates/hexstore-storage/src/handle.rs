use crate::error::{Error, Result};
use tokio::sync::oneshot;

enum State<T> {
    Pending(oneshot::Receiver<Result<T>>),
    Ready(Result<T>),
}

/// Result of a round-trip running in the background.
///
/// Dispatch returns immediately; the accessors block the calling thread until the result is in.
/// Do not call the blocking accessors from inside an async runtime.
pub struct QueryHandle<T> {
    state: State<T>,
}

impl<T> std::fmt::Debug for QueryHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Pending(_) => "pending",
            State::Ready(Ok(_)) => "ready",
            State::Ready(Err(_)) => "failed",
        };
        f.debug_struct("QueryHandle").field("state", &state).finish()
    }
}

fn worker_gone() -> Error {
    Error::Worker("background task ended without a result".to_string())
}

impl<T> QueryHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            state: State::Pending(rx),
        }
    }

    /// A handle that is already resolved.
    pub fn ready(result: Result<T>) -> Self {
        Self {
            state: State::Ready(result),
        }
    }

    /// True once the round-trip has completed. Never blocks.
    pub fn is_finished(&mut self) -> bool {
        if let State::Pending(rx) = &mut self.state {
            match rx.try_recv() {
                Ok(result) => self.state = State::Ready(result),
                Err(oneshot::error::TryRecvError::Empty) => return false,
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.state = State::Ready(Err(worker_gone()))
                }
            }
        }
        true
    }

    fn resolve(&mut self) {
        if !matches!(self.state, State::Pending(_)) {
            return;
        }
        let pending = std::mem::replace(&mut self.state, State::Ready(Err(worker_gone())));
        if let State::Pending(rx) = pending {
            self.state = State::Ready(rx.blocking_recv().unwrap_or_else(|_| Err(worker_gone())));
        }
    }

    /// Blocks until the result is available and borrows it.
    pub fn get(&mut self) -> std::result::Result<&T, &Error> {
        self.resolve();
        match &self.state {
            State::Ready(result) => result.as_ref(),
            State::Pending(_) => unreachable!("resolved above"),
        }
    }

    /// Blocks until the result is available and takes it.
    pub fn wait(mut self) -> Result<T> {
        self.resolve();
        match self.state {
            State::Ready(result) => result,
            State::Pending(_) => Err(worker_gone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_once_sender_completes() {
        let (tx, rx) = oneshot::channel();
        let mut handle = QueryHandle::new(rx);
        assert!(!handle.is_finished());
        tx.send(Ok(7)).expect("send");
        assert!(handle.is_finished());
        assert_eq!(handle.get().ok(), Some(&7));
        assert_eq!(handle.wait().ok(), Some(7));
    }

    #[test]
    fn dropped_sender_is_a_worker_error() {
        let (tx, rx) = oneshot::channel::<Result<()>>();
        drop(tx);
        let handle = QueryHandle::new(rx);
        assert!(matches!(handle.wait(), Err(Error::Worker(_))));
    }

    #[test]
    fn get_blocks_until_a_late_sender_completes() {
        let (tx, rx) = oneshot::channel();
        let mut handle = QueryHandle::new(rx);
        let sender = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            tx.send(Ok(String::from("done"))).expect("send");
        });
        assert_eq!(handle.get().ok().map(String::as_str), Some("done"));
        assert_eq!(handle.get().ok().map(String::as_str), Some("done"));
        sender.join().expect("sender thread");
    }
}
