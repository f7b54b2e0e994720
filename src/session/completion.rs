// SPDX-License-Identifier: GPL-3.0-only

//! Completion handles for asynchronous session commands
//!
//! A [`Completion`] resolves exactly once. It can be awaited from async code
//! or waited on from a plain thread. If the responding side is dropped
//! without answering (the session went away), it resolves to
//! [`SessionError::Disposed`].

use crate::errors::{SessionError, SessionResult};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Sending half held by whoever will complete the command
pub(crate) type Responder<T> = oneshot::Sender<SessionResult<T>>;

#[derive(Debug)]
#[must_use = "a completion does nothing unless awaited or waited on"]
pub struct Completion<T> {
    rx: oneshot::Receiver<SessionResult<T>>,
}

impl<T> Completion<T> {
    pub(crate) fn channel() -> (Responder<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A completion that has already resolved
    pub fn ready(result: SessionResult<T>) -> Self {
        let (tx, completion) = Self::channel();
        let _ = tx.send(result);
        completion
    }

    /// Block the current thread until the command completes
    ///
    /// Do not call this from inside an async runtime; `.await` instead.
    pub fn wait(self) -> SessionResult<T> {
        futures::executor::block_on(self)
    }

    /// The result if the command has already completed
    pub fn try_result(&mut self) -> Option<SessionResult<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(SessionError::Disposed)),
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = SessionResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SessionError::Disposed)))
    }
}
