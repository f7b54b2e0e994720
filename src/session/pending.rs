// SPDX-License-Identifier: GPL-3.0-only

//! Table of in-flight commands awaiting an asynchronous result
//!
//! At most one entry per [`OperationKind`]. Whoever removes an entry owns
//! the right to complete it, which makes the table the single arbiter for
//! races such as first frame versus initialization timeout: both sides try
//! to take the `Init` entry and only one can succeed.
//!
//! [`fail_all`](PendingOperationTable::fail_all) also closes the table, so a
//! command racing with disposal cannot park a new entry afterwards.

use super::completion::Responder;
use crate::backends::camera::types::Resolution;
use crate::errors::{SessionError, SessionResult};
use crate::sync::lock;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Init,
    StartRecord,
    StopRecord,
}

impl OperationKind {
    /// Error for a second command of this kind while one is in flight
    fn duplicate_error(&self) -> SessionError {
        match self {
            OperationKind::Init => SessionError::AlreadyInitialized,
            OperationKind::StartRecord => SessionError::AlreadyRecording,
            OperationKind::StopRecord => SessionError::NotRecording,
        }
    }
}

#[derive(Default)]
struct Slots {
    init: Option<Responder<Resolution>>,
    start_record: Option<Responder<()>>,
    stop_record: Option<Responder<PathBuf>>,
    closed: bool,
}

#[derive(Default)]
pub struct PendingOperationTable {
    slots: Mutex<Slots>,
}

fn put<T>(
    slot: &mut Option<Responder<T>>,
    closed: bool,
    kind: OperationKind,
    responder: Responder<T>,
) -> SessionResult<()> {
    if closed {
        return Err(SessionError::Disposed);
    }
    if slot.is_some() {
        return Err(kind.duplicate_error());
    }
    *slot = Some(responder);
    Ok(())
}

fn respond<T>(responder: Option<Responder<T>>, result: SessionResult<T>) -> bool {
    match responder {
        Some(tx) => {
            // The caller may have dropped its completion; that is not an error
            let _ = tx.send(result);
            true
        }
        None => false,
    }
}

impl PendingOperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_init(&self, responder: Responder<Resolution>) -> SessionResult<()> {
        let mut slots = lock(&self.slots);
        let closed = slots.closed;
        put(&mut slots.init, closed, OperationKind::Init, responder)
    }

    pub(crate) fn insert_start_record(&self, responder: Responder<()>) -> SessionResult<()> {
        let mut slots = lock(&self.slots);
        let closed = slots.closed;
        put(&mut slots.start_record, closed, OperationKind::StartRecord, responder)
    }

    pub(crate) fn insert_stop_record(&self, responder: Responder<PathBuf>) -> SessionResult<()> {
        let mut slots = lock(&self.slots);
        let closed = slots.closed;
        put(&mut slots.stop_record, closed, OperationKind::StopRecord, responder)
    }

    pub(crate) fn take_init(&self) -> Option<Responder<Resolution>> {
        lock(&self.slots).init.take()
    }

    pub(crate) fn take_start_record(&self) -> Option<Responder<()>> {
        lock(&self.slots).start_record.take()
    }

    pub(crate) fn take_stop_record(&self) -> Option<Responder<PathBuf>> {
        lock(&self.slots).stop_record.take()
    }

    /// Complete the pending initialization; false if nothing was pending
    pub fn complete_init(&self, result: SessionResult<Resolution>) -> bool {
        respond(self.take_init(), result)
    }

    pub fn complete_start_record(&self, result: SessionResult<()>) -> bool {
        respond(self.take_start_record(), result)
    }

    pub fn complete_stop_record(&self, result: SessionResult<PathBuf>) -> bool {
        respond(self.take_stop_record(), result)
    }

    pub fn contains(&self, kind: OperationKind) -> bool {
        let slots = lock(&self.slots);
        match kind {
            OperationKind::Init => slots.init.is_some(),
            OperationKind::StartRecord => slots.start_record.is_some(),
            OperationKind::StopRecord => slots.stop_record.is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        let slots = lock(&self.slots);
        slots.init.is_none() && slots.start_record.is_none() && slots.stop_record.is_none()
    }

    /// Fail every entry with `error` and refuse further inserts
    ///
    /// Returns the number of entries failed. Responders are signalled after
    /// the table lock is released.
    pub fn fail_all(&self, error: SessionError) -> usize {
        let (init, start_record, stop_record) = {
            let mut slots = lock(&self.slots);
            slots.closed = true;
            (
                slots.init.take(),
                slots.start_record.take(),
                slots.stop_record.take(),
            )
        };
        let failed = usize::from(respond(init, Err(error.clone())))
            + usize::from(respond(start_record, Err(error.clone())))
            + usize::from(respond(stop_record, Err(error)));
        if failed > 0 {
            debug!(failed, "Failed pending operations");
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::completion::Completion;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_duplicate_insert_is_rejected_by_kind() {
        let table = PendingOperationTable::new();
        let (first, _c1) = Completion::<Resolution>::channel();
        let (second, _c2) = Completion::<Resolution>::channel();
        table.insert_init(first).unwrap();
        assert_eq!(table.insert_init(second), Err(SessionError::AlreadyInitialized));

        let (stop_a, _c3) = Completion::<PathBuf>::channel();
        let (stop_b, _c4) = Completion::<PathBuf>::channel();
        table.insert_stop_record(stop_a).unwrap();
        assert_eq!(table.insert_stop_record(stop_b), Err(SessionError::NotRecording));
    }

    #[test]
    fn test_complete_delivers_once() {
        let table = PendingOperationTable::new();
        let (tx, completion) = Completion::channel();
        table.insert_init(tx).unwrap();
        assert!(table.contains(OperationKind::Init));

        assert!(table.complete_init(Ok(Resolution::new(1280, 720))));
        assert!(!table.complete_init(Err(SessionError::InitializationTimedOut)));
        assert_eq!(completion.wait(), Ok(Resolution::new(1280, 720)));
    }

    #[test]
    fn test_fail_all_closes_table() {
        let table = PendingOperationTable::new();
        let (init, init_done) = Completion::<Resolution>::channel();
        let (start, start_done) = Completion::<()>::channel();
        table.insert_init(init).unwrap();
        table.insert_start_record(start).unwrap();

        assert_eq!(table.fail_all(SessionError::Disposed), 2);
        assert!(table.is_empty());
        assert_eq!(init_done.wait(), Err(SessionError::Disposed));
        assert_eq!(start_done.wait(), Err(SessionError::Disposed));

        let (late, _late_done) = Completion::<PathBuf>::channel();
        assert_eq!(table.insert_stop_record(late), Err(SessionError::Disposed));
    }

    #[test]
    fn test_racing_completers_have_one_winner() {
        let table = Arc::new(PendingOperationTable::new());
        let (tx, completion) = Completion::channel();
        table.insert_init(tx).unwrap();
        let winners = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..4)
            .map(|i| {
                let table = Arc::clone(&table);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    let result = if i % 2 == 0 {
                        Ok(Resolution::new(640, 480))
                    } else {
                        Err(SessionError::InitializationTimedOut)
                    };
                    if table.complete_init(result) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(!table.contains(OperationKind::Init));
        assert!(matches!(
            completion.wait(),
            Ok(_) | Err(SessionError::InitializationTimedOut)
        ));
    }
}
