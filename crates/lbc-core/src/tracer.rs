use crate::error::{Error, Result};
use crate::ops::Operation;
use crate::trace::Trace;
use std::cell::{Cell, RefCell};
use std::ops::Range;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ACTIVE: RefCell<Option<Rc<Session>>> = const { RefCell::new(None) };
}

/// Capture state shared by the tracer, the allocator and every well handle
/// issued during one session.
#[derive(Debug)]
pub(crate) struct Session {
    id: u64,
    closed: Cell<bool>,
    wells: RefCell<Vec<Vec<Operation>>>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            closed: Cell::new(false),
            wells: RefCell::new(Vec::new()),
        }
    }

    /// Reserves the next `count` indices. The running counter is the length
    /// of the recorded well list, so ranges never overlap.
    pub(crate) fn allocate(&self, count: usize) -> Result<Range<usize>> {
        self.ensure_open()?;
        let mut wells = self.wells.borrow_mut();
        let start = wells.len();
        wells.resize_with(start + count, Vec::new);
        debug!(session = self.id, start, count, "allocated wells");
        Ok(start..start + count)
    }

    pub(crate) fn record(&self, index: usize, op: Operation) -> Result<()> {
        self.ensure_open()?;
        let mut wells = self.wells.borrow_mut();
        let ops = wells
            .get_mut(index)
            .ok_or_else(|| Error::state(format!("well {} was not allocated", index)))?;
        ops.push(op);
        Ok(())
    }

    pub(crate) fn ops(&self, index: usize) -> Vec<Operation> {
        self.wells.borrow().get(index).cloned().unwrap_or_default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.get() {
            return Err(Error::state(
                "tracing session has already finished; its trace is immutable",
            ));
        }
        Ok(())
    }
}

pub(crate) fn active_session() -> Result<Rc<Session>> {
    ACTIVE
        .with(|slot| slot.borrow().clone())
        .ok_or_else(|| Error::validation("wells() called outside of an active tracing session"))
}

pub fn is_tracing() -> bool {
    ACTIVE.with(|slot| slot.borrow().is_some())
}

/// Installs a session on the current thread and removes it on every exit
/// path, including unwinding out of caller code.
struct SessionGuard {
    session: Rc<Session>,
}

impl SessionGuard {
    fn begin() -> Result<Self> {
        let session = Rc::new(Session::new());
        ACTIVE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(Error::state(
                    "a tracing session is already active on this thread",
                ));
            }
            *slot = Some(Rc::clone(&session));
            Ok(())
        })?;
        debug!(session = session.id, "tracing session started");
        Ok(Self { session })
    }

    fn finalize(&self) -> Trace {
        self.session.closed.set(true);
        let recorded = self.session.wells.borrow().clone();
        let trace = Trace::from_recorded(recorded);
        debug!(
            session = self.session.id,
            wells = trace.well_count(),
            ops = trace.op_count(),
            "tracing session finalized"
        );
        trace
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.closed.set(true);
        let _ = ACTIVE.try_with(|slot| {
            if let Ok(mut slot) = slot.try_borrow_mut() {
                *slot = None;
            }
        });
    }
}

/// Runs `routine` under a fresh capture session and returns the finalized
/// trace.
///
/// Errors returned by the routine are propagated unchanged and no trace is
/// produced. Sessions do not nest: calling `trace` from inside a routine
/// fails with [`Error::State`].
pub fn trace<F, E>(routine: F) -> std::result::Result<Trace, E>
where
    F: FnOnce() -> std::result::Result<(), E>,
    E: From<Error>,
{
    let guard = SessionGuard::begin()?;
    routine()?;
    Ok(guard.finalize())
}
