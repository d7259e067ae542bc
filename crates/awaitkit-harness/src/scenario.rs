#![forbid(unsafe_code)]

//! Lifecycle recording for scenario tests.
//!
//! A [`Recorder`] wires itself into every hook of an [`AwaitBuilder`] and
//! keeps the calls in order, so a test can assert the exact callback
//! sequence a binding produced.

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use awaitkit_core::lab::LabHost;
use awaitkit_runtime::binding::AwaitBuilder;
use web_time::Duration;

/// One lifecycle callback invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
    Start(bool),
    End(bool),
    Error(String),
    Final(bool),
}

#[derive(Debug, Clone, Default)]
pub struct Recorder {
    calls: Rc<RefCell<Vec<Hook>>>,
}

impl Recorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install every hook on `builder`. Errors are recorded via `Display`.
    #[must_use]
    pub fn attach<T, E, Out>(&self, builder: AwaitBuilder<T, E, Out>) -> AwaitBuilder<T, E, Out>
    where
        T: Clone + 'static,
        E: Clone + Display + 'static,
        Out: 'static,
    {
        let start = Rc::clone(&self.calls);
        let end = Rc::clone(&self.calls);
        let error = Rc::clone(&self.calls);
        let fin = Rc::clone(&self.calls);
        builder
            .on_start(move |first| start.borrow_mut().push(Hook::Start(first)))
            .on_end(move |first| end.borrow_mut().push(Hook::End(first)))
            .on_error(move |e: &E| error.borrow_mut().push(Hook::Error(e.to_string())))
            .on_final(move |first| fin.borrow_mut().push(Hook::Final(first)))
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Hook> {
        self.calls.borrow().clone()
    }

    /// Drain the recorded calls.
    pub fn take(&self) -> Vec<Hook> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    #[must_use]
    pub fn count(&self, pred: impl Fn(&Hook) -> bool) -> usize {
        self.calls.borrow().iter().filter(|h| pred(h)).count()
    }
}

/// Advance `lab` by `ms` virtual milliseconds.
pub fn advance_ms(lab: &LabHost, ms: u64) -> usize {
    lab.advance(Duration::from_millis(ms))
}
