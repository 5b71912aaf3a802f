//! Single-threaded run loop driving all periodic work.
//!
//! The reactor is the only scheduler in the process: it multiplexes a small
//! fixed set of descriptors (real sockets plus "virtual" registrations that
//! exist purely to receive ticks) and dispatches every handler exactly once
//! per iteration. Handlers run to completion; mutual exclusion is
//! structural, not lock-based.

use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, error, warn};

use crate::common;

/// Most handlers a reactor accepts; registrations past this are rejected.
pub const MAX_HANDLERS: usize = 16;

/// Upper bound on one wait for descriptor readiness.
pub const TICK_QUANTUM: Duration = Duration::from_secs(1);

/// A handler invoked once per loop iteration with the application state,
/// the per-iteration clock snapshot (epoch seconds), and whether the
/// handler's own descriptor was among the ready set.
pub type Callback<A> = Box<dyn FnMut(&mut A, u64, bool)>;

/// The process-wide run loop.
///
/// Generic over the application state handed to every handler, so the
/// engines stay free of ambient globals.
pub struct Reactor<A> {
    poll: Poll,
    events: Events,
    tasks: Vec<Task<A>>,
    running: Arc<AtomicBool>,
}

struct Task<A> {
    fd: Option<RawFd>,
    callback: Callback<A>,
}

impl<A> Reactor<A> {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(MAX_HANDLERS),
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Flag that keeps [Reactor::run] looping. Clear it (for example from a
    /// signal handler, or from a handler hitting a fatal condition) to shut
    /// the loop down after the current iteration.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Register a handler, invoked once per loop iteration in registration
    /// order.
    ///
    /// With `Some(fd)` the handler is told whether its descriptor was
    /// readable; with `None` it is called purely for its periodic side
    /// effects and always passed `readable = false`.
    ///
    /// Registrations beyond [MAX_HANDLERS] are rejected with a log line and
    /// without affecting the handlers already registered.
    pub fn register(&mut self, fd: Option<RawFd>, callback: Callback<A>) -> io::Result<()> {
        if self.tasks.len() >= MAX_HANDLERS {
            warn!(
                limit = MAX_HANDLERS,
                "too many handlers registered, rejecting"
            );
            return Ok(());
        }

        if let Some(fd) = fd {
            self.poll.registry().register(
                &mut SourceFd(&fd),
                Token(self.tasks.len()),
                Interest::READABLE,
            )?;
        }

        self.tasks.push(Task { fd, callback });

        Ok(())
    }

    /// Run until the running flag is cleared or the wait fails.
    ///
    /// Each iteration refreshes the clock snapshot once, waits up to
    /// [TICK_QUANTUM] for any descriptor to become readable, then invokes
    /// every handler exactly once. An interrupted wait retries; any other
    /// wait failure terminates the loop with the error.
    pub fn run(&mut self, app: &mut A) -> io::Result<()> {
        while self.running.load(Ordering::SeqCst) {
            let now = common::now();

            match self.poll.poll(&mut self.events, Some(TICK_QUANTUM)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "descriptor wait failed, terminating run loop");
                    self.deregister_all();
                    return Err(e);
                }
            }

            let events = &self.events;
            for (index, task) in self.tasks.iter_mut().enumerate() {
                let readable = task.fd.is_some()
                    && events.iter().any(|event| event.token() == Token(index));

                (task.callback)(app, now, readable);
            }
        }

        debug!("run loop stopped");
        self.deregister_all();

        Ok(())
    }

    /// Detach every real descriptor from the poll registry. Closing is the
    /// descriptor owner's concern; dropping the owning socket does it.
    fn deregister_all(&mut self) {
        for task in &self.tasks {
            if let Some(fd) = task.fd {
                let _ = self.poll.registry().deregister(&mut SourceFd(&fd));
            }
        }
    }
}

impl<A> std::fmt::Debug for Reactor<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("tasks", &self.tasks.len())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}
