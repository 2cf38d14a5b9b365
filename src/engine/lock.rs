use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// Admits one automation session at a time, in arrival order.
///
/// Office automation servers misbehave when two sessions overlap, even across
/// different products, so every engine sharing a process shares one
/// coordinator.
#[derive(Default)]
pub struct SessionCoordinator {
    tickets: Mutex<Tickets>,
    turn: Condvar,
}

#[derive(Default)]
struct Tickets {
    next: u64,
    serving: u64,
}

impl SessionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until every earlier caller has released. The session ends when
    /// the guard drops.
    pub fn acquire(&self, holder: &str) -> SessionGuard<'_> {
        let mut t = self.tickets.lock();
        let ticket = t.next;
        t.next += 1;
        if t.serving != ticket {
            debug!(holder, ticket, "waiting for automation session");
        }
        while t.serving != ticket {
            self.turn.wait(&mut t);
        }
        debug!(holder, ticket, "automation session acquired");
        SessionGuard {
            owner: self,
            ticket,
        }
    }

    /// Callers holding or waiting for a session.
    pub fn pending(&self) -> u64 {
        let t = self.tickets.lock();
        t.next - t.serving
    }
}

#[must_use = "the session is released when the guard drops"]
pub struct SessionGuard<'a> {
    owner: &'a SessionCoordinator,
    ticket: u64,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        {
            let mut t = self.owner.tickets.lock();
            t.serving += 1;
        }
        debug!(ticket = self.ticket, "automation session released");
        self.owner.turn.notify_all();
    }
}
