use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Refresh,
    Sync,
}

/// Handle held by one in-flight refresh or sync pass.
///
/// Checked at every checkpoint; once a newer task of the same kind begins,
/// this ticket is cancelled and must not write shared state again.
#[derive(Debug, Clone)]
pub struct TaskTicket {
    kind: TaskKind,
    generation: u64,
    token: CancellationToken,
}

impl TaskTicket {
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the ticket is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    token: Option<CancellationToken>,
}

/// At most one in-flight task per [`TaskKind`]; starting a new one cancels
/// the previous.
#[derive(Debug, Default)]
pub struct TaskSupervisor {
    refresh: Slot,
    sync: Slot,
}

impl TaskSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, kind: TaskKind) -> &Slot {
        match kind {
            TaskKind::Refresh => &self.refresh,
            TaskKind::Sync => &self.sync,
        }
    }

    fn slot_mut(&mut self, kind: TaskKind) -> &mut Slot {
        match kind {
            TaskKind::Refresh => &mut self.refresh,
            TaskKind::Sync => &mut self.sync,
        }
    }

    pub fn begin(&mut self, kind: TaskKind) -> TaskTicket {
        let slot = self.slot_mut(kind);
        if let Some(prev) = slot.token.take() {
            prev.cancel();
            debug!(?kind, generation = slot.generation, "superseded in-flight task");
        }
        slot.generation += 1;
        let token = CancellationToken::new();
        slot.token = Some(token.clone());
        TaskTicket {
            kind,
            generation: slot.generation,
            token,
        }
    }

    /// Whether `ticket` is still the newest task of its kind.
    #[must_use]
    pub fn is_current(&self, ticket: &TaskTicket) -> bool {
        !ticket.is_cancelled() && self.slot(ticket.kind).generation == ticket.generation
    }

    /// Release the slot if `ticket` still owns it.
    pub fn finish(&mut self, ticket: &TaskTicket) {
        if self.is_current(ticket) {
            self.slot_mut(ticket.kind).token = None;
        }
    }

    #[must_use]
    pub fn in_flight(&self, kind: TaskKind) -> bool {
        self.slot(kind).token.is_some()
    }

    pub fn cancel_all(&mut self) {
        for kind in [TaskKind::Refresh, TaskKind::Sync] {
            if let Some(token) = self.slot_mut(kind).token.take() {
                token.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_supersedes_previous() {
        let mut sup = TaskSupervisor::new();
        let a = sup.begin(TaskKind::Refresh);
        assert!(sup.is_current(&a));

        let b = sup.begin(TaskKind::Refresh);
        assert!(a.is_cancelled());
        assert!(!sup.is_current(&a));
        assert!(sup.is_current(&b));
        assert!(b.generation() > a.generation());
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut sup = TaskSupervisor::new();
        let refresh = sup.begin(TaskKind::Refresh);
        let sync = sup.begin(TaskKind::Sync);
        let _sync2 = sup.begin(TaskKind::Sync);
        assert!(sync.is_cancelled());
        assert!(!refresh.is_cancelled());
        assert!(sup.is_current(&refresh));
    }

    #[test]
    fn test_finish_releases_slot() {
        let mut sup = TaskSupervisor::new();
        let a = sup.begin(TaskKind::Sync);
        assert!(sup.in_flight(TaskKind::Sync));
        sup.finish(&a);
        assert!(!sup.in_flight(TaskKind::Sync));
        // Finishing does not cancel the ticket itself
        assert!(!a.is_cancelled());
    }

    #[test]
    fn test_stale_finish_keeps_newer_task() {
        let mut sup = TaskSupervisor::new();
        let a = sup.begin(TaskKind::Sync);
        let b = sup.begin(TaskKind::Sync);
        sup.finish(&a);
        assert!(sup.in_flight(TaskKind::Sync));
        assert!(sup.is_current(&b));
    }

    #[test]
    fn test_cancel_all() {
        let mut sup = TaskSupervisor::new();
        let a = sup.begin(TaskKind::Refresh);
        let b = sup.begin(TaskKind::Sync);
        sup.cancel_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(!sup.in_flight(TaskKind::Refresh));
        assert!(!sup.in_flight(TaskKind::Sync));
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let mut sup = TaskSupervisor::new();
        let a = sup.begin(TaskKind::Refresh);
        let waiter = {
            let a = a.clone();
            tokio::spawn(async move { a.cancelled().await })
        };
        sup.begin(TaskKind::Refresh);
        waiter.await.unwrap();
    }
}
