//! The state every connection handler reaches into, guarded by a
//! single short-lived lock rather than an actor/channel bus (§5: the
//! simpler of the two designs the shared maps permit).

use crate::dispatch::DispatcherRouter;
use crate::store::ObservationStore;
use crate::ticketing::TicketEngine;

#[derive(Debug, Default)]
pub struct Shared {
    pub observations: ObservationStore,
    pub tickets: TicketEngine,
    pub dispatch: DispatcherRouter,
}

impl Shared {
    pub fn new() -> Self {
        Self::default()
    }
}
