use fm_core::ForemanError;
use fm_core::error::EventError;
use fm_core::store::Store;
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::agent_repo::AgentRepo;
use crate::delivery_repo::DeliveryRepo;
use crate::event_repo::EventRepo;
use crate::review_loop_repo::ReviewLoopRepo;
use crate::workflow_repo::WorkflowRepo;

/// The connection sits behind a mutex so the store is `Sync` and service
/// futures borrowing it stay `Send`. Each repository holds the lock only
/// for the duration of one call; nothing holds a repository across an
/// await.
pub struct DbStore {
    conn: Mutex<Connection>,
}

impl DbStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock means a panic mid-call; the connection itself
        // is still usable.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn tx_error(err: rusqlite::Error) -> ForemanError {
    ForemanError::Event(EventError::Storage {
        message: err.to_string(),
    })
}

impl Store for DbStore {
    type Agents<'a>
        = AgentRepo<'a>
    where
        Self: 'a;
    type Workflows<'a>
        = WorkflowRepo<'a>
    where
        Self: 'a;
    type ReviewLoops<'a>
        = ReviewLoopRepo<'a>
    where
        Self: 'a;
    type Deliveries<'a>
        = DeliveryRepo<'a>
    where
        Self: 'a;
    type Events<'a>
        = EventRepo<'a>
    where
        Self: 'a;

    fn agents(&self) -> Self::Agents<'_> {
        AgentRepo::new(self.lock())
    }

    fn workflows(&self) -> Self::Workflows<'_> {
        WorkflowRepo::new(self.lock())
    }

    fn review_loops(&self) -> Self::ReviewLoops<'_> {
        ReviewLoopRepo::new(self.lock())
    }

    fn deliveries(&self) -> Self::Deliveries<'_> {
        DeliveryRepo::new(self.lock())
    }

    fn events(&self) -> Self::Events<'_> {
        EventRepo::new(self.lock())
    }

    fn with_tx<F, T>(&self, f: F) -> Result<T, ForemanError>
    where
        F: FnOnce(&Self) -> Result<T, ForemanError>,
    {
        self.lock()
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(tx_error)?;
        let result = f(self);
        match result {
            Ok(value) => {
                self.lock().execute_batch("COMMIT").map_err(tx_error)?;
                Ok(value)
            }
            Err(err) => {
                self.lock().execute_batch("ROLLBACK").map_err(tx_error)?;
                Err(err)
            }
        }
    }
}
