use crate::ForemanError;
use crate::agents::AgentRepository;
use crate::deliveries::DeliveryRepository;
use crate::events::EventRepository;
use crate::review_loops::ReviewLoopRepository;
use crate::workflows::WorkflowRepository;

pub trait Store {
    type Agents<'a>: AgentRepository
    where
        Self: 'a;
    type Workflows<'a>: WorkflowRepository
    where
        Self: 'a;
    type ReviewLoops<'a>: ReviewLoopRepository
    where
        Self: 'a;
    type Deliveries<'a>: DeliveryRepository
    where
        Self: 'a;
    type Events<'a>: EventRepository
    where
        Self: 'a;

    fn agents(&self) -> Self::Agents<'_>;
    fn workflows(&self) -> Self::Workflows<'_>;
    fn review_loops(&self) -> Self::ReviewLoops<'_>;
    fn deliveries(&self) -> Self::Deliveries<'_>;
    fn events(&self) -> Self::Events<'_>;

    fn with_tx<F, T>(&self, f: F) -> Result<T, ForemanError>
    where
        F: FnOnce(&Self) -> Result<T, ForemanError>;
}
