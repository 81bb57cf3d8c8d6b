use crate::error::WorkflowError;
use crate::types::ids::WorkflowId;
use crate::types::workflow::WorkflowRecord;

pub trait WorkflowRepository {
    fn get(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>, WorkflowError>;
    fn save(&self, record: &WorkflowRecord) -> Result<(), WorkflowError>;
    fn delete(&self, id: &WorkflowId) -> Result<bool, WorkflowError>;
}
