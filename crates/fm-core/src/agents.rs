use crate::error::AgentError;
use crate::types::agent::AgentRecord;
use crate::types::ids::AgentId;
use crate::types::io::AgentFilter;

/// Durable agent records plus the active-agent index. Implementations must
/// keep the index row present exactly while the status is non-terminal, and
/// must remove every index entry on delete.
pub trait AgentRepository {
    fn get(&self, id: &AgentId) -> Result<Option<AgentRecord>, AgentError>;
    fn save(&self, record: &AgentRecord) -> Result<(), AgentError>;
    fn delete(&self, id: &AgentId) -> Result<bool, AgentError>;
    fn list(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>, AgentError>;
    fn list_active(&self) -> Result<Vec<AgentRecord>, AgentError>;
    fn list_by_user(&self, user_id: &str) -> Result<Vec<AgentRecord>, AgentError>;
}
