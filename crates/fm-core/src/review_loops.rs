use crate::error::ReviewLoopError;
use crate::types::ids::ReviewLoopId;
use crate::types::review_loop::{ReviewLoopHistoryEntry, ReviewLoopRecord};

/// Review-loop records plus the normalized PR-URL and branch lookup keys
/// used to resolve inbound webhook deliveries. Lookup arguments must be
/// normalized with `crate::normalize` before the call.
pub trait ReviewLoopRepository {
    fn get(&self, id: &ReviewLoopId) -> Result<Option<ReviewLoopRecord>, ReviewLoopError>;
    fn save(&self, record: &ReviewLoopRecord) -> Result<(), ReviewLoopError>;
    fn delete(&self, id: &ReviewLoopId) -> Result<bool, ReviewLoopError>;
    fn find_by_pr_url(&self, pr_url_key: &str)
    -> Result<Option<ReviewLoopRecord>, ReviewLoopError>;
    fn find_by_branch(&self, branch_key: &str)
    -> Result<Option<ReviewLoopRecord>, ReviewLoopError>;
    fn append_history(&self, entry: &ReviewLoopHistoryEntry) -> Result<(), ReviewLoopError>;
    fn history(&self, id: &ReviewLoopId) -> Result<Vec<ReviewLoopHistoryEntry>, ReviewLoopError>;
}
