use crate::types::enums::{ReviewLoopPhase, WorkflowPhase};

/// Legal workflow edges. The phase sequence is monotonic except for the
/// single PlanReview -> Planning re-planning edge.
pub fn workflow_can_advance(from: WorkflowPhase, to: WorkflowPhase) -> bool {
    use WorkflowPhase::{Complete, ContextReview, Implementing, PlanReview, Planning, Rejected};
    if from == to {
        return false;
    }
    match from {
        ContextReview => matches!(to, Planning | Implementing | Rejected),
        Planning => matches!(to, PlanReview | Implementing | Rejected),
        PlanReview => matches!(to, Implementing | Planning | Rejected),
        Implementing => matches!(to, Complete | Rejected),
        Complete | Rejected => false,
    }
}

/// Legal review-loop edges. Final phases admit nothing.
pub fn loop_can_advance(from: ReviewLoopPhase, to: ReviewLoopPhase) -> bool {
    use ReviewLoopPhase::{
        Approved, AwaitingReview, Complete, Failed, Fixing, HumanReview, MaxIterations,
        RequestingReview,
    };
    if from == to {
        return false;
    }
    match from {
        RequestingReview => matches!(to, AwaitingReview | Failed),
        // Complete from the cycle phases covers a human merging the PR
        // before the loop settles.
        AwaitingReview => {
            matches!(
                to,
                Fixing | Approved | HumanReview | Complete | MaxIterations | Failed
            )
        }
        Fixing => matches!(to, AwaitingReview | Complete | MaxIterations | Failed),
        Approved | HumanReview => matches!(to, Complete | Failed),
        Complete | MaxIterations | Failed => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::enums::{ReviewLoopPhase as L, WorkflowPhase as W};

    #[test]
    fn workflow_happy_path_is_allowed() {
        let path = [
            (W::ContextReview, W::Planning),
            (W::Planning, W::PlanReview),
            (W::PlanReview, W::Implementing),
            (W::Implementing, W::Complete),
        ];
        for (from, to) in path {
            assert!(
                workflow_can_advance(from, to),
                "expected {from:?} -> {to:?} to be allowed"
            );
        }
    }

    #[test]
    fn workflow_replanning_edge_is_allowed() {
        assert!(workflow_can_advance(W::PlanReview, W::Planning));
    }

    #[test]
    fn workflow_never_regresses_otherwise() {
        assert!(!workflow_can_advance(W::Planning, W::ContextReview));
        assert!(!workflow_can_advance(W::Implementing, W::PlanReview));
        assert!(!workflow_can_advance(W::Implementing, W::Planning));
    }

    #[test]
    fn workflow_terminals_admit_nothing() {
        for to in [
            W::ContextReview,
            W::Planning,
            W::PlanReview,
            W::Implementing,
        ] {
            assert!(!workflow_can_advance(W::Complete, to));
            assert!(!workflow_can_advance(W::Rejected, to));
        }
    }

    #[test]
    fn workflow_skip_paths_are_allowed() {
        // Skipping plan review jumps straight to implementation.
        assert!(workflow_can_advance(W::Planning, W::Implementing));
        // Skipping both review stages.
        assert!(workflow_can_advance(W::ContextReview, W::Implementing));
    }

    #[test]
    fn loop_cycle_is_allowed() {
        assert!(loop_can_advance(L::RequestingReview, L::AwaitingReview));
        assert!(loop_can_advance(L::AwaitingReview, L::Fixing));
        assert!(loop_can_advance(L::Fixing, L::AwaitingReview));
        assert!(loop_can_advance(L::AwaitingReview, L::Approved));
        assert!(loop_can_advance(L::Approved, L::Complete));
    }

    #[test]
    fn loop_final_phases_admit_nothing() {
        for from in [L::Complete, L::MaxIterations, L::Failed] {
            for to in [
                L::RequestingReview,
                L::AwaitingReview,
                L::Fixing,
                L::Approved,
                L::HumanReview,
                L::Complete,
            ] {
                assert!(!loop_can_advance(from, to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn loop_exhaustion_reachable_from_both_cycle_phases() {
        assert!(loop_can_advance(L::AwaitingReview, L::MaxIterations));
        assert!(loop_can_advance(L::Fixing, L::MaxIterations));
    }

    #[test]
    fn loop_human_merge_completes_from_cycle_phases() {
        assert!(loop_can_advance(L::AwaitingReview, L::Complete));
        assert!(loop_can_advance(L::Fixing, L::Complete));
    }
}
