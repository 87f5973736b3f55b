use crate::download::scheduler::BatchOutcome;

// Exit codes for CLI automation
pub const SUCCESS: i32 = 0;
pub const ERROR: i32 = 1;
pub const NOTHING_TO_RESUME: i32 = 2;
pub const INVALID_INPUT: i32 = 3;
pub const PARTIAL_SUCCESS: i32 = 4;

pub fn for_outcome(outcome: BatchOutcome) -> i32 {
    match outcome {
        BatchOutcome::AllSucceeded => SUCCESS,
        BatchOutcome::PartialSuccess => PARTIAL_SUCCESS,
        BatchOutcome::TotalFailure => ERROR,
    }
}
