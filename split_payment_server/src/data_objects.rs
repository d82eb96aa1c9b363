use std::fmt::Display;

use serde::{Deserialize, Serialize};
use split_payment_engine::ReconcileOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }
}

impl From<&ReconcileOutcome> for JsonResponse {
    /// Every outcome is a success from the provider's point of view. Only infrastructure errors are reported as
    /// failures, and those never get this far.
    fn from(outcome: &ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::Applied(applied) => Self::success(&applied.detail),
            ReconcileOutcome::AlreadyProcessed => Self::success("Event already processed."),
            ReconcileOutcome::NotApplicable(reason) => Self::success(format!("Event not applicable. {reason}")),
            ReconcileOutcome::Ignored(reason) => Self::success(format!("Event ignored. {reason}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginLink {
    pub url: String,
}
