use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a tracked transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    /// Request seen, no response yet
    Created,
    /// At least one provisional response
    Established,
    /// Final response seen
    Terminated,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Created => write!(f, "created"),
            TransactionState::Established => write!(f, "established"),
            TransactionState::Terminated => write!(f, "terminated"),
        }
    }
}

/// How a transaction ended, decided when it is routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionOutcome {
    /// 2xx
    Answered,
    /// 3xx
    Redirected,
    /// 4xx to 6xx
    Failed,
    /// No response at all
    Unanswered,
    /// Provisional responses only
    Incomplete,
}

impl TransactionOutcome {
    /// Classify from the lifecycle state and the final status code
    pub fn classify(state: TransactionState, status_code: Option<u16>) -> Self {
        match (state, status_code) {
            (TransactionState::Terminated, Some(code)) if (200..300).contains(&code) => {
                TransactionOutcome::Answered
            }
            (TransactionState::Terminated, Some(code)) if (300..400).contains(&code) => {
                TransactionOutcome::Redirected
            }
            (TransactionState::Terminated, _) => TransactionOutcome::Failed,
            (TransactionState::Established, _) => TransactionOutcome::Incomplete,
            (TransactionState::Created, _) => TransactionOutcome::Unanswered,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionOutcome::Answered => "answered",
            TransactionOutcome::Redirected => "redirected",
            TransactionOutcome::Failed => "failed",
            TransactionOutcome::Unanswered => "unanswered",
            TransactionOutcome::Incomplete => "incomplete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        use TransactionOutcome::*;
        use TransactionState::*;

        assert_eq!(TransactionOutcome::classify(Terminated, Some(200)), Answered);
        assert_eq!(TransactionOutcome::classify(Terminated, Some(302)), Redirected);
        assert_eq!(TransactionOutcome::classify(Terminated, Some(486)), Failed);
        assert_eq!(TransactionOutcome::classify(Terminated, Some(603)), Failed);
        assert_eq!(TransactionOutcome::classify(Established, Some(180)), Incomplete);
        assert_eq!(TransactionOutcome::classify(Created, None), Unanswered);
    }
}
