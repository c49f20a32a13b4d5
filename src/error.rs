// =============================================================================
// Domain errors for the simulator core
// =============================================================================
//
// Startup and IO paths use `anyhow`; everything the candle series, the
// broadcast hub, and the synthesis collaborators can reject lives here so the
// scheduler can decide per variant whether to skip, log, or abort.
// =============================================================================

use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// A candle whose time is not exactly one minute after the current last
    /// candle. The append is rejected and the series is left untouched.
    #[error("out-of-order candle: expected time {expected}, got {got}")]
    OutOfOrderCandle {
        expected: NaiveDateTime,
        got: NaiveDateTime,
    },

    /// The series was read or appended to before it was seeded.
    #[error("candle series is empty (not seeded)")]
    EmptySeries,

    #[error("candle series is already seeded")]
    AlreadySeeded,

    #[error("seed length must be at least 1")]
    EmptySeed,

    /// A listener could not accept a message (queue full or closed).
    #[error("send to listener {listener} failed: {reason}")]
    ListenerSendFailure { listener: Uuid, reason: String },

    #[error("candle generation failed: {0}")]
    Generator(String),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SimError {
    /// Whether the scheduler should simply skip the current step and carry on
    /// with the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Generator(_) | Self::Analysis(_) | Self::ListenerSendFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn out_of_order_message_names_both_times() {
        let t = |m| {
            NaiveDate::from_ymd_opt(2025, 6, 30)
                .unwrap()
                .and_hms_opt(10, m, 0)
                .unwrap()
        };
        let err = SimError::OutOfOrderCandle {
            expected: t(3),
            got: t(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("2025-06-30 10:03:00"));
        assert!(msg.contains("2025-06-30 10:05:00"));
    }

    #[test]
    fn transient_classification() {
        assert!(SimError::Generator("boom".into()).is_transient());
        assert!(SimError::Analysis("boom".into()).is_transient());
        assert!(!SimError::EmptySeries.is_transient());
        assert!(!SimError::AlreadySeeded.is_transient());
    }
}
