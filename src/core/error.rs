//! Error types.
//!
//! Almost nothing in the cooldown engine is an error: bad input degrades to
//! "no-op" or "not on cooldown". The exceptions are the command
//! still-cooling-down condition, which callers must act on, and background
//! failures, which are recorded and logged but never reach a query or set.

use thiserror::Error;

/// Cooldown engine error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CooldownError {
    /// The command is still cooling down for this caller.
    ///
    /// `COMMAND_COOLDOWN` is a stable code; see [`CooldownError::code`].
    #[error("This command is on cooldown. Please wait {remaining_seconds} {}.", seconds_word(.remaining_seconds))]
    OnCooldown {
        command: String,
        remaining_seconds: u64,
    },

    /// The host cannot run periodic work (for example a test harness).
    #[error("periodic scheduler unavailable: {reason}")]
    SchedulerUnavailable { reason: String },

    /// A removal callback panicked during a drain.
    #[error("removal callback panicked in {domain} index")]
    CallbackPanicked { domain: &'static str },

    /// A whole domain drain failed.
    #[error("drain of {domain} index failed: {message}")]
    DrainFailed {
        domain: &'static str,
        message: String,
    },
}

fn seconds_word(n: &u64) -> &'static str {
    if *n == 1 {
        "second"
    } else {
        "seconds"
    }
}

impl CooldownError {
    /// Create an OnCooldown error.
    pub fn on_cooldown(command: impl Into<String>, remaining_seconds: u64) -> Self {
        Self::OnCooldown {
            command: command.into(),
            remaining_seconds,
        }
    }

    /// Create a SchedulerUnavailable error.
    pub fn scheduler_unavailable(reason: impl Into<String>) -> Self {
        Self::SchedulerUnavailable {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OnCooldown { .. } => "COMMAND_COOLDOWN",
            Self::SchedulerUnavailable { .. } => "SCHEDULER_UNAVAILABLE",
            Self::CallbackPanicked { .. } => "CALLBACK_PANICKED",
            Self::DrainFailed { .. } => "DRAIN_FAILED",
        }
    }

    /// Remaining seconds if this is the still-cooling-down condition.
    pub fn remaining_seconds(&self) -> Option<u64> {
        match self {
            Self::OnCooldown {
                remaining_seconds, ..
            } => Some(*remaining_seconds),
            _ => None,
        }
    }

    /// Check if this error is meant to be shown to the acting user.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::OnCooldown { .. })
    }
}

/// Result type using CooldownError.
pub type CooldownResult<T> = Result<T, CooldownError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_cooldown_message_plural() {
        let err = CooldownError::on_cooldown("heal", 9);
        assert_eq!(
            err.to_string(),
            "This command is on cooldown. Please wait 9 seconds."
        );
    }

    #[test]
    fn test_on_cooldown_message_singular() {
        let err = CooldownError::on_cooldown("heal", 1);
        assert_eq!(
            err.to_string(),
            "This command is on cooldown. Please wait 1 second."
        );
    }

    #[test]
    fn test_codes() {
        assert_eq!(CooldownError::on_cooldown("x", 0).code(), "COMMAND_COOLDOWN");
        assert_eq!(
            CooldownError::scheduler_unavailable("no runtime").code(),
            "SCHEDULER_UNAVAILABLE"
        );
    }

    #[test]
    fn test_remaining_seconds_accessor() {
        assert_eq!(CooldownError::on_cooldown("x", 4).remaining_seconds(), Some(4));
        assert!(CooldownError::on_cooldown("x", 4).is_user_facing());
        let err = CooldownError::DrainFailed {
            domain: "spell",
            message: "boom".into(),
        };
        assert_eq!(err.remaining_seconds(), None);
        assert!(!err.is_user_facing());
    }
}
