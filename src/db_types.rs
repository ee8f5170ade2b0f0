use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Lifecycle of a simulation run. Transitions are monotonic:
/// `Pending -> Running -> {Completed, Error}`. Terminal states never
/// change again; the repository rejects anything else.
#[derive(DbEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[ExistingTypePath = "crate::schema::sql_types::RunStatus"]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Error)
    }

    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match (self, next) {
            (RunStatus::Pending, RunStatus::Running) => true,
            (RunStatus::Running, RunStatus::Completed) => true,
            (RunStatus::Running, RunStatus::Error) => true,
            // Context load can fail before the run ever starts.
            (RunStatus::Pending, RunStatus::Error) => true,
            _ => false,
        }
    }
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotonic() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Error));
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Error));

        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Error));
        assert!(!RunStatus::Error.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Pending));
    }

    #[test]
    fn terminal_states() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Error.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
