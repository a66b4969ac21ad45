use crate::domain::error::EngineError;
use crate::domain::models::RunStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    Begin,
    Complete,
    Abandon,
    Reset,
    ToggleTask,
}

impl RunEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Complete => "complete",
            Self::Abandon => "abandon",
            Self::Reset => "reset",
            Self::ToggleTask => "toggle_task",
        }
    }
}

/// Status reached by applying `event` to a run currently in `status`.
pub fn transition(status: RunStatus, event: RunEvent) -> Result<RunStatus, EngineError> {
    let next = match (status, event) {
        (RunStatus::Completed | RunStatus::Abandoned, _) => None,
        (RunStatus::Planned, RunEvent::Begin) => Some(RunStatus::InProgress),
        (RunStatus::InProgress, RunEvent::Complete) => Some(RunStatus::Completed),
        (RunStatus::Planned | RunStatus::InProgress, RunEvent::Abandon) => {
            Some(RunStatus::Abandoned)
        }
        (RunStatus::Planned | RunStatus::InProgress, RunEvent::Reset) => {
            Some(RunStatus::InProgress)
        }
        (RunStatus::Planned | RunStatus::InProgress, RunEvent::ToggleTask) => Some(status),
        (RunStatus::InProgress, RunEvent::Begin) | (RunStatus::Planned, RunEvent::Complete) => {
            None
        }
    };

    next.ok_or_else(|| {
        EngineError::InvalidTransition(format!(
            "cannot {} a run that is {}",
            event.as_str(),
            status.as_str()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_EVENTS: [RunEvent; 5] = [
        RunEvent::Begin,
        RunEvent::Complete,
        RunEvent::Abandon,
        RunEvent::Reset,
        RunEvent::ToggleTask,
    ];

    #[test]
    fn in_progress_transitions() {
        assert_eq!(
            transition(RunStatus::InProgress, RunEvent::Complete),
            Ok(RunStatus::Completed)
        );
        assert_eq!(
            transition(RunStatus::InProgress, RunEvent::Abandon),
            Ok(RunStatus::Abandoned)
        );
        assert_eq!(
            transition(RunStatus::InProgress, RunEvent::Reset),
            Ok(RunStatus::InProgress)
        );
        assert_eq!(
            transition(RunStatus::InProgress, RunEvent::ToggleTask),
            Ok(RunStatus::InProgress)
        );
        assert!(transition(RunStatus::InProgress, RunEvent::Begin).is_err());
    }

    #[test]
    fn planned_transitions() {
        assert_eq!(
            transition(RunStatus::Planned, RunEvent::Begin),
            Ok(RunStatus::InProgress)
        );
        assert_eq!(
            transition(RunStatus::Planned, RunEvent::Reset),
            Ok(RunStatus::InProgress)
        );
        assert_eq!(
            transition(RunStatus::Planned, RunEvent::Abandon),
            Ok(RunStatus::Abandoned)
        );
        assert_eq!(
            transition(RunStatus::Planned, RunEvent::ToggleTask),
            Ok(RunStatus::Planned)
        );
        assert!(matches!(
            transition(RunStatus::Planned, RunEvent::Complete),
            Err(EngineError::InvalidTransition(_))
        ));
    }

    #[test]
    fn terminal_states_reject_every_event() {
        for status in [RunStatus::Completed, RunStatus::Abandoned] {
            for event in ALL_EVENTS {
                let result = transition(status, event);
                assert!(
                    matches!(result, Err(EngineError::InvalidTransition(_))),
                    "{status:?} + {event:?} should be rejected"
                );
            }
        }
    }

    #[test]
    fn rejection_detail_names_event_and_status() {
        let error = transition(RunStatus::Abandoned, RunEvent::Reset).expect_err("terminal");
        assert_eq!(error.detail(), "cannot reset a run that is abandoned");
    }
}
