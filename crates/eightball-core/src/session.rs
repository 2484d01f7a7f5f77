//! Peripheral-side session state machine
//!
//! A peripheral works on at most one question at a time:
//!
//! ```text
//! Idle --question--> Busy --answer issued--> Answering --delivered--> Idle
//!                     |                          |
//!                     +--rejected--> Idle        +--failed--> Idle (reset) | Busy
//! Busy/Answering --question--> unchanged, rejected with DeviceBusy
//! ```
//!
//! The machine is pure: [`Session::apply`] computes the transition and reports
//! what happened, and the Peripheral facade turns outcomes into transport
//! writes and observer notifications.

use crate::device::CentralDevice;
use crate::errors::{RejectionReason, SessionError};
use crate::types::{DeviceId, ExchangeId, WriteToken};

// ----------------------------------------------------------------------------
// State
// ----------------------------------------------------------------------------

/// A question the peripheral has accepted and not yet answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuestion {
    pub central: CentralDevice,
    pub exchange: ExchangeId,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// Holding a question, waiting for the application to answer it
    Busy(PendingQuestion),
    /// The answer write has been issued and awaits completion
    Answering {
        question: PendingQuestion,
        answer: String,
        token: WriteToken,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Busy(_) => "busy",
            SessionState::Answering { .. } => "answering",
        }
    }

    pub fn pending(&self) -> Option<&PendingQuestion> {
        match self {
            SessionState::Idle => None,
            SessionState::Busy(question) => Some(question),
            SessionState::Answering { question, .. } => Some(question),
        }
    }
}

// ----------------------------------------------------------------------------
// Events and Outcomes
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    QuestionArrived(PendingQuestion),
    AnswerIssued {
        answer: String,
        to_question: String,
        token: WriteToken,
    },
    AnswerDelivered {
        token: WriteToken,
    },
    AnswerFailed {
        token: WriteToken,
        reset: bool,
    },
    /// The application declined the pending question
    Rejected,
    Reset,
    PeerLost(DeviceId),
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::QuestionArrived(_) => "question arrived",
            SessionEvent::AnswerIssued { .. } => "answer issued",
            SessionEvent::AnswerDelivered { .. } => "answer delivered",
            SessionEvent::AnswerFailed { .. } => "answer failed",
            SessionEvent::Rejected => "rejected",
            SessionEvent::Reset => "reset",
            SessionEvent::PeerLost(_) => "peer lost",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Idle -> Busy
    Accepted(PendingQuestion),
    /// A question arrived while not idle; the state is unchanged
    Reject(RejectionReason),
    /// Busy -> Answering
    AnswerPending(PendingQuestion),
    /// Answering -> Idle
    Delivered {
        question: PendingQuestion,
        answer: String,
    },
    /// Answering -> Idle or Busy, depending on `reset`
    Failed {
        question: PendingQuestion,
        answer: String,
        reset: bool,
    },
    /// Busy -> Idle after the application declined
    Declined(PendingQuestion),
    /// Forced back to Idle; carries whatever was pending
    Cleared(Option<PendingQuestion>),
    /// Stale or unrelated event; nothing changed
    Ignored,
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Session {
    state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.state, SessionState::Idle)
    }

    pub fn pending(&self) -> Option<&PendingQuestion> {
        self.state.pending()
    }

    /// Apply an event, returning what happened
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionOutcome, SessionError> {
        let invalid = SessionError::InvalidTransition {
            state: self.state.name(),
            event: event.name(),
        };
        let state = std::mem::take(&mut self.state);

        let (next, outcome) = match (state, event) {
            (SessionState::Idle, SessionEvent::QuestionArrived(question)) => (
                SessionState::Busy(question.clone()),
                SessionOutcome::Accepted(question),
            ),
            (state, SessionEvent::QuestionArrived(_)) => {
                (state, SessionOutcome::Reject(RejectionReason::DeviceBusy))
            }

            (
                SessionState::Busy(question),
                SessionEvent::AnswerIssued {
                    answer,
                    to_question,
                    token,
                },
            ) => {
                if question.question != to_question {
                    let mismatch = SessionError::QuestionMismatch {
                        pending: question.question.clone(),
                        given: to_question,
                    };
                    self.state = SessionState::Busy(question);
                    return Err(mismatch);
                }
                (
                    SessionState::Answering {
                        question: question.clone(),
                        answer,
                        token,
                    },
                    SessionOutcome::AnswerPending(question),
                )
            }

            (
                SessionState::Answering {
                    question,
                    answer,
                    token,
                },
                SessionEvent::AnswerDelivered { token: delivered },
            ) if token == delivered => (
                SessionState::Idle,
                SessionOutcome::Delivered { question, answer },
            ),

            (
                SessionState::Answering {
                    question,
                    answer,
                    token,
                },
                SessionEvent::AnswerFailed {
                    token: failed,
                    reset,
                },
            ) if token == failed => {
                let next = if reset {
                    SessionState::Idle
                } else {
                    SessionState::Busy(question.clone())
                };
                (
                    next,
                    SessionOutcome::Failed {
                        question,
                        answer,
                        reset,
                    },
                )
            }

            // Completions for writes the session no longer tracks
            (
                state,
                SessionEvent::AnswerDelivered { .. } | SessionEvent::AnswerFailed { .. },
            ) => (state, SessionOutcome::Ignored),

            (SessionState::Busy(question), SessionEvent::Rejected) => {
                (SessionState::Idle, SessionOutcome::Declined(question))
            }

            (state, SessionEvent::Reset) => (
                SessionState::Idle,
                SessionOutcome::Cleared(state.pending().cloned()),
            ),

            (state, SessionEvent::PeerLost(id)) => {
                if state.pending().is_some_and(|q| q.central.id == id) {
                    (
                        SessionState::Idle,
                        SessionOutcome::Cleared(state.pending().cloned()),
                    )
                } else {
                    (state, SessionOutcome::Ignored)
                }
            }

            (state, SessionEvent::AnswerIssued { .. } | SessionEvent::Rejected) => {
                self.state = state;
                return Err(invalid);
            }
        };

        self.state = next;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(text: &str) -> PendingQuestion {
        PendingQuestion {
            central: CentralDevice::anonymous(DeviceId::random()),
            exchange: ExchangeId::new(1),
            question: text.to_string(),
        }
    }

    fn busy(text: &str) -> Session {
        let mut session = Session::new();
        session
            .apply(SessionEvent::QuestionArrived(question(text)))
            .unwrap();
        session
    }

    fn issue(session: &mut Session, to_question: &str, token: u64) -> SessionOutcome {
        session
            .apply(SessionEvent::AnswerIssued {
                answer: "Yes".into(),
                to_question: to_question.into(),
                token: WriteToken::new(token),
            })
            .unwrap()
    }

    #[test]
    fn test_second_question_is_rejected_without_state_change() {
        let mut session = busy("First?");
        let before = session.state().clone();

        let outcome = session
            .apply(SessionEvent::QuestionArrived(question("Second?")))
            .unwrap();

        assert_eq!(outcome, SessionOutcome::Reject(RejectionReason::DeviceBusy));
        assert_eq!(session.state(), &before);
    }

    #[test]
    fn test_successful_answer_returns_to_idle() {
        let mut session = busy("Will it rain?");
        assert!(matches!(
            issue(&mut session, "Will it rain?", 7),
            SessionOutcome::AnswerPending(_)
        ));
        assert!(session.is_busy());

        let outcome = session
            .apply(SessionEvent::AnswerDelivered {
                token: WriteToken::new(7),
            })
            .unwrap();
        assert!(matches!(outcome, SessionOutcome::Delivered { ref answer, .. } if answer == "Yes"));
        assert!(!session.is_busy());
    }

    #[test]
    fn test_failed_answer_honours_reset_flag() {
        let mut session = busy("Q?");
        issue(&mut session, "Q?", 1);
        session
            .apply(SessionEvent::AnswerFailed {
                token: WriteToken::new(1),
                reset: false,
            })
            .unwrap();
        assert!(matches!(session.state(), SessionState::Busy(_)));

        issue(&mut session, "Q?", 2);
        session
            .apply(SessionEvent::AnswerFailed {
                token: WriteToken::new(2),
                reset: true,
            })
            .unwrap();
        assert_eq!(session.state(), &SessionState::Idle);
    }

    #[test]
    fn test_answer_to_wrong_question_is_refused() {
        let mut session = busy("Real?");
        let err = session
            .apply(SessionEvent::AnswerIssued {
                answer: "No".into(),
                to_question: "Other?".into(),
                token: WriteToken::new(1),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::QuestionMismatch { .. }));
        assert!(matches!(session.state(), SessionState::Busy(_)));
    }

    #[test]
    fn test_answer_while_idle_is_invalid() {
        let mut session = Session::new();
        let err = session
            .apply(SessionEvent::AnswerIssued {
                answer: "No".into(),
                to_question: "Q?".into(),
                token: WriteToken::new(1),
            })
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                state: "idle",
                event: "answer issued"
            }
        );
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let mut session = busy("Q?");
        issue(&mut session, "Q?", 3);
        let outcome = session
            .apply(SessionEvent::AnswerDelivered {
                token: WriteToken::new(99),
            })
            .unwrap();
        assert_eq!(outcome, SessionOutcome::Ignored);
        assert!(matches!(session.state(), SessionState::Answering { .. }));
    }

    #[test]
    fn test_peer_lost_clears_only_matching_central() {
        let mut session = busy("Q?");
        let central = session.pending().unwrap().central.id;

        let outcome = session
            .apply(SessionEvent::PeerLost(DeviceId::random()))
            .unwrap();
        assert_eq!(outcome, SessionOutcome::Ignored);
        assert!(session.is_busy());

        let outcome = session.apply(SessionEvent::PeerLost(central)).unwrap();
        assert!(matches!(outcome, SessionOutcome::Cleared(Some(_))));
        assert!(!session.is_busy());
    }

    #[test]
    fn test_decline_and_reset() {
        let mut session = busy("Q?");
        let outcome = session.apply(SessionEvent::Rejected).unwrap();
        assert!(matches!(outcome, SessionOutcome::Declined(_)));
        assert!(session.apply(SessionEvent::Rejected).is_err());

        let outcome = session.apply(SessionEvent::Reset).unwrap();
        assert_eq!(outcome, SessionOutcome::Cleared(None));
    }
}
