//! Message authoring dialogue: title → body → delay → link.
//!
//! Each step validates its own input. A rejected input leaves the session
//! in the same state so the operator can simply try again.

use dripcast_core::error::{DripError, Result};
use dripcast_core::types::{DelayHours, NewMessage};

pub const PROMPT_TITLE: &str = "Enter the message title:";
pub const PROMPT_BODY: &str = "Enter the message text:";
pub const PROMPT_DELAY: &str =
    "How many hours after registration should this message be sent? Fractions are allowed, e.g. 1.5";
pub const PROMPT_LINK: &str = "Enter the link to append to the message (or - for none):";

/// Where an authoring session is.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthoringState {
    AwaitingTitle,
    AwaitingBody {
        title: String,
    },
    AwaitingDelay {
        title: String,
        body: String,
    },
    AwaitingLink {
        title: String,
        body: String,
        delay: DelayHours,
    },
    Done,
}

/// What the operator should see after a successful step.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Prompt(&'static str),
    Complete(NewMessage),
}

/// One operator's in-progress message definition.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthoringSession {
    state: AuthoringState,
    min_delay_hours: f64,
}

impl AuthoringSession {
    /// New session plus the first prompt.
    pub fn start(min_delay_hours: f64) -> (Self, &'static str) {
        (
            Self {
                state: AuthoringState::AwaitingTitle,
                min_delay_hours,
            },
            PROMPT_TITLE,
        )
    }

    pub fn state(&self) -> &AuthoringState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == AuthoringState::Done
    }

    /// Feed one operator reply.
    pub fn submit(&mut self, input: &str) -> Result<Advance> {
        let input = input.trim();
        match &self.state {
            AuthoringState::AwaitingTitle => {
                let title = non_empty(input, "title")?;
                self.state = AuthoringState::AwaitingBody { title };
                Ok(Advance::Prompt(PROMPT_BODY))
            }
            AuthoringState::AwaitingBody { title } => {
                let body = non_empty(input, "text")?;
                self.state = AuthoringState::AwaitingDelay {
                    title: title.clone(),
                    body,
                };
                Ok(Advance::Prompt(PROMPT_DELAY))
            }
            AuthoringState::AwaitingDelay { title, body } => {
                // Any non-negative finite number first, then the configured minimum
                let hours = DelayHours::parse(input, 0.0).map_err(|_| {
                    DripError::Validation("Enter a valid number (fractions are allowed):".into())
                })?;
                let delay = DelayHours::new(hours.hours(), self.min_delay_hours).map_err(|_| {
                    DripError::Validation(format!(
                        "The minimum delay is {} hours (about {} minute(s)). Try again:",
                        self.min_delay_hours,
                        (self.min_delay_hours * 60.0).round()
                    ))
                })?;
                self.state = AuthoringState::AwaitingLink {
                    title: title.clone(),
                    body: body.clone(),
                    delay,
                };
                Ok(Advance::Prompt(PROMPT_LINK))
            }
            AuthoringState::AwaitingLink { title, body, delay } => {
                let link = if input == "-" { String::new() } else { input.to_string() };
                let message = NewMessage {
                    title: title.clone(),
                    body: body.clone(),
                    delay: *delay,
                    link,
                };
                self.state = AuthoringState::Done;
                Ok(Advance::Complete(message))
            }
            AuthoringState::Done => Err(DripError::Validation(
                "This message is already saved.".into(),
            )),
        }
    }
}

fn non_empty(input: &str, what: &str) -> Result<String> {
    if input.is_empty() {
        Err(DripError::Validation(format!("The {what} cannot be empty. Try again:")))
    } else {
        Ok(input.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_flow() {
        let (mut s, prompt) = AuthoringSession::start(0.016);
        assert_eq!(prompt, PROMPT_TITLE);
        assert_eq!(s.submit("Day 1").unwrap(), Advance::Prompt(PROMPT_BODY));
        assert_eq!(s.submit("Welcome!").unwrap(), Advance::Prompt(PROMPT_DELAY));
        assert_eq!(s.submit("1.5").unwrap(), Advance::Prompt(PROMPT_LINK));

        let Advance::Complete(msg) = s.submit("https://example.com").unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(msg.title, "Day 1");
        assert_eq!(msg.body, "Welcome!");
        assert!((msg.delay.hours() - 1.5).abs() < f64::EPSILON);
        assert_eq!(msg.link, "https://example.com");
        assert!(s.is_done());
        assert!(s.submit("more").is_err());
    }

    #[test]
    fn test_bad_delay_keeps_state() {
        let (mut s, _) = AuthoringSession::start(0.016);
        s.submit("t").unwrap();
        s.submit("b").unwrap();

        let err = s.submit("tomorrow").unwrap_err();
        assert!(err.to_string().contains("valid number"));
        assert!(matches!(s.state(), AuthoringState::AwaitingDelay { .. }));

        let err = s.submit("0.01").unwrap_err();
        assert!(err.to_string().contains("minimum delay is 0.016"));
        assert!(matches!(s.state(), AuthoringState::AwaitingDelay { .. }));

        for input in ["-3", "NaN", "inf", "-0.5"] {
            let err = s.submit(input).unwrap_err();
            assert!(err.to_string().contains("valid number"), "{input}");
        }
        assert!(matches!(s.state(), AuthoringState::AwaitingDelay { .. }));

        assert_eq!(s.submit("0.016").unwrap(), Advance::Prompt(PROMPT_LINK));
    }

    #[test]
    fn test_empty_title_rejected() {
        let (mut s, _) = AuthoringSession::start(0.016);
        assert!(s.submit("   ").is_err());
        assert_eq!(s.state(), &AuthoringState::AwaitingTitle);
    }

    #[test]
    fn test_dash_means_no_link() {
        let (mut s, _) = AuthoringSession::start(0.016);
        s.submit("t").unwrap();
        s.submit("b").unwrap();
        s.submit("2").unwrap();
        let Advance::Complete(msg) = s.submit("-").unwrap() else {
            panic!("expected completion");
        };
        assert!(msg.link.is_empty());
    }
}
