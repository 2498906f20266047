//! Pending-prompt state machine for history queries.
//!
//! When a history command arrives without dates, the bot prompts for the
//! start and stop bounds in turn. Each pending command is an explicit
//! state machine advanced by the next incoming message, with the partial
//! result stored alongside.

use chrono::{DateTime, FixedOffset};

use nimbus_timerange::{DisplayZone, ResolvedTimeRange, parse_datetime};

use crate::INVALID_DATE_REPLY;

pub const PROMPT_START: &str = "请输入你要查询的起始日期（如 2022-01-01）";
pub const PROMPT_STOP: &str = "请输入你要查询的结束日期（如 2022-02-22）";

/// Result of feeding one message to a pending command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Ask the user for the next piece.
    Prompt(&'static str),
    /// The input did not parse; same prompt applies again.
    Rejected(&'static str),
    /// Both bounds collected.
    Complete(ResolvedTimeRange),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingStart,
    AwaitingStop,
}

/// A history query waiting for its date bounds.
#[derive(Debug, Clone)]
pub struct PendingRange {
    state: State,
    start: Option<DateTime<FixedOffset>>,
    mine: bool,
}

impl PendingRange {
    pub fn new(mine: bool) -> Self {
        Self {
            state: State::AwaitingStart,
            start: None,
            mine,
        }
    }

    /// Whether the original command carried the "mine" modifier.
    pub fn mine(&self) -> bool {
        self.mine
    }

    /// The prompt to send for the currently awaited piece.
    pub fn prompt(&self) -> &'static str {
        match self.state {
            State::AwaitingStart => PROMPT_START,
            State::AwaitingStop => PROMPT_STOP,
        }
    }

    /// Feed the next incoming message.
    pub fn advance(&mut self, zone: &DisplayZone, input: &str) -> Advance {
        let parsed = match parse_datetime(zone, input) {
            Ok(parsed) => parsed,
            Err(_) => return Advance::Rejected(INVALID_DATE_REPLY),
        };
        match self.state {
            State::AwaitingStart => {
                self.start = Some(parsed);
                self.state = State::AwaitingStop;
                Advance::Prompt(PROMPT_STOP)
            }
            State::AwaitingStop => Advance::Complete(ResolvedTimeRange {
                start: self.start.expect("start is set before stop is awaited"),
                stop: parsed,
            }),
        }
    }
}

impl Default for PendingRange {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> DisplayZone {
        DisplayZone::from_config(Some("Asia/Shanghai")).unwrap()
    }

    #[test]
    fn test_happy_path() {
        let zone = zone();
        let mut pending = PendingRange::new(true);
        assert_eq!(pending.prompt(), PROMPT_START);
        assert!(pending.mine());

        assert_eq!(
            pending.advance(&zone, "2022-01-01"),
            Advance::Prompt(PROMPT_STOP)
        );
        match pending.advance(&zone, "2022-02-22") {
            Advance::Complete(range) => {
                assert_eq!(range.start.to_rfc3339(), "2022-01-01T00:00:00+08:00");
                assert_eq!(range.stop.to_rfc3339(), "2022-02-22T00:00:00+08:00");
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_rejection_keeps_state() {
        let zone = zone();
        let mut pending = PendingRange::new(false);

        assert_eq!(
            pending.advance(&zone, "昨天"),
            Advance::Rejected(INVALID_DATE_REPLY)
        );
        assert_eq!(pending.prompt(), PROMPT_START);

        // A good start still works after the rejection.
        assert_eq!(
            pending.advance(&zone, "2022-01-01"),
            Advance::Prompt(PROMPT_STOP)
        );
        assert_eq!(
            pending.advance(&zone, "nope"),
            Advance::Rejected(INVALID_DATE_REPLY)
        );
        assert!(matches!(
            pending.advance(&zone, "2022-01-02T12:00:00"),
            Advance::Complete(_)
        ));
    }
}
