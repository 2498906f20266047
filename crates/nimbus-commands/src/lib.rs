//! nimbus-commands: the bot command surface.
//!
//! Extracts a time-range keyword, the "mine" modifier, and the schedule
//! sub-commands from incoming text. Host adapters own everything else
//! about their platforms; this crate only understands the word-cloud
//! commands themselves.

pub mod handler;
pub mod pending;

use nimbus_timerange::RangeKeyword;

pub use handler::{CommandHandler, Reply};
pub use pending::{Advance, PendingRange};

/// Reply for a malformed date in a history prompt.
pub const INVALID_DATE_REPLY: &str = "请输入正确的日期，不然我没法理解呢！";
/// Reply for a malformed time in a schedule command.
pub const INVALID_TIME_REPLY: &str = "请输入正确的时间，不然我没法理解呢！";

/// Help text shown for the bare command.
pub const USAGE: &str = "\
- 通过快捷命令，以获取常见时间段内的词云
格式：/<时间段>词云
时间段关键词有：今日，昨日，本周，上周，本月，上月，年度
示例：/今日词云

- 提供日期与时间，以获取指定时间段内的词云
格式：/历史词云 [日期或时间段]
示例：/历史词云 2022-01-01
/历史词云 2022-01-01~2022-02-22

- 在上方所给的命令格式基础上，还可以添加前缀“我的”，以获取自己的词云
示例：/我的今日词云

- 设置定时发送每日词云
格式：/词云每日定时发送状态
/开启词云每日定时发送 [23:59]
/关闭词云每日定时发送";

/// A parsed word-cloud command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Bare "词云": show usage.
    Help,
    /// Generate a cloud for a time range.
    Cloud {
        keyword: RangeKeyword,
        /// Narrow the scope to the requesting user.
        mine: bool,
        /// Raw literal after "历史词云", if any.
        literal: Option<String>,
    },
    /// Report whether daily delivery is on and at what time.
    ScheduleStatus,
    /// Turn on daily delivery, optionally at an explicit local time.
    ScheduleEnable { time: Option<String> },
    /// Turn off daily delivery.
    ScheduleDisable,
}

const RANGE_NAMES: &[(&str, RangeKeyword)] = &[
    ("今日", RangeKeyword::Today),
    ("昨日", RangeKeyword::Yesterday),
    ("本周", RangeKeyword::ThisWeek),
    ("上周", RangeKeyword::LastWeek),
    ("本月", RangeKeyword::ThisMonth),
    ("上月", RangeKeyword::LastMonth),
    ("年度", RangeKeyword::ThisYear),
    ("历史", RangeKeyword::History),
];

/// Parse one incoming message as a word-cloud command.
///
/// `command_starts` are the configured command prefixes; exactly one must
/// lead the message. Returns `None` for anything that is not a word-cloud
/// command.
pub fn parse_command(text: &str, command_starts: &[String]) -> Option<Command> {
    let text = text.trim();
    let body = command_starts
        .iter()
        .filter(|prefix| !prefix.is_empty())
        .find_map(|prefix| text.strip_prefix(prefix.as_str()))?;

    // Schedule sub-commands use fixed names.
    if body == "词云每日定时发送状态" {
        return Some(Command::ScheduleStatus);
    }
    if let Some(rest) = body.strip_prefix("开启词云每日定时发送") {
        let rest = rest.trim();
        return Some(Command::ScheduleEnable {
            time: (!rest.is_empty()).then(|| rest.to_string()),
        });
    }
    if body == "关闭词云每日定时发送" {
        return Some(Command::ScheduleDisable);
    }

    if body == "词云" {
        return Some(Command::Help);
    }

    let (mine, body) = match body.strip_prefix("我的") {
        Some(rest) => (true, rest),
        None => (false, body),
    };

    for (name, keyword) in RANGE_NAMES {
        if let Some(rest) = body.strip_prefix(name) {
            let rest = rest.strip_prefix("词云")?;
            let literal = rest.trim();
            return Some(Command::Cloud {
                keyword: *keyword,
                mine,
                literal: (!literal.is_empty()).then(|| literal.to_string()),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn starts() -> Vec<String> {
        vec!["/".to_string()]
    }

    #[test]
    fn test_plain_range_commands() {
        assert_eq!(
            parse_command("/今日词云", &starts()),
            Some(Command::Cloud {
                keyword: RangeKeyword::Today,
                mine: false,
                literal: None,
            })
        );
        assert_eq!(
            parse_command("/上月词云", &starts()),
            Some(Command::Cloud {
                keyword: RangeKeyword::LastMonth,
                mine: false,
                literal: None,
            })
        );
    }

    #[test]
    fn test_mine_modifier() {
        assert_eq!(
            parse_command("/我的年度词云", &starts()),
            Some(Command::Cloud {
                keyword: RangeKeyword::ThisYear,
                mine: true,
                literal: None,
            })
        );
    }

    #[test]
    fn test_history_with_literal() {
        assert_eq!(
            parse_command("/历史词云 2022-01-01~2022-02-22", &starts()),
            Some(Command::Cloud {
                keyword: RangeKeyword::History,
                mine: false,
                literal: Some("2022-01-01~2022-02-22".to_string()),
            })
        );
        assert_eq!(
            parse_command("/历史词云", &starts()),
            Some(Command::Cloud {
                keyword: RangeKeyword::History,
                mine: false,
                literal: None,
            })
        );
    }

    #[test]
    fn test_schedule_commands() {
        assert_eq!(
            parse_command("/词云每日定时发送状态", &starts()),
            Some(Command::ScheduleStatus)
        );
        assert_eq!(
            parse_command("/开启词云每日定时发送", &starts()),
            Some(Command::ScheduleEnable { time: None })
        );
        assert_eq!(
            parse_command("/开启词云每日定时发送 23:59", &starts()),
            Some(Command::ScheduleEnable {
                time: Some("23:59".to_string()),
            })
        );
        assert_eq!(
            parse_command("/关闭词云每日定时发送", &starts()),
            Some(Command::ScheduleDisable)
        );
    }

    #[test]
    fn test_help_and_non_commands() {
        assert_eq!(parse_command("/词云", &starts()), Some(Command::Help));
        assert_eq!(parse_command("词云", &starts()), None);
        assert_eq!(parse_command("/别的命令", &starts()), None);
        assert_eq!(parse_command("随便聊聊", &starts()), None);
    }

    #[test]
    fn test_alternate_command_start() {
        let starts = vec!["!".to_string(), "/".to_string()];
        assert_eq!(parse_command("!词云", &starts), Some(Command::Help));
        assert_eq!(parse_command("/词云", &starts), Some(Command::Help));
    }
}
