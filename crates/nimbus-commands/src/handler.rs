//! Dispatches parsed commands to the pipeline and scheduling service.
//!
//! Host adapters feed parsed [`Command`]s here and turn the returned
//! [`Reply`] back into platform messages. The handler never talks to a
//! platform itself.

use std::collections::HashSet;
use std::sync::Arc;

use nimbus_pipeline::{Generated, GenerationPipeline, NO_DATA_NOTICE};
use nimbus_schedule::SchedulingService;
use nimbus_timerange::{DisplayZone, ResolvedTimeRange, TimeOfDayLiteral, TimeRangeError, resolve};
use nimbus_types::{Artifact, DeliveryTarget, MessageScope};

use crate::pending::{PROMPT_START, PendingRange};
use crate::{Command, INVALID_DATE_REPLY, INVALID_TIME_REPLY, USAGE};

/// What the host adapter should do with a handled command.
#[derive(Debug)]
pub enum Reply {
    Text(String),
    Image(Artifact),
    /// A history query without dates: send the prompt and keep the pending
    /// state around for the user's next messages.
    AwaitDates(PendingRange, &'static str),
}

pub struct CommandHandler {
    zone: DisplayZone,
    pipeline: Arc<GenerationPipeline>,
    schedule: Arc<SchedulingService>,
    /// The bot's own author ids, excluded from every cloud.
    exclude_author_ids: HashSet<String>,
}

impl CommandHandler {
    pub fn new(
        zone: DisplayZone,
        pipeline: Arc<GenerationPipeline>,
        schedule: Arc<SchedulingService>,
        exclude_author_ids: HashSet<String>,
    ) -> Self {
        Self {
            zone,
            pipeline,
            schedule,
            exclude_author_ids,
        }
    }

    pub async fn handle(
        &self,
        target: &DeliveryTarget,
        author_id: &str,
        command: Command,
    ) -> anyhow::Result<Reply> {
        match command {
            Command::Help => Ok(Reply::Text(USAGE.to_string())),
            Command::Cloud {
                keyword,
                mine,
                literal,
            } => {
                let now = self.zone.now();
                match resolve(&self.zone, keyword, now, literal.as_deref()) {
                    Ok(range) => self.generate(target, author_id, mine, &range).await,
                    Err(TimeRangeError::MissingArgument) => {
                        Ok(Reply::AwaitDates(PendingRange::new(mine), PROMPT_START))
                    }
                    Err(TimeRangeError::InvalidLiteral(_)) => {
                        Ok(Reply::Text(INVALID_DATE_REPLY.to_string()))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Command::ScheduleStatus => {
                let reply = match self.schedule.get_schedule(target).await? {
                    Some(time) => format!(
                        "词云每日定时发送已开启，发送时间为：{}",
                        self.schedule.format_time(time)
                    ),
                    None => "词云每日定时发送未开启".to_string(),
                };
                Ok(Reply::Text(reply))
            }
            Command::ScheduleEnable { time } => {
                let parsed = match time {
                    Some(text) => match TimeOfDayLiteral::parse(&text) {
                        Ok(parsed) => Some(parsed),
                        Err(_) => return Ok(Reply::Text(INVALID_TIME_REPLY.to_string())),
                    },
                    None => None,
                };
                self.schedule.add_schedule(target, parsed).await?;
                let Some(effective) = self.schedule.get_schedule(target).await? else {
                    anyhow::bail!("schedule missing right after enabling it");
                };
                Ok(Reply::Text(format!(
                    "已开启词云每日定时发送，发送时间为：{}",
                    self.schedule.format_time(effective)
                )))
            }
            Command::ScheduleDisable => {
                self.schedule.remove_schedule(target).await?;
                Ok(Reply::Text("已关闭词云每日定时发送".to_string()))
            }
        }
    }

    /// Generate a cloud for an already-resolved range. Also the completion
    /// path for pending history queries.
    pub async fn generate(
        &self,
        target: &DeliveryTarget,
        author_id: &str,
        mine: bool,
        range: &ResolvedTimeRange,
    ) -> anyhow::Result<Reply> {
        let scope = if mine {
            MessageScope::personal(target, author_id)
        } else {
            MessageScope::group(target)
        };
        match self
            .pipeline
            .generate(&scope, range, &self.exclude_author_ids)
            .await?
        {
            Generated::Artifact(artifact) => Ok(Reply::Image(artifact)),
            Generated::Empty => Ok(Reply::Text(NO_DATA_NOTICE.to_string())),
        }
    }

    pub fn zone(&self) -> &DisplayZone {
        &self.zone
    }
}
