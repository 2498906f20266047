//! nimbus-pipeline: word-cloud generation.
//!
//! Fetches messages for a resolved time range, runs them through the
//! processing chain, and hands the resulting frequency mapping to the
//! external renderer. Used by both interactive commands and the scheduling
//! service.

pub mod processor;
pub mod render;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use nimbus_config::NimbusConfig;
use nimbus_timerange::ResolvedTimeRange;
use nimbus_types::{Artifact, MessageScope};

pub use processor::{FrequencyCounter, MessageProcessor, StageOutcome, run_chain};
pub use render::{CloudRenderer, RenderError, RenderOptions, render_detached};

/// User-facing reply when generation comes back [`Generated::Empty`].
pub const NO_DATA_NOTICE: &str = "没有足够的数据生成词云";

/// Ordered plain-text message bodies for a scope over a half-open UTC
/// interval `[start, stop)`, excluding the given author ids.
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    async fn fetch_plain_text(
        &self,
        scope: &MessageScope,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        exclude_authors: &HashSet<String>,
    ) -> anyhow::Result<Vec<String>>;
}

/// Outcome of one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated {
    Artifact(Artifact),
    /// No messages matched, or the renderer had nothing to draw. Callers
    /// reply with a "not enough data" notice rather than an error.
    Empty,
}

/// The generation pipeline shared by commands and the scheduler.
pub struct GenerationPipeline {
    store: Arc<dyn MessageStore>,
    renderer: Arc<dyn CloudRenderer>,
    stages: Vec<Box<dyn MessageProcessor>>,
    counter: FrequencyCounter,
    config: NimbusConfig,
    data_dir: PathBuf,
}

impl GenerationPipeline {
    pub fn new(
        store: Arc<dyn MessageStore>,
        renderer: Arc<dyn CloudRenderer>,
        stages: Vec<Box<dyn MessageProcessor>>,
        config: NimbusConfig,
        data_dir: PathBuf,
    ) -> anyhow::Result<Self> {
        let counter = match &config.stopwords_path {
            Some(path) => FrequencyCounter::from_file(path)?,
            None => FrequencyCounter::default(),
        };
        Ok(Self {
            store,
            renderer,
            stages,
            counter,
            config,
            data_dir,
        })
    }

    /// Generate a word cloud for `scope` over `range`.
    ///
    /// `extra_exclusions` is merged with the globally excluded author ids;
    /// callers pass the bot's own ids here so its posts never count.
    pub async fn generate(
        &self,
        scope: &MessageScope,
        range: &ResolvedTimeRange,
        extra_exclusions: &HashSet<String>,
    ) -> anyhow::Result<Generated> {
        let mut exclude = self.config.exclude_author_ids.clone();
        exclude.extend(extra_exclusions.iter().cloned());

        let messages = self
            .store
            .fetch_plain_text(scope, range.start_utc(), range.stop_utc(), &exclude)
            .await?;

        // Drop command text so a command never pollutes its own cloud.
        let messages: Vec<String> = messages
            .into_iter()
            .filter(|m| !self.is_command(m))
            .collect();
        if messages.is_empty() {
            return Ok(Generated::Empty);
        }

        let frequencies = run_chain(&self.stages, &self.counter, messages);
        if frequencies.is_empty() {
            return Ok(Generated::Empty);
        }

        let mask = self.load_mask(&scope.target_id);
        let options = RenderOptions::from_config(&self.config, mask);
        match render_detached(self.renderer.clone(), frequencies, options).await {
            Ok(bytes) => Ok(Generated::Artifact(Artifact::png(bytes))),
            // Rendering failure is indistinguishable from "no data" to users.
            Err(e) => {
                warn!(target_id = %scope.target_id, "Word cloud render failed: {e}");
                Ok(Generated::Empty)
            }
        }
    }

    fn is_command(&self, message: &str) -> bool {
        self.config
            .command_starts
            .iter()
            .filter(|prefix| !prefix.is_empty())
            .any(|prefix| message.starts_with(prefix.as_str()))
    }

    /// Mask bytes for a target, falling back to the shared default mask.
    fn load_mask(&self, target_id: &str) -> Option<Vec<u8>> {
        let target_mask = self.config.mask_path(&self.data_dir, Some(target_id));
        if let Ok(bytes) = std::fs::read(&target_mask) {
            return Some(bytes);
        }
        std::fs::read(self.config.mask_path(&self.data_dir, None)).ok()
    }
}
