//! The scheduling service.
//!
//! Owns the trigger registry and keeps it consistent with the schedule
//! store across restarts and mutations. Timers push fired keys onto a
//! channel; [`SchedulingService::run`] consumes them serially, so registry
//! mutation never races between a timer callback and an explicit call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use nimbus_pipeline::{Generated, GenerationPipeline, NO_DATA_NOTICE};
use nimbus_timerange::{DisplayZone, RangeKeyword, TimeOfDayLiteral, resolve};
use nimbus_types::{DeliveryTarget, MessageScope, MessageTransport, OutboundPayload};

use crate::registry::{TimerHandle, TriggerKey, TriggerTimers};
use crate::store::{ScheduleStore, StoreError};

pub struct SchedulingService {
    store: Arc<ScheduleStore>,
    pipeline: Arc<GenerationPipeline>,
    transport: Arc<dyn MessageTransport>,
    zone: DisplayZone,
    /// The configured default daily time, normalized to UTC.
    default_time_utc: NaiveTime,
    /// Author ids excluded from scheduled clouds (the bot's own ids).
    exclude_author_ids: std::collections::HashSet<String>,
    timers: TriggerTimers,
    registry: Mutex<HashMap<TriggerKey, TimerHandle>>,
    fired_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TriggerKey>>,
}

impl SchedulingService {
    /// Construct the service and register the permanent default trigger.
    ///
    /// Must run inside a tokio runtime; timers are spawned immediately.
    /// Call [`SchedulingService::update`] afterwards to reconcile against
    /// the store, and spawn [`SchedulingService::run`] to dispatch fired
    /// triggers.
    pub fn new(
        store: Arc<ScheduleStore>,
        pipeline: Arc<GenerationPipeline>,
        transport: Arc<dyn MessageTransport>,
        zone: DisplayZone,
        default_time: TimeOfDayLiteral,
        exclude_author_ids: std::collections::HashSet<String>,
    ) -> Arc<Self> {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let timers = TriggerTimers::new(fired_tx);
        let default_time_utc = default_time.to_utc(&zone);

        let service = Arc::new(Self {
            store,
            pipeline,
            transport,
            zone,
            default_time_utc,
            exclude_author_ids,
            timers,
            registry: Mutex::new(HashMap::new()),
            fired_rx: tokio::sync::Mutex::new(fired_rx),
        });

        let default_handle = service
            .timers
            .register_daily(TriggerKey::Default, default_time_utc);
        service
            .registry
            .lock()
            .unwrap()
            .insert(TriggerKey::Default, default_handle);
        info!(
            default_time = %service.zone.format_local_time(default_time_utc),
            "Scheduling service constructed"
        );
        service
    }

    /// Reconcile the registry against the store: register a timer for every
    /// distinct trigger time that lacks one. Never removes entries —
    /// orphans are pruned lazily by [`SchedulingService::run_task`].
    pub async fn update(&self) -> Result<(), StoreError> {
        let times = self.store.distinct_trigger_times().await?;
        let mut registry = self.registry.lock().unwrap();
        for time in times {
            let key = TriggerKey::At(time);
            if !registry.contains_key(&key) {
                debug!(trigger = %key, "Registering trigger timer");
                registry.insert(key, self.timers.register_daily(key, time));
            }
        }
        Ok(())
    }

    /// Dispatcher loop: consume fired trigger keys serially.
    pub async fn run(self: Arc<Self>) {
        info!("Scheduling service started");
        let mut rx = self.fired_rx.lock().await;
        while let Some(key) = rx.recv().await {
            let arg = match key {
                TriggerKey::Default => None,
                other => Some(other),
            };
            if let Err(e) = self.run_task(arg).await {
                warn!(trigger = %key, "Scheduled word cloud run failed: {e}");
            }
        }
    }

    /// Handle one fired trigger (`None` for the default trigger).
    ///
    /// A non-default trigger with no remaining subscribers is orphaned:
    /// its timer is unregistered and the registry entry removed. Otherwise
    /// every bound target gets today's word cloud; a failed delivery is
    /// logged and does not abort the remaining targets.
    pub async fn run_task(&self, key: Option<TriggerKey>) -> Result<(), StoreError> {
        let trigger_time = match key {
            Some(TriggerKey::At(time)) => Some(time),
            _ => None,
        };

        let records = self.store.list_for_trigger(trigger_time).await?;

        if let Some(time) = trigger_time {
            if records.is_empty() {
                let removed = self.registry.lock().unwrap().remove(&TriggerKey::At(time));
                if let Some(handle) = removed {
                    handle.abort();
                    info!(trigger = %TriggerKey::At(time), "Pruned orphaned trigger");
                }
                return Ok(());
            }
        }

        for record in records {
            if let Err(e) = self.deliver_today(&record.target_id).await {
                warn!(target_id = %record.target_id, "Daily word cloud delivery failed: {e}");
            }
        }
        Ok(())
    }

    async fn deliver_today(&self, target_id: &str) -> anyhow::Result<()> {
        let target = DeliveryTarget::from_target_id(target_id)?;
        let range = resolve(&self.zone, RangeKeyword::Today, self.zone.now(), None)?;
        let scope = MessageScope::group(&target);

        let payload = match self
            .pipeline
            .generate(&scope, &range, &self.exclude_author_ids)
            .await?
        {
            Generated::Artifact(artifact) => OutboundPayload::Image(artifact),
            Generated::Empty => OutboundPayload::Text(NO_DATA_NOTICE.to_string()),
        };
        self.transport.send(&target, payload).await
    }

    /// The target's effective daily time in UTC: its override, the default
    /// time for a null-time record, or `None` when scheduling is off.
    pub async fn get_schedule(
        &self,
        target: &DeliveryTarget,
    ) -> Result<Option<NaiveTime>, StoreError> {
        Ok(match self.store.get(&target.target_id()).await? {
            None => None,
            Some(Some(time)) => Some(time),
            Some(None) => Some(self.default_time_utc),
        })
    }

    /// Enable (or re-time) daily delivery for a target. `time` is local
    /// wall-clock; `None` keeps the target on the default schedule time.
    pub async fn add_schedule(
        &self,
        target: &DeliveryTarget,
        time: Option<TimeOfDayLiteral>,
    ) -> Result<(), StoreError> {
        let time_utc = time.map(|t| t.to_utc(&self.zone));
        self.store.upsert(&target.target_id(), time_utc).await?;
        // A newly-introduced distinct time needs a timer before its next tick.
        self.update().await
    }

    /// Disable daily delivery for a target. Registry pruning happens lazily
    /// the next time the abandoned trigger fires.
    pub async fn remove_schedule(&self, target: &DeliveryTarget) -> Result<bool, StoreError> {
        self.store.remove(&target.target_id()).await
    }

    /// Render a UTC time of day in the display timezone, for status replies.
    pub fn format_time(&self, time_utc: NaiveTime) -> String {
        self.zone.format_local_time(time_utc)
    }

    /// Current registry keys, canonically formatted. Test/introspection aid.
    pub fn trigger_keys(&self) -> Vec<String> {
        let registry = self.registry.lock().unwrap();
        let mut keys: Vec<String> = registry.keys().map(|k| k.to_string()).collect();
        keys.sort();
        keys
    }

    /// Abort every live timer, including the default one. Terminal.
    pub fn shutdown(&self) {
        let mut registry = self.registry.lock().unwrap();
        for (_, handle) in registry.drain() {
            handle.abort();
        }
        info!("Scheduling service shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nimbus_archive::{ArchivedMessage, MessageArchive};
    use nimbus_config::NimbusConfig;
    use nimbus_pipeline::{
        CloudRenderer, MessageProcessor, RenderError, RenderOptions, StageOutcome,
    };
    use std::collections::{HashMap, HashSet};

    struct StubRenderer;

    impl CloudRenderer for StubRenderer {
        fn render(
            &self,
            frequencies: &HashMap<String, f64>,
            _options: &RenderOptions,
        ) -> Result<Vec<u8>, RenderError> {
            if frequencies.is_empty() {
                return Err(RenderError::EmptyFrequencies);
            }
            Ok(b"png".to_vec())
        }
    }

    struct SplitStage;

    impl MessageProcessor for SplitStage {
        fn process(&self, messages: Vec<String>) -> StageOutcome {
            StageOutcome::Intermediate(
                messages
                    .iter()
                    .flat_map(|m| m.split_whitespace())
                    .map(str::to_string)
                    .collect(),
            )
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: tokio::sync::Mutex<Vec<(String, OutboundPayload)>>,
        fail_for: Option<String>,
    }

    #[async_trait::async_trait]
    impl MessageTransport for RecordingTransport {
        async fn send(
            &self,
            target: &DeliveryTarget,
            payload: OutboundPayload,
        ) -> anyhow::Result<()> {
            let id = target.target_id();
            if self.fail_for.as_deref() == Some(id.as_str()) {
                anyhow::bail!("transport down for {id}");
            }
            self.sent.lock().await.push((id, payload));
            Ok(())
        }
    }

    struct Fixture {
        service: Arc<SchedulingService>,
        archive: Arc<MessageArchive>,
        transport: Arc<RecordingTransport>,
    }

    fn group(n: u32) -> DeliveryTarget {
        DeliveryTarget::Group {
            platform: "qq".into(),
            group_id: n.to_string(),
        }
    }

    fn local(text: &str) -> TimeOfDayLiteral {
        TimeOfDayLiteral::parse(text).unwrap()
    }

    async fn fixture_with(fail_for: Option<String>) -> Fixture {
        let archive = Arc::new(MessageArchive::open_in_memory().unwrap());
        let pipeline = Arc::new(
            GenerationPipeline::new(
                archive.clone(),
                Arc::new(StubRenderer),
                vec![Box::new(SplitStage)],
                NimbusConfig::default(),
                std::env::temp_dir().join("nimbus-no-masks"),
            )
            .unwrap(),
        );
        let store = Arc::new(ScheduleStore::open_in_memory().unwrap());
        let transport = Arc::new(RecordingTransport {
            sent: tokio::sync::Mutex::new(Vec::new()),
            fail_for,
        });
        let zone = DisplayZone::from_config(Some("Asia/Shanghai")).unwrap();
        let service = SchedulingService::new(
            store,
            pipeline,
            transport.clone(),
            zone,
            local("22:00:00"),
            HashSet::new(),
        );
        Fixture {
            service,
            archive,
            transport,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(None).await
    }

    fn utc_time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_default_trigger_is_permanent() {
        let f = fixture().await;
        assert_eq!(f.service.trigger_keys(), vec!["default".to_string()]);

        // The default trigger survives a fire with zero subscribers.
        f.service.run_task(None).await.unwrap();
        assert_eq!(f.service.trigger_keys(), vec!["default".to_string()]);
    }

    #[tokio::test]
    async fn test_schedule_round_trip() {
        let f = fixture().await;
        let target = group(1);

        // Off entirely.
        assert_eq!(f.service.get_schedule(&target).await.unwrap(), None);

        // Enabled on the default time: 22:00 Shanghai is 14:00 UTC.
        f.service.add_schedule(&target, None).await.unwrap();
        let reported = f.service.get_schedule(&target).await.unwrap().unwrap();
        assert_eq!(reported, utc_time(14, 0));
        assert_eq!(f.service.format_time(reported), "22:00:00+08:00");

        // Re-enabled with an explicit 10:00 local (02:00 UTC); upsert, not duplicate.
        f.service
            .add_schedule(&target, Some(local("10:00")))
            .await
            .unwrap();
        let reported = f.service.get_schedule(&target).await.unwrap().unwrap();
        assert_eq!(reported, utc_time(2, 0));
        assert_eq!(f.service.format_time(reported), "10:00:00+08:00");

        // Disabled again.
        assert!(f.service.remove_schedule(&target).await.unwrap());
        assert_eq!(f.service.get_schedule(&target).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_schedule_registers_trigger() {
        let f = fixture().await;
        f.service
            .add_schedule(&group(1), Some(local("10:00")))
            .await
            .unwrap();
        assert_eq!(
            f.service.trigger_keys(),
            vec!["02:00:00".to_string(), "default".to_string()]
        );
    }

    #[tokio::test]
    async fn test_update_is_idempotent() {
        let f = fixture().await;
        f.service
            .add_schedule(&group(1), Some(local("10:00")))
            .await
            .unwrap();
        f.service
            .add_schedule(&group(2), Some(local("23:30")))
            .await
            .unwrap();

        let before = f.service.trigger_keys();
        f.service.update().await.unwrap();
        f.service.update().await.unwrap();
        assert_eq!(f.service.trigger_keys(), before);
        assert_eq!(before.len(), 3); // default + two distinct times
    }

    #[tokio::test]
    async fn test_orphan_pruning_is_lazy() {
        let f = fixture().await;
        let key = TriggerKey::At(utc_time(2, 0));
        f.service
            .add_schedule(&group(1), Some(local("10:00")))
            .await
            .unwrap();
        f.service
            .add_schedule(&group(2), Some(local("10:00")))
            .await
            .unwrap();
        assert!(f.service.trigger_keys().contains(&"02:00:00".to_string()));

        // One subscriber left: firing keeps the entry.
        f.service.remove_schedule(&group(1)).await.unwrap();
        f.service.run_task(Some(key)).await.unwrap();
        assert!(f.service.trigger_keys().contains(&"02:00:00".to_string()));

        // Removing the last subscriber does not prune immediately...
        f.service.remove_schedule(&group(2)).await.unwrap();
        assert!(f.service.trigger_keys().contains(&"02:00:00".to_string()));

        // ...but the next fire does.
        f.service.run_task(Some(key)).await.unwrap();
        assert_eq!(f.service.trigger_keys(), vec!["default".to_string()]);
    }

    #[tokio::test]
    async fn test_run_task_delivers_to_all_default_targets() {
        let f = fixture().await;
        for n in [1, 2] {
            f.service.add_schedule(&group(n), None).await.unwrap();
            f.archive
                .save_message(&ArchivedMessage {
                    target_id: group(n).target_id(),
                    author_id: "u1".into(),
                    time: Utc::now(),
                    body: "hello scheduled world".into(),
                })
                .await
                .unwrap();
        }

        f.service.run_task(None).await.unwrap();

        let sent = f.transport.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert!(sent
            .iter()
            .all(|(_, payload)| matches!(payload, OutboundPayload::Image(_))));
    }

    #[tokio::test]
    async fn test_empty_history_sends_no_data_notice() {
        let f = fixture().await;
        f.service.add_schedule(&group(1), None).await.unwrap();

        f.service.run_task(None).await.unwrap();

        let sent = f.transport.sent.lock().await;
        assert_eq!(
            sent.as_slice(),
            &[(
                group(1).target_id(),
                OutboundPayload::Text(NO_DATA_NOTICE.to_string())
            )]
        );
    }

    #[tokio::test]
    async fn test_delivery_failure_is_isolated() {
        let f = fixture_with(Some(group(1).target_id())).await;
        for n in [1, 2] {
            f.service.add_schedule(&group(n), None).await.unwrap();
            f.archive
                .save_message(&ArchivedMessage {
                    target_id: group(n).target_id(),
                    author_id: "u1".into(),
                    time: Utc::now(),
                    body: "still delivered".into(),
                })
                .await
                .unwrap();
        }

        // Group 1's transport failure must not block group 2.
        f.service.run_task(None).await.unwrap();

        let sent = f.transport.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, group(2).target_id());
    }

    #[tokio::test]
    async fn test_shutdown_clears_registry() {
        let f = fixture().await;
        f.service
            .add_schedule(&group(1), Some(local("10:00")))
            .await
            .unwrap();
        f.service.shutdown();
        assert!(f.service.trigger_keys().is_empty());
    }
}
