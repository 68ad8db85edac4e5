//! The bot runtime: gateway loop, index refresh and idle starters.

use banter_config::BotConfig;
use banter_core::channel::{Channel, IncomingMessage};
use banter_core::error::ChannelError;
use banter_core::history::HistorySource;
use banter_core::member::MemberSource;
use banter_core::provider::Provider;
use banter_knowledge::{BuildOutcome, IndexConfig, KnowledgeIndex};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::activity::{ActivityTracker, StarterPolicy};
use crate::responder::Responder;

/// How often quiet channels are checked for a starter.
pub const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct BotRuntime {
    channel: Arc<dyn Channel>,
    history: Arc<dyn HistorySource>,
    responder: Arc<Responder>,
    activity: Arc<ActivityTracker>,
    starters: StarterPolicy,
    refresh: Option<Duration>,
}

impl BotRuntime {
    pub fn new(
        config: &BotConfig,
        channel: Arc<dyn Channel>,
        history: Arc<dyn HistorySource>,
        provider: Option<Arc<dyn Provider>>,
    ) -> Self {
        Self::assemble(config, channel, history, provider, None)
    }

    /// Like [`BotRuntime::new`], answering member insight requests from
    /// `members`.
    pub fn with_members(
        config: &BotConfig,
        channel: Arc<dyn Channel>,
        history: Arc<dyn HistorySource>,
        provider: Option<Arc<dyn Provider>>,
        members: Arc<dyn MemberSource>,
    ) -> Self {
        Self::assemble(config, channel, history, provider, Some(members))
    }

    fn assemble(
        config: &BotConfig,
        channel: Arc<dyn Channel>,
        history: Arc<dyn HistorySource>,
        provider: Option<Arc<dyn Provider>>,
        members: Option<Arc<dyn MemberSource>>,
    ) -> Self {
        let index = Arc::new(KnowledgeIndex::new(IndexConfig::from_config(&config.knowledge)));
        let activity = Arc::new(ActivityTracker::new(Utc::now()));
        let mut responder = Responder::new(config, index, provider, activity.clone());
        if let Some(members) = members {
            responder = responder.with_members(members);
        }
        let responder = Arc::new(responder);

        let refresh = (config.knowledge.refresh_minutes > 0)
            .then(|| Duration::from_secs(config.knowledge.refresh_minutes * 60));

        Self {
            channel,
            history,
            responder,
            activity,
            starters: StarterPolicy::from_minutes(
                config.behaviour.idle_minutes,
                config.behaviour.starter_cooldown_minutes,
            ),
            refresh,
        }
    }

    pub fn responder(&self) -> &Arc<Responder> {
        &self.responder
    }

    /// Rebuild the knowledge index from the history source.
    pub async fn refresh_index(&self) -> BuildOutcome {
        self.responder.index().rebuild(self.history.as_ref()).await
    }

    /// Answer one live message. Returns whether a reply was posted.
    pub async fn handle_message(&self, message: IncomingMessage) -> Result<bool, ChannelError> {
        let Some(reply) = self.responder.handle(&message).await else {
            return Ok(false);
        };
        self.channel
            .send(&message.channel_id, &reply, Some(&message.message_id))
            .await?;
        Ok(true)
    }

    /// Post a starter in every allowed channel that has gone quiet.
    /// Returns the number of starters posted.
    pub async fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        let channels = match self.history.list_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(error = %e, "Idle sweep could not list channels");
                return 0;
            }
        };

        let mut posted = 0;
        for channel in channels
            .iter()
            .filter(|c| c.is_text && self.responder.channel_allowed(&c.name))
        {
            if !self.activity.claim_starter(&channel.id, now, &self.starters) {
                continue;
            }
            let starter = self.responder.starter().await;
            match self.channel.send(&channel.id, &starter, None).await {
                Ok(()) => {
                    info!(channel = %channel, "Posted idle starter");
                    posted += 1;
                }
                Err(e) => warn!(channel = %channel, error = %e, "Idle starter failed"),
            }
        }
        posted
    }

    fn spawn_timers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut timers = Vec::new();

        let rt = self.clone();
        timers.push(tokio::spawn(async move {
            let outcome = rt.refresh_index().await;
            debug!(outcome = ?outcome, "Initial index build finished");

            let Some(period) = rt.refresh else {
                return;
            };
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let outcome = rt.refresh_index().await;
                debug!(outcome = ?outcome, "Scheduled index refresh finished");
            }
        }));

        let rt = self.clone();
        timers.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(IDLE_SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                rt.sweep_idle(Utc::now()).await;
            }
        }));

        timers
    }

    /// Run until the channel's message stream ends.
    pub async fn run(self: Arc<Self>) -> Result<(), ChannelError> {
        let mut rx = self.channel.start().await?;
        info!(
            channel = %self.channel.name(),
            refresh_minutes = self.refresh.map(|d| d.as_secs() / 60).unwrap_or(0),
            "Bot runtime started"
        );

        let timers = self.spawn_timers();
        let mut in_flight = JoinSet::new();

        while let Some(event) = rx.recv().await {
            match event {
                Ok(message) => {
                    let rt = self.clone();
                    in_flight.spawn(async move {
                        if let Err(e) = rt.handle_message(message).await {
                            warn!(error = %e, "Failed to deliver reply");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "Channel error"),
            }
            while in_flight.try_join_next().is_some() {}
        }

        info!("Message stream closed, stopping runtime");
        while in_flight.join_next().await.is_some() {}
        for timer in timers {
            timer.abort();
        }
        self.channel.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::tests::{ScriptedProvider, message};
    use async_trait::async_trait;
    use banter_core::history::{HistoryChannel, HistoryMessage};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct MockChannel {
        queued: Mutex<Vec<IncomingMessage>>,
        sent: Mutex<Vec<(String, String, Option<String>)>>,
    }

    impl MockChannel {
        fn sent(&self) -> Vec<(String, String, Option<String>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Channel for MockChannel {
        fn name(&self) -> &str {
            "mock"
        }

        async fn start(
            &self,
        ) -> Result<mpsc::Receiver<Result<IncomingMessage, ChannelError>>, ChannelError> {
            let (tx, rx) = mpsc::channel(64);
            for msg in self.queued.lock().unwrap().drain(..) {
                tx.try_send(Ok(msg)).unwrap();
            }
            tx.try_send(Err(ChannelError::ConnectionLost("blip".into()))).unwrap();
            Ok(rx)
        }

        async fn send(&self, channel_id: &str, content: &str, reply_to: Option<&str>) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push((
                channel_id.to_string(),
                content.to_string(),
                reply_to.map(String::from),
            ));
            Ok(())
        }
    }

    struct MockHistory {
        channels: Vec<HistoryChannel>,
    }

    #[async_trait]
    impl HistorySource for MockHistory {
        async fn list_channels(&self) -> Result<Vec<HistoryChannel>, ChannelError> {
            Ok(self.channels.clone())
        }

        async fn can_read(&self, _channel: &HistoryChannel) -> bool {
            true
        }

        async fn fetch_batch(
            &self,
            _channel: &HistoryChannel,
            _before: Option<&str>,
            _limit: u8,
        ) -> Result<Vec<HistoryMessage>, ChannelError> {
            Ok(vec![HistoryMessage {
                id: "h1".into(),
                author: "mod".into(),
                author_is_bot: false,
                content: "Mint opens Friday".into(),
                timestamp: Utc::now(),
            }])
        }
    }

    fn config() -> BotConfig {
        let mut config = BotConfig::default();
        config.behaviour.reply_chance = 1.0;
        config.behaviour.reply_chance_question = 1.0;
        config.discord.channel_allowlist = vec!["general".into()];
        config
    }

    fn runtime(config: &BotConfig, channel: Arc<MockChannel>, reply: &str) -> Arc<BotRuntime> {
        let history = Arc::new(MockHistory {
            channels: vec![
                HistoryChannel::text("general-id", "general"),
                HistoryChannel::text("random-id", "random"),
                HistoryChannel::text("faq-id", "faq"),
            ],
        });
        let provider: Arc<dyn Provider> = Arc::new(ScriptedProvider::text(reply));
        Arc::new(BotRuntime::new(config, channel, history, Some(provider)))
    }

    #[tokio::test]
    async fn reply_threads_to_source_message() {
        let channel = Arc::new(MockChannel::default());
        let rt = runtime(&config(), channel.clone(), "gm gm");

        assert!(rt.handle_message(message("general", "gm")).await.unwrap());
        assert_eq!(
            channel.sent(),
            vec![("general-id".to_string(), "gm gm".to_string(), Some("m100".to_string()))]
        );
    }

    #[tokio::test]
    async fn sweep_posts_only_in_quiet_allowed_channels() {
        let channel = Arc::new(MockChannel::default());
        let rt = runtime(&config(), channel.clone(), "unused");

        let later = Utc::now() + chrono::Duration::minutes(30);
        assert_eq!(rt.sweep_idle(later).await, 1);
        let sent = channel.sent();
        assert_eq!(sent[0].0, "general-id");
        assert!(sent[0].2.is_none());

        // Cooldown holds the next sweep.
        assert_eq!(rt.sweep_idle(later + chrono::Duration::minutes(1)).await, 0);
    }

    #[tokio::test]
    async fn sweep_skips_before_idle_window() {
        let channel = Arc::new(MockChannel::default());
        let rt = runtime(&config(), channel.clone(), "unused");
        assert_eq!(rt.sweep_idle(Utc::now()).await, 0);
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn refresh_builds_from_configured_channels() {
        let mut cfg = config();
        cfg.knowledge.channel_names = vec!["faq".into()];
        let rt = runtime(&cfg, Arc::new(MockChannel::default()), "unused");

        match rt.refresh_index().await {
            BuildOutcome::Built { snapshot, sources_scanned, .. } => {
                assert_eq!(sources_scanned, 1);
                assert_eq!(snapshot.len(), 1);
            }
            other => panic!("Expected Built, got: {other:?}"),
        }
        assert_eq!(rt.responder().index().current_snapshot().version, 1);
    }

    #[tokio::test]
    async fn insight_reply_threads_to_question() {
        use crate::insight::tests::{MemberDirectory, profile};

        let channel = Arc::new(MockChannel::default());
        let history = Arc::new(MockHistory { channels: vec![] });
        let provider: Arc<dyn Provider> = Arc::new(ScriptedProvider::text("unused"));
        let members = Arc::new(MemberDirectory::default().with(profile("u1")));
        let rt = BotRuntime::with_members(&config(), channel.clone(), history, Some(provider), members);

        assert!(rt.handle_message(message("general", "tell me about my profile")).await.unwrap());
        let sent = channel.sent();
        assert!(sent[0].1.contains("Top roles: Admin, OG, Holder"));
        assert_eq!(sent[0].2.as_deref(), Some("m100"));
    }

    #[tokio::test]
    async fn run_drains_stream_and_stops() {
        let channel = Arc::new(MockChannel::default());
        channel.queued.lock().unwrap().extend([
            message("general", "gm"),
            message("random", "ignored channel"),
        ]);
        let rt = runtime(&config(), channel.clone(), "hello there");

        rt.run().await.unwrap();

        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "hello there");
    }
}
