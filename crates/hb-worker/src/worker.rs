//! Event-level entry points of one worker version.

use crate::classify::Classifier;
use crate::config::WorkerConfig;
use crate::fallback::OfflineFallback;
use crate::lifecycle::ActivationReport;
use crate::lifecycle::InstallReport;
use crate::lifecycle::LifecycleController;
use crate::lifecycle::LifecycleState;
use crate::message::ControlMessage;
use crate::message::ControlReply;
use crate::message::parse_control_message;
use crate::message::send_reply;
use crate::push::Notification;
use crate::push::NotificationSink;
use crate::push::build_notification;
use crate::push::click_target;
use crate::push::parse_push;
use crate::registry::CacheRegistry;
use crate::strategy::Revalidation;
use crate::strategy::StrategyExecutor;
use crate::sync::CONTACT_FORM_TAG;
use crate::sync::FormSubmitter;
use crate::sync::SyncReport;
use crate::sync::replay_pending_forms;
use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_net::Fetcher;
use hb_net::Request;
use hb_net::RequestKey;
use hb_net::RequestUrl;
use hb_net::Response;
use hb_storage::CacheStore;
use hb_storage::PendingStore;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// What the page receives for an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the request goes to the network untouched.
    Passthrough,
    Respond {
        response: Response,
        revalidation: Option<Revalidation>,
    },
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Passthrough => None,
            Self::Respond { response, .. } => Some(response),
        }
    }
}

pub struct ServiceWorkerBuilder {
    config: WorkerConfig,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    state: LifecycleState,
    notifications: Option<Arc<dyn NotificationSink>>,
    background_sync: Option<(Arc<dyn PendingStore>, Arc<dyn FormSubmitter>)>,
}

impl ServiceWorkerBuilder {
    /// State recorded for this version before the worker was suspended.
    pub fn resume_from(mut self, state: LifecycleState) -> Self {
        self.state = state;
        self
    }

    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = Some(sink);
        self
    }

    pub fn with_background_sync(
        mut self,
        pending: Arc<dyn PendingStore>,
        submitter: Arc<dyn FormSubmitter>,
    ) -> Self {
        self.background_sync = Some((pending, submitter));
        self
    }

    pub fn build(self) -> WorkerResult<ServiceWorker> {
        let config = self.config;
        config.validate()?;

        let origin = config.origin_url()?;
        let registry = CacheRegistry::new(
            self.store,
            config.static_cache_name(),
            config.dynamic_cache_name(),
        );
        let classifier = Classifier::new(&config)?;
        let executor = StrategyExecutor::new(
            registry.clone(),
            self.fetcher.clone(),
            config.fetch_timeout(),
            config.max_dynamic_entries,
        )
        .with_bounded_background_stores(config.bound_background_stores);
        let offline_document = RequestUrl::resolve(&origin, &config.offline_document)?;
        let fallback = OfflineFallback::new(
            registry.clone(),
            RequestKey::get(&offline_document),
            config.offline_message.clone(),
        );
        let lifecycle = LifecycleController::new(
            registry.clone(),
            self.fetcher,
            config.manifest_urls()?,
            config.fetch_timeout(),
        )
        .with_skip_waiting_on_install(config.skip_waiting_on_install)
        .with_state(self.state);

        Ok(ServiceWorker {
            config,
            origin,
            registry,
            classifier,
            executor,
            fallback,
            lifecycle,
            notifications: self.notifications,
            background_sync: self.background_sync,
        })
    }
}

/// One worker version: routes install, activate, fetch, message, push and
/// sync events to their handlers.
pub struct ServiceWorker {
    config: WorkerConfig,
    origin: RequestUrl,
    registry: CacheRegistry,
    classifier: Classifier,
    executor: StrategyExecutor,
    fallback: OfflineFallback,
    lifecycle: LifecycleController,
    notifications: Option<Arc<dyn NotificationSink>>,
    background_sync: Option<(Arc<dyn PendingStore>, Arc<dyn FormSubmitter>)>,
}

impl ServiceWorker {
    pub fn builder(
        config: WorkerConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> ServiceWorkerBuilder {
        ServiceWorkerBuilder {
            config,
            store,
            fetcher,
            state: LifecycleState::Parsed,
            notifications: None,
            background_sync: None,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub async fn install(&self) -> WorkerResult<InstallReport> {
        self.lifecycle.install().await
    }

    pub async fn activate(&self) -> WorkerResult<ActivationReport> {
        self.lifecycle.activate().await
    }

    pub fn skip_waiting(&self) -> bool {
        self.lifecycle.skip_waiting()
    }

    /// Always yields a response for intercepted requests: the classified
    /// strategy first, the offline fallback if that fails.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if !self.state().can_intercept_fetch() || !self.classifier.should_intercept(request) {
            return FetchOutcome::Passthrough;
        }

        let classification = self.classifier.classify(request);
        debug!(url = request.url.as_str(), ?classification, "intercepted fetch");

        match self.executor.execute(classification, request).await {
            Ok(served) => FetchOutcome::Respond {
                response: served.response,
                revalidation: served.revalidation,
            },
            Err(error) => {
                warn!(url = request.url.as_str(), %error, "fetch failed, using offline fallback");
                FetchOutcome::Respond {
                    response: self.fallback.resolve(request).await,
                    revalidation: None,
                }
            }
        }
    }

    pub async fn handle_message(&self, message: ControlMessage) -> WorkerResult<()> {
        debug!(kind = message.kind(), "control message");
        match message {
            ControlMessage::SkipWaiting => {
                self.lifecycle.skip_waiting();
            }
            ControlMessage::GetCacheSize { reply } => {
                let size = self.registry.total_entries().await?;
                send_reply(reply, ControlReply::CacheSize(size));
            }
            ControlMessage::ClearCache { reply } => {
                let removed = self.registry.clear_all().await?;
                info!(removed, "cleared all caches");
                send_reply(reply, ControlReply::CacheCleared);
            }
        }
        Ok(())
    }

    /// Decodes and handles a wire message. Malformed or unknown messages are
    /// logged and dropped.
    pub async fn handle_raw_message(
        &self,
        raw: &str,
        reply: Option<oneshot::Sender<ControlReply>>,
    ) -> WorkerResult<()> {
        match parse_control_message(raw, reply) {
            Ok(Some(message)) => self.handle_message(message).await,
            Ok(None) => Ok(()),
            Err(error) => {
                warn!(%error, "dropping control message");
                Ok(())
            }
        }
    }

    /// Shows the notification described by a push payload. Returns what was
    /// shown, or `None` for an empty push.
    pub async fn handle_push(&self, data: Option<&[u8]>) -> WorkerResult<Option<Notification>> {
        let Some(payload) = parse_push(data)? else {
            return Ok(None);
        };

        let notification = build_notification(payload, &self.config.notifications);
        self.notification_sink()?.show(&notification).await?;
        Ok(Some(notification))
    }

    pub async fn handle_notification_click(&self, data: &Value) -> WorkerResult<RequestUrl> {
        let target = click_target(data, &self.origin)?;
        self.notification_sink()?.open_window(&target).await?;
        Ok(target)
    }

    /// Replays queued contact forms for the `contact-form` tag; other tags and
    /// workers without a pending store are ignored.
    pub async fn handle_sync(&self, tag: &str) -> Option<SyncReport> {
        if tag != CONTACT_FORM_TAG {
            debug!(tag, "ignoring sync tag");
            return None;
        }

        let Some((pending, submitter)) = &self.background_sync else {
            warn!(tag, "background sync requested without a pending store");
            return None;
        };
        Some(replay_pending_forms(pending.as_ref(), submitter.as_ref()).await)
    }

    fn notification_sink(&self) -> WorkerResult<&dyn NotificationSink> {
        self.notifications.as_deref().ok_or_else(|| {
            WorkerError::new(
                "worker.push.sink_missing",
                "no notification sink is attached",
            )
        })
    }
}
