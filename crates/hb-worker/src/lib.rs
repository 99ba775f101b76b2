//! Offline caching worker for a landing page: request classification, the
//! three caching strategies, cache generations and their lifecycle, plus the
//! push and background-sync hooks.

pub mod bound;
pub mod classify;
pub mod config;
pub mod fallback;
pub mod lifecycle;
pub mod message;
pub mod push;
pub mod registry;
pub mod strategy;
pub mod sync;
pub mod worker;

#[cfg(test)]
mod testing;

pub use bound::enforce_limit;
pub use classify::Classification;
pub use classify::Classifier;
pub use config::NotificationConfig;
pub use config::WorkerConfig;
pub use fallback::OfflineFallback;
pub use lifecycle::ActivationReport;
pub use lifecycle::InstallReport;
pub use lifecycle::LifecycleController;
pub use lifecycle::LifecycleState;
pub use message::ControlMessage;
pub use message::ControlReply;
pub use message::parse_control_message;
pub use push::Notification;
pub use push::NotificationAction;
pub use push::NotificationSink;
pub use push::PushPayload;
pub use registry::CacheRegistry;
pub use registry::GenerationHandle;
pub use strategy::Revalidation;
pub use strategy::RevalidationOutcome;
pub use strategy::Served;
pub use strategy::StrategyExecutor;
pub use sync::CONTACT_FORM_TAG;
pub use sync::FetchFormSubmitter;
pub use sync::FormSubmitter;
pub use sync::SyncReport;
pub use worker::FetchOutcome;
pub use worker::ServiceWorker;
pub use worker::ServiceWorkerBuilder;
