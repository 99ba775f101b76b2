//! Install, activate and skip-waiting.

use crate::registry::CacheRegistry;
use futures::future::try_join_all;
use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_net::Fetcher;
use hb_net::Request;
use hb_net::RequestUrl;
use hb_net::fetch_with_timeout;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::watch;
use tracing::error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Parsed,
    Installing,
    /// Installed and waiting for older instances to release their pages.
    Installed,
    Activating,
    /// Controlling pages; the only state that intercepts fetches.
    Activated,
    /// Install failed; this instance never serves.
    Redundant,
}

impl LifecycleState {
    pub fn can_intercept_fetch(self) -> bool {
        self == Self::Activated
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Manifest entries written to the static generation.
    pub cached: usize,
    /// Whether install moved straight on to activating.
    pub skipped_waiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    /// Stale generations removed, in creation order.
    pub deleted: Vec<String>,
}

/// Drives one worker version through its lifecycle.
pub struct LifecycleController {
    registry: CacheRegistry,
    fetcher: Arc<dyn Fetcher>,
    manifest: Vec<RequestUrl>,
    fetch_timeout: Option<Duration>,
    skip_waiting_requested: AtomicBool,
    state: watch::Sender<LifecycleState>,
}

impl LifecycleController {
    pub fn new(
        registry: CacheRegistry,
        fetcher: Arc<dyn Fetcher>,
        manifest: Vec<RequestUrl>,
        fetch_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            manifest,
            fetch_timeout,
            skip_waiting_requested: AtomicBool::new(false),
            state: watch::Sender::new(LifecycleState::Parsed),
        }
    }

    /// Requests skip-waiting as soon as install succeeds.
    pub fn with_skip_waiting_on_install(self, enabled: bool) -> Self {
        self.skip_waiting_requested.store(enabled, Ordering::SeqCst);
        self
    }

    /// Resumes an instance whose state was recorded before suspension.
    pub fn with_state(self, state: LifecycleState) -> Self {
        self.state.send_replace(state);
        self
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Pre-warms the static generation with every manifest entry.
    ///
    /// All entries are fetched before anything is written; one failed or
    /// non-2xx fetch aborts the install with nothing stored and leaves this
    /// instance redundant.
    pub async fn install(&self) -> WorkerResult<InstallReport> {
        self.transition(&[LifecycleState::Parsed], LifecycleState::Installing)?;
        info!(
            generation = self.registry.static_name(),
            entries = self.manifest.len(),
            "installing"
        );

        let cached = match self.populate_static().await {
            Ok(cached) => cached,
            Err(failure) => {
                self.state.send_replace(LifecycleState::Redundant);
                error!(%failure, "install failed");
                return Err(failure);
            }
        };

        self.state.send_replace(LifecycleState::Installed);
        info!(cached, "static resources cached");

        let skipped_waiting =
            self.skip_waiting_requested.load(Ordering::SeqCst) && self.skip_waiting();
        Ok(InstallReport {
            cached,
            skipped_waiting,
        })
    }

    async fn populate_static(&self) -> WorkerResult<usize> {
        let fetches = self.manifest.iter().map(|url| {
            let request = Request::get(url.clone());
            async move {
                let response =
                    fetch_with_timeout(self.fetcher.as_ref(), &request, self.fetch_timeout)
                        .await?;
                if !response.status.is_success() {
                    return Err(WorkerError::new(
                        "net.fetch.unsuccessful_status",
                        format!(
                            "`{}` answered {}",
                            request.url.as_str(),
                            response.status.as_u16()
                        ),
                    ));
                }
                Ok((request.key(), response))
            }
        });

        let entries = try_join_all(fetches).await.map_err(|error| {
            WorkerError::new(
                "worker.install.manifest_failed",
                format!("failed to fetch manifest: {error}"),
            )
        })?;

        let count = entries.len();
        let handle = self.registry.open_static().await?;
        self.registry
            .put_all(&handle, entries)
            .await
            .map_err(|error| {
                WorkerError::new(
                    "worker.install.manifest_failed",
                    format!("failed to store manifest: {error}"),
                )
            })?;
        Ok(count)
    }

    /// Moves an installed instance to activating without waiting for older
    /// instances. Before install finishes the request is remembered; returns
    /// whether the transition happened now.
    pub fn skip_waiting(&self) -> bool {
        self.skip_waiting_requested.store(true, Ordering::SeqCst);
        let moved = self
            .transition(&[LifecycleState::Installed], LifecycleState::Activating)
            .is_ok();
        if moved {
            info!("skipping waiting phase");
        }
        moved
    }

    /// Deletes every generation this version does not own, then takes
    /// control of pages. Safe to repeat.
    pub async fn activate(&self) -> WorkerResult<ActivationReport> {
        let previous = self.state();
        self.transition(
            &[
                LifecycleState::Installed,
                LifecycleState::Activating,
                LifecycleState::Activated,
            ],
            LifecycleState::Activating,
        )?;

        match self.delete_stale().await {
            Ok(deleted) => {
                self.state.send_replace(LifecycleState::Activated);
                info!(deleted = deleted.len(), "activated and claimed clients");
                Ok(ActivationReport { deleted })
            }
            Err(failure) => {
                self.state.send_replace(previous);
                error!(%failure, "activation failed");
                Err(failure)
            }
        }
    }

    async fn delete_stale(&self) -> WorkerResult<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.registry.generation_names().await? {
            if self.registry.is_current(&name) {
                continue;
            }
            if self.registry.delete(&name).await? {
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    fn transition(&self, from: &[LifecycleState], to: LifecycleState) -> WorkerResult<()> {
        let mut rejected = None;
        self.state.send_if_modified(|state| {
            if from.contains(state) {
                *state = to;
                true
            } else {
                rejected = Some(*state);
                false
            }
        });

        match rejected {
            None => Ok(()),
            Some(current) => Err(WorkerError::new(
                "worker.lifecycle.invalid_transition",
                format!("cannot move from {current} to {to}"),
            )),
        }
    }
}
