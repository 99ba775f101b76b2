//! Background sync replay of queued contact-form submissions.

use async_trait::async_trait;
use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_net::Fetcher;
use hb_net::Method;
use hb_net::Request;
use hb_net::RequestUrl;
use hb_net::fetch_with_timeout;
use hb_storage::PendingStore;
use hb_storage::PendingSubmission;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use url::form_urlencoded;

pub const CONTACT_FORM_TAG: &str = "contact-form";

/// Delivers one queued submission upstream.
#[async_trait]
pub trait FormSubmitter: Send + Sync {
    async fn submit(&self, submission: &PendingSubmission) -> WorkerResult<()>;
}

/// Posts each submission to the contact endpoint as an urlencoded form.
pub struct FetchFormSubmitter {
    fetcher: Arc<dyn Fetcher>,
    endpoint: RequestUrl,
    timeout: Option<Duration>,
}

impl FetchFormSubmitter {
    pub fn new(fetcher: Arc<dyn Fetcher>, endpoint: RequestUrl, timeout: Option<Duration>) -> Self {
        Self {
            fetcher,
            endpoint,
            timeout,
        }
    }
}

#[async_trait]
impl FormSubmitter for FetchFormSubmitter {
    async fn submit(&self, submission: &PendingSubmission) -> WorkerResult<()> {
        // The serializer is not `Send`; it must be gone before the await.
        let body = {
            let mut form = form_urlencoded::Serializer::new(String::new());
            for (name, value) in &submission.fields {
                form.append_pair(name, value);
            }
            form.finish()
        };

        let request = Request::new(Method::Post, self.endpoint.clone())
            .with_header("Content-Type", "application/x-www-form-urlencoded")?
            .with_body(body);
        let response = fetch_with_timeout(self.fetcher.as_ref(), &request, self.timeout).await?;
        if !response.status.is_success() {
            return Err(WorkerError::new(
                "worker.sync.rejected",
                format!(
                    "`{}` answered {} for submission `{}`",
                    self.endpoint.as_str(),
                    response.status.as_u16(),
                    submission.id
                ),
            ));
        }

        debug!(id = %submission.id, "submitted queued form");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub submitted: usize,
    pub failed: usize,
}

/// Submits every pending form; delivered ones leave the queue, failed ones
/// stay for the next sync.
pub async fn replay_pending_forms(
    store: &dyn PendingStore,
    submitter: &dyn FormSubmitter,
) -> SyncReport {
    let pending = match store.list().await {
        Ok(pending) => pending,
        Err(failure) => {
            error!(%failure, "failed to list pending forms");
            return SyncReport::default();
        }
    };

    let mut report = SyncReport::default();
    for submission in &pending {
        let delivered = match submitter.submit(submission).await {
            Ok(()) => store.remove(&submission.id).await.map(|_| ()),
            Err(failure) => Err(failure),
        };
        match delivered {
            Ok(()) => report.submitted += 1,
            Err(failure) => {
                warn!(id = %submission.id, %failure, "failed to sync form");
                report.failed += 1;
            }
        }
    }

    info!(
        submitted = report.submitted,
        failed = report.failed,
        "contact form sync finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::FetchFormSubmitter;
    use super::FormSubmitter;
    use super::SyncReport;
    use super::replay_pending_forms;
    use crate::testing::ScriptedFetcher;
    use crate::testing::url;
    use async_trait::async_trait;
    use hb_core::WorkerError;
    use hb_core::WorkerResult;
    use hb_net::Method;
    use hb_net::Response;
    use hb_storage::MemoryPendingStore;
    use hb_storage::PendingStore;
    use hb_storage::PendingSubmission;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSubmitter {
        reject: Vec<String>,
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FormSubmitter for RecordingSubmitter {
        async fn submit(&self, submission: &PendingSubmission) -> WorkerResult<()> {
            if self.reject.contains(&submission.id) {
                return Err(WorkerError::new("net.fetch.failed", "still offline"));
            }
            self.delivered.lock().await.push(submission.id.clone());
            Ok(())
        }
    }

    fn submission(id: &str) -> PendingSubmission {
        PendingSubmission {
            id: id.to_owned(),
            fields: vec![
                ("nome".to_owned(), "Ana".to_owned()),
                ("mensagem".to_owned(), "Olá".to_owned()),
            ],
        }
    }

    #[tokio::test]
    async fn delivered_forms_leave_the_queue() {
        let store = MemoryPendingStore::default();
        for id in ["a", "b", "c"] {
            assert!(store.add(submission(id)).await.is_ok());
        }
        let submitter = RecordingSubmitter {
            reject: vec!["b".to_owned()],
            ..RecordingSubmitter::default()
        };

        let report = replay_pending_forms(&store, &submitter).await;

        assert_eq!(
            report,
            SyncReport {
                submitted: 2,
                failed: 1
            }
        );
        assert_eq!(*submitter.delivered.lock().await, vec!["a", "c"]);
        let left = match store.list().await {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(left, vec![submission("b")]);
    }

    #[tokio::test]
    async fn fetch_submitter_posts_urlencoded_fields() {
        let fetcher = Arc::new(
            ScriptedFetcher::new().route("https://landing.test/api/contact", Response::ok("")),
        );
        let submitter = FetchFormSubmitter::new(
            fetcher.clone(),
            url("https://landing.test/api/contact"),
            None,
        );

        assert!(submitter.submit(&submission("a")).await.is_ok());

        let sent = match fetcher.last_request().await {
            Some(value) => value,
            None => panic!("nothing was sent"),
        };
        assert_eq!(sent.method, Method::Post);
        assert_eq!(
            sent.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(sent.body, b"nome=Ana&mensagem=Ol%C3%A1".to_vec());
    }

    #[tokio::test]
    async fn rejected_submission_stays_queued() {
        let store = MemoryPendingStore::default();
        assert!(store.add(submission("a")).await.is_ok());
        let submitter = FetchFormSubmitter::new(
            Arc::new(ScriptedFetcher::new()),
            url("https://landing.test/api/contact"),
            None,
        );

        let report = replay_pending_forms(&store, &submitter).await;

        assert_eq!(
            report,
            SyncReport {
                submitted: 0,
                failed: 1
            }
        );
        assert_eq!(store.list().await, Ok(vec![submission("a")]));
    }

    #[tokio::test]
    async fn empty_queue_is_a_no_op() {
        let store = MemoryPendingStore::default();
        let report = replay_pending_forms(&store, &RecordingSubmitter::default()).await;
        assert_eq!(report, SyncReport::default());
    }
}
