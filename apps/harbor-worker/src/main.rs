mod notify;
mod state;

use clap::Parser;
use clap::Subcommand;
use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_net::Fetcher;
use hb_net::HttpFetcher;
use hb_net::HttpFetcherConfig;
use hb_net::Request;
use hb_net::RequestMode;
use hb_net::Response;
use hb_net::fetch_with_timeout;
use hb_storage::FilePendingStore;
use hb_storage::PendingStore;
use hb_storage::PendingSubmission;
use hb_storage::StorageConfig;
use hb_storage::open_cache_store;
use hb_worker::CONTACT_FORM_TAG;
use hb_worker::ControlMessage;
use hb_worker::ControlReply;
use hb_worker::FetchFormSubmitter;
use hb_worker::FetchOutcome;
use hb_worker::RevalidationOutcome;
use hb_worker::ServiceWorker;
use hb_worker::WorkerConfig;
use notify::StdoutNotifications;
use serde_json::Value;
use state::LifecycleFile;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;
use tokio::sync::oneshot;
use tracing::info;
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "harbor-worker",
    version,
    about = "Offline caching worker for a landing page"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON worker config; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding cache generations and lifecycle state
    #[arg(long, global = true, default_value = ".harbor")]
    store: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Pre-cache every manifest entry
    Install,
    /// Delete stale generations and start serving
    Activate,
    /// Stop waiting for older versions
    SkipWaiting,
    /// Print lifecycle state and generations
    Status,
    /// Run one request through the worker
    Fetch {
        url: String,
        /// Treat the request as a top-level navigation
        #[arg(long)]
        navigate: bool,
    },
    /// Print the number of cached entries
    CacheSize,
    /// Delete every cache generation
    ClearCache,
    /// Show the notification for a push payload
    Push { payload: String },
    /// Open the window for a notification's data
    Click { data: String },
    /// Queue a contact form for the next background sync
    QueueForm {
        /// Submission id; derived from the clock when omitted
        #[arg(long)]
        id: Option<String>,
        /// Form fields as `name=value`, in document order
        #[arg(required = true)]
        fields: Vec<String>,
    },
    /// Fire a background sync event
    Sync {
        #[arg(default_value = CONTACT_FORM_TAG)]
        tag: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("harbor-worker: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> WorkerResult<()> {
    let config = match &cli.config {
        Some(path) => WorkerConfig::load(path)?,
        None => WorkerConfig::default(),
    };
    let store = open_cache_store(&StorageConfig {
        persistent_root: Some(cli.store.clone()),
        ephemeral_mode: false,
    })?;
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(HttpFetcherConfig::default()));
    let pending = Arc::new(FilePendingStore::new(
        &cli.store,
        &config.origin_url()?.origin(),
    ));
    let submitter = Arc::new(FetchFormSubmitter::new(
        fetcher.clone(),
        config.contact_endpoint_url()?,
        config.fetch_timeout(),
    ));
    let lifecycle = LifecycleFile::new(&cli.store);
    let resumed = lifecycle.load(&config.cache_name);

    let worker = ServiceWorker::builder(config, store, fetcher.clone())
        .resume_from(resumed)
        .with_notifications(Arc::new(StdoutNotifications))
        .with_background_sync(pending.clone(), submitter)
        .build()?;
    info!(state = %resumed, "worker resumed");

    let outcome = dispatch(&worker, fetcher.as_ref(), pending.as_ref(), cli.command).await;
    lifecycle.save(&worker.config().cache_name, worker.state())?;
    outcome
}

async fn dispatch(
    worker: &ServiceWorker,
    fetcher: &dyn Fetcher,
    pending: &dyn PendingStore,
    command: Command,
) -> WorkerResult<()> {
    match command {
        Command::Install => {
            let report = worker.install().await?;
            println!(
                "installed {} entries into {} (state: {})",
                report.cached,
                worker.registry().static_name(),
                worker.state()
            );
        }
        Command::Activate => {
            let report = worker.activate().await?;
            for name in &report.deleted {
                println!("deleted {name}");
            }
            println!("state: {}", worker.state());
        }
        Command::SkipWaiting => {
            if !worker.skip_waiting() {
                warn!(state = %worker.state(), "nothing is waiting");
            }
            println!("state: {}", worker.state());
        }
        Command::Status => {
            println!("state: {}", worker.state());
            for name in worker.registry().generation_names().await? {
                let marker = if worker.registry().is_current(&name) {
                    "current"
                } else {
                    "stale"
                };
                println!("{name} ({marker})");
            }
        }
        Command::Fetch { url, navigate } => {
            let mut request = Request::get_str(&url)?;
            if navigate {
                request = request.with_mode(RequestMode::Navigate);
            }
            fetch(worker, fetcher, &request).await?;
        }
        Command::CacheSize => {
            let (reply, answer) = oneshot::channel();
            worker
                .handle_message(ControlMessage::GetCacheSize { reply })
                .await?;
            print_reply(answer).await?;
        }
        Command::ClearCache => {
            let (reply, answer) = oneshot::channel();
            worker
                .handle_message(ControlMessage::ClearCache { reply })
                .await?;
            print_reply(answer).await?;
        }
        Command::Push { payload } => {
            if worker.handle_push(Some(payload.as_bytes())).await?.is_none() {
                println!("no notification");
            }
        }
        Command::Click { data } => {
            let data: Value = serde_json::from_str(&data).map_err(|error| {
                WorkerError::new(
                    "app.click.malformed",
                    format!("notification data is not JSON: {error}"),
                )
            })?;
            worker.handle_notification_click(&data).await?;
        }
        Command::QueueForm { id, fields } => {
            let submission = PendingSubmission {
                id: id.unwrap_or_else(clock_id),
                fields: parse_fields(&fields)?,
            };
            let id = submission.id.clone();
            pending.add(submission).await?;
            println!("queued {id}");
        }
        Command::Sync { tag } => match worker.handle_sync(&tag).await {
            Some(report) => println!(
                "submitted {}, failed {}",
                report.submitted, report.failed
            ),
            None => println!("nothing to sync for `{tag}`"),
        },
    }
    Ok(())
}

fn clock_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("form-{millis}")
}

fn parse_fields(raw: &[String]) -> WorkerResult<Vec<(String, String)>> {
    raw.iter()
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) if !name.is_empty() => Ok((name.to_owned(), value.to_owned())),
            _ => Err(WorkerError::new(
                "app.form.field_invalid",
                format!("expected `name=value`, got `{pair}`"),
            )),
        })
        .collect()
}

async fn fetch(
    worker: &ServiceWorker,
    fetcher: &dyn Fetcher,
    request: &Request,
) -> WorkerResult<()> {
    match worker.handle_fetch(request).await {
        FetchOutcome::Passthrough => {
            info!(url = request.url.as_str(), state = %worker.state(), "not intercepted");
            let timeout = worker.config().fetch_timeout();
            let response = fetch_with_timeout(fetcher, request, timeout).await?;
            print_response(&response);
        }
        FetchOutcome::Respond {
            response,
            revalidation,
        } => {
            print_response(&response);
            if let Some(revalidation) = revalidation {
                match revalidation.finished().await {
                    RevalidationOutcome::Stored => info!("revalidated copy stored"),
                    RevalidationOutcome::Skipped { status } => {
                        info!(status, "revalidated copy not stored");
                    }
                    RevalidationOutcome::NetworkFailed(error)
                    | RevalidationOutcome::StoreFailed(error)
                    | RevalidationOutcome::Aborted(error) => {
                        warn!(%error, "revalidation failed");
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_response(response: &Response) {
    println!("{} {}", response.status.as_u16(), response.status_text);
    for header in &response.headers {
        println!("{}: {}", header.name, header.value);
    }
    println!();
    println!("{}", String::from_utf8_lossy(&response.body));
}

async fn print_reply(answer: oneshot::Receiver<ControlReply>) -> WorkerResult<()> {
    let reply = answer.await.map_err(|error| {
        WorkerError::new(
            "app.message.no_reply",
            format!("worker did not reply: {error}"),
        )
    })?;
    println!("{}", reply.to_json()?);
    Ok(())
}
