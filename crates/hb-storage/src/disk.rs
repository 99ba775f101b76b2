//! File-backed cache store.
//!
//! Layout under the root directory:
//! - `index`: one hex-encoded generation name per line, in creation order.
//! - `generations/<hex name>.cache`: gzip snapshot of one generation.
//!
//! The full set is loaded on start; every mutation rewrites the affected
//! generation file before it becomes visible to readers.

use crate::CacheStore;
use crate::codec::decode_generation;
use crate::codec::decode_hex_string;
use crate::codec::encode_generation;
use crate::codec::encode_hex;
use crate::generation::Generation;
use crate::generation::GenerationSet;
use async_trait::async_trait;
use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_net::RequestKey;
use hb_net::Response;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::warn;

const INDEX_FILE: &str = "index";
const GENERATIONS_DIR: &str = "generations";

#[derive(Debug)]
pub struct DiskCacheStore {
    root: PathBuf,
    state: Mutex<GenerationSet>,
}

impl DiskCacheStore {
    /// Loads every generation listed in the index. A missing root is an empty store.
    pub fn load(root: PathBuf) -> WorkerResult<Self> {
        let mut state = GenerationSet::default();
        for name in read_index(&root)? {
            let path = generation_path(&root, &name);
            if !path.exists() {
                warn!(generation = %name, "indexed generation file is missing, starting it empty");
                state.open(&name);
                continue;
            }

            let bytes = fs::read(&path).map_err(|error| {
                WorkerError::new(
                    "storage.generation_read_failed",
                    format!(
                        "failed to read generation file `{}`: {error}",
                        path.display()
                    ),
                )
            })?;
            let (stored_name, generation) = decode_generation(&bytes)?;
            if stored_name != name {
                return Err(WorkerError::new(
                    "storage.generation_name_mismatch",
                    format!("generation file for `{name}` contains `{stored_name}`"),
                ));
            }
            *state.open(&name) = generation;
        }

        debug!(
            root = %root.display(),
            generations = state.names().len(),
            "disk cache store loaded"
        );
        Ok(Self {
            root,
            state: Mutex::new(state),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Applies `change` to a copy of the generation, persists it, then commits.
    /// With `create` unset, a missing generation is left alone.
    async fn update_generation<F>(&self, name: &str, create: bool, change: F) -> WorkerResult<bool>
    where
        F: FnOnce(&mut Generation) -> bool + Send,
    {
        let mut state = self.state.lock().await;
        let created = !state.contains(name);
        if created && !create {
            return Ok(false);
        }
        let mut next = state.get(name).cloned().unwrap_or_default();
        let changed = change(&mut next);
        if !changed && !created {
            return Ok(false);
        }

        let bytes = encode_generation(name, &next)?;
        let mut names = state.names();
        if created {
            names.push(name.to_owned());
        }

        let root = self.root.clone();
        let owned_name = name.to_owned();
        run_blocking(move || {
            write_generation(&root, &owned_name, &bytes)?;
            if created {
                write_index(&root, &names)?;
            }
            Ok(())
        })
        .await?;

        *state.open(name) = next;
        Ok(changed)
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn open(&self, generation: &str) -> WorkerResult<()> {
        self.update_generation(generation, true, |_| false).await?;
        Ok(())
    }

    async fn names(&self) -> WorkerResult<Vec<String>> {
        Ok(self.state.lock().await.names())
    }

    async fn delete(&self, generation: &str) -> WorkerResult<bool> {
        let mut state = self.state.lock().await;
        if !state.contains(generation) {
            return Ok(false);
        }

        let remaining: Vec<String> = state
            .names()
            .into_iter()
            .filter(|name| name != generation)
            .collect();
        let root = self.root.clone();
        let owned_name = generation.to_owned();
        run_blocking(move || {
            write_index(&root, &remaining)?;
            remove_generation_file(&root, &owned_name)
        })
        .await?;

        Ok(state.remove(generation))
    }

    async fn put(
        &self,
        generation: &str,
        key: RequestKey,
        response: Response,
    ) -> WorkerResult<()> {
        self.update_generation(generation, true, move |target| {
            target.insert(key, response);
            true
        })
        .await?;
        Ok(())
    }

    async fn put_all(
        &self,
        generation: &str,
        entries: Vec<(RequestKey, Response)>,
    ) -> WorkerResult<()> {
        self.update_generation(generation, true, move |target| {
            for (key, response) in entries {
                target.insert(key, response);
            }
            true
        })
        .await?;
        Ok(())
    }

    async fn get(&self, generation: &str, key: &RequestKey) -> WorkerResult<Option<Response>> {
        let state = self.state.lock().await;
        Ok(state
            .get(generation)
            .and_then(|found| found.get(key))
            .cloned())
    }

    async fn find(&self, key: &RequestKey) -> WorkerResult<Option<Response>> {
        Ok(self.state.lock().await.find(key).cloned())
    }

    async fn keys(&self, generation: &str) -> WorkerResult<Vec<RequestKey>> {
        let state = self.state.lock().await;
        Ok(state
            .get(generation)
            .map(|found| found.keys())
            .unwrap_or_default())
    }

    async fn remove(&self, generation: &str, key: &RequestKey) -> WorkerResult<bool> {
        let key = key.clone();
        self.update_generation(generation, false, move |target| target.remove(&key))
            .await
    }
}

/// Runs file I/O on the blocking pool.
pub(crate) async fn run_blocking<F, T>(work: F) -> WorkerResult<T>
where
    F: FnOnce() -> WorkerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|error| {
        WorkerError::new(
            "storage.io_task_failed",
            format!("storage I/O task did not complete: {error}"),
        )
    })?
}

fn generation_path(root: &Path, name: &str) -> PathBuf {
    root.join(GENERATIONS_DIR)
        .join(format!("{}.cache", encode_hex(name.as_bytes())))
}

fn read_index(root: &Path) -> WorkerResult<Vec<String>> {
    let path = root.join(INDEX_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&path).map_err(|error| {
        WorkerError::new(
            "storage.index_read_failed",
            format!("failed to read cache index `{}`: {error}", path.display()),
        )
    })?;

    let mut names = Vec::new();
    for line in content.lines() {
        if line.is_empty() {
            continue;
        }
        names.push(decode_hex_string(line)?);
    }
    Ok(names)
}

fn write_index(root: &Path, names: &[String]) -> WorkerResult<()> {
    let mut encoded = String::new();
    for name in names {
        encoded.push_str(&encode_hex(name.as_bytes()));
        encoded.push('\n');
    }
    write_atomically(&root.join(INDEX_FILE), encoded.as_bytes())
}

fn write_generation(root: &Path, name: &str, bytes: &[u8]) -> WorkerResult<()> {
    write_atomically(&generation_path(root, name), bytes)
}

fn remove_generation_file(root: &Path, name: &str) -> WorkerResult<()> {
    let path = generation_path(root, name);
    if !path.exists() {
        return Ok(());
    }

    fs::remove_file(&path).map_err(|error| {
        WorkerError::new(
            "storage.generation_remove_failed",
            format!(
                "failed removing generation file `{}`: {error}",
                path.display()
            ),
        )
    })
}

fn write_atomically(path: &Path, bytes: &[u8]) -> WorkerResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| {
            WorkerError::new(
                "storage.dir_create_failed",
                format!(
                    "failed to create storage directory `{}`: {error}",
                    parent.display()
                ),
            )
        })?;
    }

    let staging = path.with_extension("tmp");
    fs::write(&staging, bytes).map_err(|error| {
        WorkerError::new(
            "storage.write_failed",
            format!("failed to write `{}`: {error}", staging.display()),
        )
    })?;
    fs::rename(&staging, path).map_err(|error| {
        WorkerError::new(
            "storage.write_failed",
            format!(
                "failed to move `{}` into place: {error}",
                staging.display()
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::DiskCacheStore;
    use crate::CacheStore;
    use hb_net::Request;
    use hb_net::RequestKey;
    use hb_net::Response;

    fn key(raw: &str) -> RequestKey {
        match Request::get_str(raw) {
            Ok(request) => request.key(),
            Err(error) => panic!("{error}"),
        }
    }

    fn load(root: &std::path::Path) -> DiskCacheStore {
        match DiskCacheStore::load(root.to_path_buf()) {
            Ok(store) => store,
            Err(error) => panic!("{error}"),
        }
    }

    #[tokio::test]
    async fn entries_survive_reload() {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(error) => panic!("{error}"),
        };

        {
            let store = load(dir.path());
            let first = store
                .put("v1-dynamic", key("https://fonts.gstatic.com/a.woff2"), Response::ok("a"))
                .await;
            let second = store
                .put("v1-dynamic", key("https://fonts.gstatic.com/b.woff2"), Response::ok("b"))
                .await;
            assert!(first.is_ok());
            assert!(second.is_ok());
            assert!(store.open("v1-static").await.is_ok());
        }

        let reloaded = load(dir.path());
        assert_eq!(
            reloaded.names().await,
            Ok(vec!["v1-dynamic".to_owned(), "v1-static".to_owned()])
        );
        assert_eq!(
            reloaded.keys("v1-dynamic").await,
            Ok(vec![
                key("https://fonts.gstatic.com/a.woff2"),
                key("https://fonts.gstatic.com/b.woff2"),
            ])
        );
        let body = reloaded
            .get("v1-dynamic", &key("https://fonts.gstatic.com/b.woff2"))
            .await
            .map(|found| found.map(|response| response.body));
        assert_eq!(body, Ok(Some(b"b".to_vec())));
    }

    #[tokio::test]
    async fn deleted_generation_stays_deleted_after_reload() {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(error) => panic!("{error}"),
        };

        {
            let store = load(dir.path());
            let stored = store
                .put("v0-static", key("https://landing.example/"), Response::ok("old"))
                .await;
            assert!(stored.is_ok());
            assert_eq!(store.delete("v0-static").await, Ok(true));
            assert_eq!(store.delete("v0-static").await, Ok(false));
        }

        let reloaded = load(dir.path());
        assert_eq!(reloaded.names().await, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn remove_rewrites_generation() {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(error) => panic!("{error}"),
        };

        let store = load(dir.path());
        let target = key("https://unpkg.com/aos@2.3.1/dist/aos.css");
        assert!(
            store
                .put("v1-dynamic", target.clone(), Response::ok("css"))
                .await
                .is_ok()
        );
        assert_eq!(store.remove("v1-dynamic", &target).await, Ok(true));
        assert_eq!(store.remove("v1-dynamic", &target).await, Ok(false));

        let reloaded = load(dir.path());
        assert_eq!(reloaded.keys("v1-dynamic").await, Ok(Vec::new()));
    }
}
