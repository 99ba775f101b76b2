use hb_core::WorkerError;
use hb_core::WorkerResult;
use hb_worker::LifecycleState;
use serde::Deserialize;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use tracing::warn;

const STATE_FILE: &str = "lifecycle.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SavedLifecycle {
    cache_name: String,
    state: LifecycleState,
}

/// Lifecycle state of the installed worker version, kept between runs.
#[derive(Debug, Clone)]
pub struct LifecycleFile {
    path: PathBuf,
}

impl LifecycleFile {
    pub fn new(store_root: &Path) -> Self {
        Self {
            path: store_root.join(STATE_FILE),
        }
    }

    /// State recorded for `cache_name`, settled to one a fresh run can
    /// continue from. Another version's record, a missing file or an
    /// unreadable one all start over at `Parsed`.
    pub fn load(&self, cache_name: &str) -> LifecycleState {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return LifecycleState::Parsed,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "failed to read lifecycle state");
                return LifecycleState::Parsed;
            }
        };

        match serde_json::from_str::<SavedLifecycle>(&raw) {
            Ok(saved) if saved.cache_name == cache_name => resumable(saved.state),
            Ok(saved) => {
                warn!(
                    recorded = %saved.cache_name,
                    current = cache_name,
                    "lifecycle state belongs to another version"
                );
                LifecycleState::Parsed
            }
            Err(error) => {
                warn!(path = %self.path.display(), %error, "ignoring malformed lifecycle state");
                LifecycleState::Parsed
            }
        }
    }

    pub fn save(&self, cache_name: &str, state: LifecycleState) -> WorkerResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                WorkerError::new(
                    "app.state.dir_create_failed",
                    format!("failed to create `{}`: {error}", parent.display()),
                )
            })?;
        }

        let saved = SavedLifecycle {
            cache_name: cache_name.to_owned(),
            state,
        };
        let encoded = serde_json::to_vec_pretty(&saved).map_err(|error| {
            WorkerError::new(
                "app.state.encode_failed",
                format!("failed to encode lifecycle state: {error}"),
            )
        })?;
        fs::write(&self.path, encoded).map_err(|error| {
            WorkerError::new(
                "app.state.write_failed",
                format!("failed to write `{}`: {error}", self.path.display()),
            )
        })
    }
}

/// A redundant worker is discarded and the next run registers afresh. A run
/// that stopped mid-transition resumes from the last settled state.
fn resumable(state: LifecycleState) -> LifecycleState {
    match state {
        LifecycleState::Redundant | LifecycleState::Installing => LifecycleState::Parsed,
        LifecycleState::Activating => LifecycleState::Installed,
        settled => settled,
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleFile;
    use hb_worker::LifecycleState;
    use std::fs;

    #[test]
    fn saved_state_round_trips_for_the_same_version() {
        let dir = match tempfile::tempdir() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let file = LifecycleFile::new(dir.path());

        assert_eq!(file.load("landing-v1"), LifecycleState::Parsed);
        assert!(file.save("landing-v1", LifecycleState::Activated).is_ok());
        assert_eq!(file.load("landing-v1"), LifecycleState::Activated);
    }

    #[test]
    fn version_bump_starts_over() {
        let dir = match tempfile::tempdir() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let file = LifecycleFile::new(dir.path());
        assert!(file.save("landing-v1", LifecycleState::Activated).is_ok());

        assert_eq!(file.load("landing-v2"), LifecycleState::Parsed);
    }

    #[test]
    fn redundant_worker_registers_again() {
        let dir = match tempfile::tempdir() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let file = LifecycleFile::new(dir.path());
        assert!(file.save("landing-v1", LifecycleState::Redundant).is_ok());

        assert_eq!(file.load("landing-v1"), LifecycleState::Parsed);
    }

    #[test]
    fn interrupted_transitions_resume_from_settled_state() {
        let dir = match tempfile::tempdir() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let file = LifecycleFile::new(dir.path());

        assert!(file.save("landing-v1", LifecycleState::Installing).is_ok());
        assert_eq!(file.load("landing-v1"), LifecycleState::Parsed);

        assert!(file.save("landing-v1", LifecycleState::Activating).is_ok());
        assert_eq!(file.load("landing-v1"), LifecycleState::Installed);

        assert!(file.save("landing-v1", LifecycleState::Installed).is_ok());
        assert_eq!(file.load("landing-v1"), LifecycleState::Installed);
    }

    #[test]
    fn corrupt_file_starts_over() {
        let dir = match tempfile::tempdir() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        assert!(fs::write(dir.path().join("lifecycle.json"), "{oops").is_ok());

        let file = LifecycleFile::new(dir.path());
        assert_eq!(file.load("landing-v1"), LifecycleState::Parsed);
    }
}
