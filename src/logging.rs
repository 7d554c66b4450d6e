//! Structured logging setup: console plus a daily rolling file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

const LOG_FILE_PREFIX: &str = "coffee-desk";
const DEFAULT_FILTER: &str = "info,coffee_desk_lib=debug";
const APP_DIR_NAME: &str = "coffee-desk";

pub const ENV_LOG_DIR: &str = "COFFEE_DESK_LOG_DIR";

/// Where log files go: `COFFEE_DESK_LOG_DIR` when set, otherwise
/// `<user data dir>/coffee-desk/logs`.
pub fn resolve_log_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(ENV_LOG_DIR).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    user_data_dir().join(APP_DIR_NAME).join("logs")
}

fn user_data_dir() -> PathBuf {
    let var = |name: &str| {
        std::env::var_os(name)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    };
    let dir = if cfg!(windows) {
        var("LOCALAPPDATA").or_else(|| var("USERPROFILE").map(|h| h.join("AppData").join("Local")))
    } else {
        var("XDG_DATA_HOME").or_else(|| var("HOME").map(|h| h.join(".local").join("share")))
    };
    dir.unwrap_or_else(|| PathBuf::from("."))
}

/// Keep only the newest `keep` log files in `log_dir`.
pub fn prune_old_logs(log_dir: &Path, keep: usize) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX))
        })
        .filter(|entry| entry.path().is_file())
        .map(|entry| {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(std::time::UNIX_EPOCH);
            (entry.path(), modified)
        })
        .collect();

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(keep) {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to prune old log file");
        }
    }
}

/// Install the global subscriber writing daily files into `log_dir` (see
/// [`resolve_log_dir`]). `RUST_LOG` overrides the default filter.
///
/// Keep the returned guard alive for the lifetime of the process; dropping
/// it flushes and stops the file writer.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard, String> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fs::create_dir_all(log_dir)
        .map_err(|e| format!("Failed to create log directory {}: {e}", log_dir.display()))?;
    prune_old_logs(log_dir, MAX_LOG_FILES);

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| format!("Logging already initialised: {e}"))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn log_dir_env_override_wins() {
        std::env::set_var(ENV_LOG_DIR, "/var/log/coffee-desk");
        assert_eq!(resolve_log_dir(), PathBuf::from("/var/log/coffee-desk"));
        std::env::remove_var(ENV_LOG_DIR);
    }

    #[test]
    #[serial]
    fn default_log_dir_is_per_app() {
        std::env::remove_var(ENV_LOG_DIR);
        let dir = resolve_log_dir();
        assert!(dir.ends_with("coffee-desk/logs"), "got {}", dir.display());
    }

    #[test]
    fn prune_keeps_newest_and_ignores_foreign_files() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dir = tmp.path();
        for day in 1..=4 {
            let path = dir.join(format!("{LOG_FILE_PREFIX}.2026-01-0{day}"));
            fs::write(&path, "x").expect("write log");
            // Distinct mtimes so ordering is stable.
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        fs::write(dir.join("notes.txt"), "keep me").expect("write foreign");

        prune_old_logs(dir, 2);

        let mut left: Vec<String> = fs::read_dir(dir)
            .expect("read dir")
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                format!("{LOG_FILE_PREFIX}.2026-01-03"),
                format!("{LOG_FILE_PREFIX}.2026-01-04"),
                "notes.txt".to_string(),
            ]
        );
    }

    #[test]
    fn prune_tolerates_missing_directory() {
        prune_old_logs(Path::new("/definitely/not/here/coffee-desk"), 1);
    }
}
