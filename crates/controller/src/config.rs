//! Controller configuration, read once at startup and threaded into the
//! reconciler.

use std::time::Duration;

use goop_core::FINALIZER;

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Finalizer token guarding physical deletion.
    pub finalizer: String,
    /// Delay between checks while waiting on the child workload.
    pub poll_interval: Duration,
    /// Upper bound for one reconcile pass; store calls past it abort.
    pub pass_timeout: Option<Duration>,
    /// Job image used when `spec.image` is unset.
    pub image: Option<String>,
    /// Job command used when `spec.command` is empty.
    pub job_command: Vec<String>,
    /// Dump the fetched object at debug level on every pass.
    pub log_objects: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            finalizer: FINALIZER.to_string(),
            poll_interval: Duration::from_secs(3),
            pass_timeout: Some(Duration::from_secs(30)),
            image: None,
            job_command: vec!["sleep".to_string(), "11".to_string()],
            log_objects: false,
        }
    }
}

fn flag(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

impl ControllerConfig {
    /// Defaults overridden by `GOOP_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(f) = get("GOOP_FINALIZER").filter(|s| !s.is_empty()) {
            cfg.finalizer = f;
        }
        if let Some(secs) = get("GOOP_POLL_SECS").and_then(|s| s.parse::<u64>().ok()) {
            cfg.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = get("GOOP_PASS_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok()) {
            // 0 disables the deadline
            cfg.pass_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        cfg.image = get("GOOP_IMAGE").filter(|s| !s.is_empty());
        if let Some(cmd) = get("GOOP_JOB_COMMAND") {
            let argv: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
            if !argv.is_empty() {
                cfg.job_command = argv;
            }
        }
        cfg.log_objects = get("GOOP_LOG_OBJECTS").map(|v| flag(&v)).unwrap_or(false);
        cfg
    }
}
