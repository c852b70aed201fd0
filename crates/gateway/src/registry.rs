//! Reference-counted backing worker processes, one per resource.

use crate::error::{GatewayError, Result};
use crate::resource::ResourceKey;
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How to launch a backing worker for a resource.
///
/// The worker receives the resource name and folder as positional arguments
/// after `base_args`; when `offset_flag` is set, the subscriber's offset is
/// appended as `<flag> <seconds>`.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    /// Program to execute.
    pub program: String,
    /// Arguments placed before the resource arguments.
    pub base_args: Vec<String>,
    /// Flag introducing the offset argument, if the worker takes one.
    pub offset_flag: Option<String>,
}

impl WorkerCommand {
    /// Create a command with no extra arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            offset_flag: None,
        }
    }

    /// Append arguments placed before the resource name and folder.
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Forward the subscriber's offset behind the given flag.
    pub fn with_offset_flag(mut self, flag: impl Into<String>) -> Self {
        self.offset_flag = Some(flag.into());
        self
    }

    /// Build the process invocation for one resource.
    fn build(&self, key: &ResourceKey, offset_secs: f64) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args).arg(&key.name).arg(&key.folder);
        if let Some(flag) = &self.offset_flag {
            cmd.arg(flag).arg(offset_secs.to_string());
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

/// A running worker and the number of sessions depending on it.
struct WorkerEntry {
    child: Child,
    refs: usize,
}

/// Owns zero or one backing worker process per resource key.
///
/// Every mutation runs under one lock spanning the whole check-spawn or
/// check-kill step, so concurrent acquires for an unseen key start exactly
/// one process and a worker is never killed while references remain.
pub struct WorkerRegistry {
    command: WorkerCommand,
    entries: Mutex<HashMap<ResourceKey, WorkerEntry>>,
}

impl WorkerRegistry {
    /// Create an empty registry launching workers with `command`.
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Take a reference on the worker for `key`, spawning it on first use.
    ///
    /// A spawn failure leaves the key absent, so a later acquire can retry.
    pub async fn acquire(&self, key: &ResourceKey, offset_secs: f64) -> Result<()> {
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get_mut(key) {
            entry.refs += 1;
            debug!("Reusing worker for {} ({} refs)", key, entry.refs);
            return Ok(());
        }

        let child = self
            .command
            .build(key, offset_secs)
            .spawn()
            .map_err(|source| {
                counter!("gateway_worker_spawn_failures_total").increment(1);
                GatewayError::WorkerSpawn {
                    resource: key.to_string(),
                    source,
                }
            })?;

        info!("Started worker for {} (pid {:?})", key, child.id());
        entries.insert(key.clone(), WorkerEntry { child, refs: 1 });

        counter!("gateway_workers_spawned_total").increment(1);
        gauge!("gateway_active_workers").set(entries.len() as f64);
        Ok(())
    }

    /// Drop one reference on the worker for `key`; at zero the process is
    /// killed and the entry removed. Unknown keys are a no-op, which makes
    /// overlapping disconnect paths safe.
    pub async fn release(&self, key: &ResourceKey) {
        let mut entries = self.entries.lock().await;

        let Some(entry) = entries.get_mut(key) else {
            debug!("Release for {} with no live worker", key);
            return;
        };

        entry.refs -= 1;
        if entry.refs > 0 {
            debug!("Released worker for {} ({} refs remain)", key, entry.refs);
            return;
        }

        // Last reference: tear down inside the same critical section so no
        // caller can observe a dead entry or revive a dying one.
        if let Some(mut entry) = entries.remove(key) {
            if let Err(e) = entry.child.kill().await {
                warn!("Failed to kill worker for {}: {}", key, e);
            }
            info!("Stopped worker for {}", key);
        }
        gauge!("gateway_active_workers").set(entries.len() as f64);
    }

    /// Kill every worker. Used on gateway shutdown after sessions drain.
    pub async fn shutdown(&self) {
        let mut entries = self.entries.lock().await;
        for (key, mut entry) in entries.drain() {
            if let Err(e) = entry.child.kill().await {
                warn!("Failed to kill worker for {}: {}", key, e);
            }
            info!("Stopped worker for {}", key);
        }
        gauge!("gateway_active_workers").set(0.0);
    }

    /// Number of live workers.
    pub async fn worker_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Reference count for one key (0 when absent).
    pub async fn refs(&self, key: &ResourceKey) -> usize {
        self.entries.lock().await.get(key).map_or(0, |e| e.refs)
    }

    /// Total references across all workers, which equals the number of live
    /// sessions since each session holds exactly one.
    pub async fn total_refs(&self) -> usize {
        self.entries.lock().await.values().map(|e| e.refs).sum()
    }

    /// Whether the worker process for `key` is still running.
    pub async fn is_alive(&self, key: &ResourceKey) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) => matches!(entry.child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// A worker that stays up; sh ignores the resource arguments after -c.
    fn sleeper_registry() -> WorkerRegistry {
        WorkerRegistry::new(WorkerCommand::new("sh").with_args(["-c", "sleep 30"]))
    }

    fn key() -> ResourceKey {
        ResourceKey::new("f", "r.csv")
    }

    #[test]
    fn test_command_argv_order() {
        let command = WorkerCommand::new("python")
            .with_args(["main.py"])
            .with_offset_flag("--offset");
        let built = command.build(&key(), 5.0);
        let args: Vec<&str> = built
            .as_std()
            .get_args()
            .map(|a| a.to_str().unwrap())
            .collect();
        assert_eq!(args, vec!["main.py", "r.csv", "f", "--offset", "5"]);
    }

    #[test]
    fn test_command_without_offset_flag() {
        let built = WorkerCommand::new("refresher").build(&key(), 2.5);
        let args: Vec<&str> = built
            .as_std()
            .get_args()
            .map(|a| a.to_str().unwrap())
            .collect();
        assert_eq!(args, vec!["r.csv", "f"]);
    }

    #[tokio::test]
    async fn test_acquire_spawns_once_and_counts() {
        let registry = sleeper_registry();
        registry.acquire(&key(), 5.0).await.unwrap();
        registry.acquire(&key(), 5.0).await.unwrap();

        assert_eq!(registry.worker_count().await, 1);
        assert_eq!(registry.refs(&key()).await, 2);
        assert!(registry.is_alive(&key()).await);

        registry.release(&key()).await;
        assert_eq!(registry.worker_count().await, 1);
        assert!(registry.is_alive(&key()).await);

        registry.release(&key()).await;
        assert_eq!(registry.worker_count().await, 0);
        assert!(!registry.is_alive(&key()).await);
    }

    #[tokio::test]
    async fn test_release_unknown_key_is_noop() {
        let registry = sleeper_registry();
        registry.release(&key()).await;
        registry.release(&key()).await;
        assert_eq!(registry.worker_count().await, 0);
        assert_eq!(registry.refs(&key()).await, 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_get_distinct_workers() {
        let registry = sleeper_registry();
        let a = ResourceKey::new("f", "a.csv");
        let b = ResourceKey::new("f", "b.csv");
        registry.acquire(&a, 5.0).await.unwrap();
        registry.acquire(&b, 5.0).await.unwrap();
        assert_eq!(registry.worker_count().await, 2);

        registry.release(&a).await;
        assert_eq!(registry.worker_count().await, 1);
        assert!(registry.is_alive(&b).await);

        registry.shutdown().await;
        assert_eq!(registry.worker_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_spawn_one_worker() {
        let registry = Arc::new(sleeper_registry());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(
                async move { registry.acquire(&key(), 5.0).await },
            ));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(registry.worker_count().await, 1);
        assert_eq!(registry.refs(&key()).await, 8);

        for _ in 0..8 {
            registry.release(&key()).await;
        }
        assert_eq!(registry.worker_count().await, 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_no_entry() {
        let registry = WorkerRegistry::new(WorkerCommand::new("nonexistent_command_xyz_42"));
        let result = registry.acquire(&key(), 5.0).await;
        assert!(matches!(result, Err(GatewayError::WorkerSpawn { .. })));
        assert_eq!(registry.worker_count().await, 0);
        assert_eq!(registry.refs(&key()).await, 0);
    }
}
