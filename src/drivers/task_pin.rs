//! Execution-unit spawning with explicit priority and stack size.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread::spawn` creates a
//! FreeRTOS task with the requested priority and stack. On non-ESP targets,
//! falls back to a plain named thread.
//!
//! # ESP-IDF Threading Model
//!
//! ESP-IDF implements `std::thread` via pthreads, which are thin wrappers
//! around FreeRTOS tasks. `esp_pthread_set_cfg()` sets thread-local
//! configuration that applies to the *next* `pthread_create()` call from
//! the calling thread, so the config→spawn pair must not be interleaved
//! with other thread creation on the same thread.

use std::io;
use std::thread::JoinHandle;

/// Static description of one execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    /// Null-terminated task name, e.g. `"mcp-rx\0"`.
    pub name: &'static str,
    /// FreeRTOS priority (ignored on host).
    pub priority: u8,
    pub stack_kb: usize,
}

impl TaskSpec {
    pub const fn new(name: &'static str, priority: u8, stack_kb: usize) -> Self {
        Self {
            name,
            priority,
            stack_kb,
        }
    }

    fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }
}

/// Accept loop: infrequent, short-lived work.
pub const ACCEPT_TASK: TaskSpec = TaskSpec::new("mcp-accept\0", 5, 4);
/// Per-client receive unit; runs the dispatcher on its own stack.
pub const CLIENT_TASK: TaskSpec = TaskSpec::new("mcp-client\0", 5, 8);
/// Serial receive unit.
pub const SERIAL_RX_TASK: TaskSpec = TaskSpec::new("mcp-rx\0", 5, 8);
/// Serial transmit unit.
pub const SERIAL_TX_TASK: TaskSpec = TaskSpec::new("mcp-tx\0", 4, 4);

/// Spawn an execution unit with explicit priority and stack.
#[cfg(target_os = "espidf")]
pub fn spawn_task<T, F>(spec: TaskSpec, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    // SAFETY: the config struct is fully initialised by
    // `esp_create_default_pthread_config` and `spec.name` is a
    // null-terminated 'static string that outlives the spawned task.
    let ret = unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.prio = i32::from(spec.priority);
        cfg.stack_size = (spec.stack_kb * 1024) as _;
        cfg.thread_name = spec.name.as_ptr().cast();
        esp_idf_sys::esp_pthread_set_cfg(&cfg)
    };
    if ret != esp_idf_sys::ESP_OK {
        return Err(io::Error::other(format!("esp_pthread_set_cfg failed: {ret}")));
    }

    log::info!(
        "Spawning '{}' (pri={}, stack={}KB)",
        spec.display_name(),
        spec.priority,
        spec.stack_kb
    );

    std::thread::Builder::new()
        .name(spec.display_name().into())
        .spawn(f)
}

/// Simulation fallback — ignores priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_task<T, F>(spec: TaskSpec, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    log::debug!(
        "Spawning '{}' (sim, stack={}KB)",
        spec.display_name(),
        spec.stack_kb
    );

    std::thread::Builder::new()
        .name(spec.display_name().into())
        .stack_size(spec.stack_kb * 1024)
        .spawn(f)
}
