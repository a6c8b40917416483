/*++

Licensed under the Apache-2.0 license.

File Name:

    config.rs

Abstract:

    File contains the emulated device configuration.

--*/

use chaos_api::mailbox::DEFAULT_QUEUE_SIZE;
use chaos_emu_sandbox::{ExecRegion, StackRegion};
use serde_derive::{Deserialize, Serialize};
use std::time::Duration;

/// Device configuration; every field has a default so partial TOML works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Slots in each of the command and response rings
    pub queue_size: u64,

    /// Size of the shared DRAM region in bytes
    pub dram_size: usize,

    /// How long the host waits for a response
    pub request_timeout_ms: u64,

    /// How long the host waits for a firmware load status
    pub load_timeout_ms: u64,

    /// Per-cycle limit on firmware run time; zero disables the watchdog
    pub cycle_watchdog_ms: u64,

    /// Size of the executable region in bytes
    pub exec_size: usize,

    /// Size of the firmware stack in bytes
    pub stack_size: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            dram_size: 0x10_0000,
            request_timeout_ms: 1000,
            load_timeout_ms: 1000,
            cycle_watchdog_ms: 1000,
            exec_size: ExecRegion::DEFAULT_SIZE,
            stack_size: StackRegion::DEFAULT_SIZE,
        }
    }
}

impl DeviceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn cycle_watchdog(&self) -> Option<Duration> {
        (self.cycle_watchdog_ms != 0).then(|| Duration::from_millis(self.cycle_watchdog_ms))
    }
}
