/*++

Licensed under the Apache-2.0 license.

File Name:

    runner.rs

Abstract:

    File contains the firmware runners used by the device run loop. The
    sandbox runner executes the loaded code in a traced child; the
    in-process runner executes the firmware's mailbox logic directly and is
    used where tracing is not permitted.

--*/

use chaos_api::syscall::FIRMWARE_FATAL_EXIT;
use chaos_emu_bus::{CsrBlock, SharedMemory};
use chaos_emu_crypto::SoftCrypto;
use chaos_emu_sandbox::{CycleOutcome, ExecRegion, FailureReason, Sandbox, StackRegion};
use chaos_error::{ChaosError, ChaosResult};
use chaos_firmware::{handle_mailbox, Dispatcher, InProcessSyscalls};
use std::sync::Arc;
use std::time::Duration;

/// Executes one firmware cycle per call.
pub trait FirmwareRunner: Send {
    /// Largest code size [`FirmwareRunner::load`] accepts
    fn capacity(&self) -> usize;

    /// Replace the loaded code
    fn load(&mut self, code: &[u8]) -> ChaosResult<()>;

    /// Run the loaded code once
    fn run_cycle(&mut self) -> CycleOutcome;
}

fn no_firmware() -> CycleOutcome {
    log::warn!("run cycle requested with no firmware loaded");
    CycleOutcome::Failed(FailureReason::Platform(ChaosError::DEVICE_NO_FIRMWARE))
}

/// Runs the loaded code inside a ptrace/seccomp sandbox
pub struct SandboxRunner {
    exec: ExecRegion,
    stack: StackRegion,
    sandbox: Sandbox<SoftCrypto>,
    watchdog: Option<Duration>,
    loaded: bool,
}

impl SandboxRunner {
    /// Create a runner
    ///
    /// # Arguments
    ///
    /// * `exec_size` - Size of the executable region
    /// * `stack_size` - Size of the firmware stack
    /// * `watchdog` - Per-cycle deadline; `None` lets a cycle run forever
    pub fn new(exec_size: usize, stack_size: usize, watchdog: Option<Duration>) -> ChaosResult<Self> {
        Ok(Self {
            exec: ExecRegion::new(exec_size)?,
            stack: StackRegion::new(stack_size)?,
            sandbox: Sandbox::new(SoftCrypto),
            watchdog,
            loaded: false,
        })
    }
}

impl FirmwareRunner for SandboxRunner {
    fn capacity(&self) -> usize {
        self.exec.capacity()
    }

    fn load(&mut self, code: &[u8]) -> ChaosResult<()> {
        self.exec.load(code)?;
        self.loaded = true;
        Ok(())
    }

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    fn run_cycle(&mut self) -> CycleOutcome {
        if !self.loaded {
            return no_firmware();
        }
        self.sandbox
            .run_isolated(&self.exec, &self.stack, self.watchdog)
    }

    #[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
    fn run_cycle(&mut self) -> CycleOutcome {
        if !self.loaded {
            return no_firmware();
        }
        let _ = (&self.stack, &self.sandbox, self.watchdog);
        CycleOutcome::Failed(FailureReason::Platform(
            ChaosError::SANDBOX_UNSUPPORTED_PLATFORM,
        ))
    }
}

/// Runs the firmware's mailbox handler on the device thread.
///
/// The loaded code is kept but never executed; any verified image enables
/// the runner.
pub struct InProcessRunner {
    csr: Arc<SharedMemory>,
    dram: Arc<SharedMemory>,
    capacity: usize,
    code: Option<Vec<u8>>,
}

impl InProcessRunner {
    pub fn new(csr: Arc<SharedMemory>, dram: Arc<SharedMemory>, capacity: usize) -> Self {
        Self {
            csr,
            dram,
            capacity,
            code: None,
        }
    }
}

impl FirmwareRunner for InProcessRunner {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn load(&mut self, code: &[u8]) -> ChaosResult<()> {
        if code.len() > self.capacity {
            return Err(ChaosError::SANDBOX_CODE_TOO_LARGE);
        }
        self.code = Some(code.to_vec());
        Ok(())
    }

    fn run_cycle(&mut self) -> CycleOutcome {
        if self.code.is_none() {
            return no_firmware();
        }
        let csr = match CsrBlock::new(self.csr.view()) {
            Ok(csr) => csr,
            Err(err) => return CycleOutcome::Failed(FailureReason::Platform(err)),
        };
        let base = self.dram.base_addr();
        let dispatcher = Dispatcher::new(
            InProcessSyscalls::new(self.dram.view(), base, SoftCrypto),
            self.dram.view(),
            base,
        );
        match handle_mailbox(&csr, &dispatcher) {
            Ok(()) => CycleOutcome::Completed,
            Err(fatal) => {
                log::warn!("firmware aborted: {}", fatal.0);
                CycleOutcome::Failed(FailureReason::ExitCode(FIRMWARE_FATAL_EXIT))
            }
        }
    }
}
