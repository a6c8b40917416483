/*++

Licensed under the Apache-2.0 license.

File Name:

    device.rs

Abstract:

    File contains the emulated accelerator run loop, a thread that reacts
    to the doorbell by loading firmware and running cycles.

--*/

use crate::{DeviceVerificationEnv, FirmwareLoader, FirmwareRunner, IrqHandler};
use chaos_api::{Csr, IrqStatus};
use chaos_emu_bus::{CsrBlock, DeviceResources, Event};
use chaos_emu_crypto::SoftCrypto;
use chaos_emu_sandbox::CycleOutcome;
use chaos_error::{ChaosError, ChaosResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

struct RunLoop {
    resources: DeviceResources,
    runner: Box<dyn FirmwareRunner>,
    loader: FirmwareLoader<SoftCrypto>,
    irq: Arc<dyn IrqHandler>,
    shutdown: Arc<AtomicBool>,
}

impl RunLoop {
    fn run(mut self) {
        log::debug!("device run loop started");
        loop {
            self.resources.doorbell.wait_and_clear();
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            let csr_mem = self.resources.csr.clone();
            match CsrBlock::new(csr_mem.view()) {
                Ok(csr) => self.step(&csr),
                Err(err) => {
                    log::error!("register file is unusable: {err}");
                    break;
                }
            }
        }
        log::debug!("device run loop stopped");
    }

    fn step(&mut self, csr: &CsrBlock) {
        if csr.read(Csr::FwSize) != 0 {
            if let Err(code) = self
                .loader
                .load(csr, &*self.resources.dram, self.runner.as_mut())
            {
                log::debug!("previous firmware stays in place after status {code}");
            }
            self.irq.handle_irq(IrqStatus::FW_LOADED);
        }
        csr.write(Csr::CmdSent, 0);

        while csr.read(Csr::CmdHead) != csr.read(Csr::CmdTail) {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            let head = csr.read(Csr::CmdHead);
            match self.runner.run_cycle() {
                CycleOutcome::Completed => {
                    log::debug!("cycle completed, cmd_head {}", csr.read(Csr::CmdHead));
                    csr.raise_irq(IrqStatus::RESPONSE);
                    self.irq.handle_irq(IrqStatus::RESPONSE);
                }
                CycleOutcome::Failed(reason) => {
                    log::info!("cycle failed: {reason:?}");
                    return;
                }
            }
            if csr.read(Csr::CmdHead) == head {
                log::warn!("firmware completed a cycle without consuming a command");
                return;
            }
        }
    }
}

/// Emulated accelerator running on its own thread
pub struct ChaosDevice {
    doorbell: Arc<Event>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ChaosDevice {
    /// Start the device
    ///
    /// # Arguments
    ///
    /// * `resources` - Shared memory and doorbell
    /// * `runner` - Executes the loaded firmware
    /// * `trust_anchor` - Little-endian RSA modulus every image must carry
    /// * `irq` - Interrupt line to the host
    pub fn start(
        resources: &DeviceResources,
        runner: Box<dyn FirmwareRunner>,
        trust_anchor: Vec<u8>,
        irq: Arc<dyn IrqHandler>,
    ) -> ChaosResult<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let loader = FirmwareLoader::new(DeviceVerificationEnv::new(
            SoftCrypto,
            trust_anchor,
            runner.capacity(),
        ));
        let run_loop = RunLoop {
            resources: resources.clone(),
            runner,
            loader,
            irq,
            shutdown: shutdown.clone(),
        };
        let thread = std::thread::Builder::new()
            .name("chaos-device".into())
            .spawn(move || run_loop.run())
            .map_err(|err| {
                log::error!("spawning device thread failed: {err}");
                ChaosError::DEVICE_THREAD_SPAWN_FAILED
            })?;
        Ok(Self {
            doorbell: resources.doorbell.clone(),
            shutdown,
            thread: Some(thread),
        })
    }
}

impl Drop for ChaosDevice {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.doorbell.trigger(1);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("device thread panicked");
            }
        }
    }
}
