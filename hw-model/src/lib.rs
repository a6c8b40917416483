// Licensed under the Apache-2.0 license

use chaos_api::IrqStatus;
use chaos_drivers::{ChaosDriver, Client, DriverConfig};
use chaos_emu_bus::DeviceResources;
use chaos_emu_periph::{ChaosDevice, DeviceConfig, FirmwareRunner, InProcessRunner, SandboxRunner};
use chaos_error::ChaosResult;
use std::sync::Arc;

/// How the device executes firmware
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RunnerKind {
    /// Forked child under ptrace and seccomp
    #[default]
    Sandbox,

    /// Firmware mailbox logic on the device thread
    InProcess,
}

#[derive(Default)]
pub struct InitParams {
    pub config: DeviceConfig,

    pub runner: RunnerKind,

    // Little-endian RSA modulus every firmware image must embed
    pub trust_anchor: Vec<u8>,
}

/// Host driver and emulated device wired together, for tests and tools
pub struct ChaosModel {
    // Stopped before the driver is torn down
    device: ChaosDevice,
    driver: Arc<ChaosDriver>,
    resources: DeviceResources,
}

impl ChaosModel {
    pub fn new(params: InitParams) -> ChaosResult<Self> {
        let config = &params.config;
        let resources = DeviceResources::new(config.dram_size)?;
        let driver = Arc::new(ChaosDriver::new(
            resources.clone(),
            &DriverConfig {
                queue_size: config.queue_size,
                request_timeout: config.request_timeout(),
                load_timeout: config.load_timeout(),
            },
        )?);

        let runner: Box<dyn FirmwareRunner> = match params.runner {
            RunnerKind::Sandbox => Box::new(SandboxRunner::new(
                config.exec_size,
                config.stack_size,
                config.cycle_watchdog(),
            )?),
            RunnerKind::InProcess => Box::new(InProcessRunner::new(
                resources.csr.clone(),
                resources.dram.clone(),
                config.exec_size,
            )),
        };

        let irq_driver = Arc::downgrade(&driver);
        let irq = move |irq: IrqStatus| {
            if let Some(driver) = irq_driver.upgrade() {
                driver.handle_irq(irq);
            }
        };
        let device = ChaosDevice::start(
            &resources,
            runner,
            params.trust_anchor,
            Arc::new(irq),
        )?;
        log::info!("model started with {:?} runner", params.runner);

        Ok(Self {
            device,
            driver,
            resources,
        })
    }

    pub fn driver(&self) -> &Arc<ChaosDriver> {
        &self.driver
    }

    pub fn resources(&self) -> &DeviceResources {
        &self.resources
    }

    /// Load a signed firmware image
    pub fn load_firmware(&self, image: &[u8]) -> ChaosResult<()> {
        self.driver.load_firmware(image)
    }

    /// Open a client handle
    pub fn open(&self) -> Client {
        self.driver.open()
    }

    /// Code for a firmware image that runs the built-in firmware against
    /// this model's register file and DRAM
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    pub fn trampoline_code(&self) -> Vec<u8> {
        chaos_firmware::Trampoline::for_firmware_entry(
            self.resources.csr.base_addr() as u64,
            self.resources.dram.base_addr() as u64,
            chaos_emu_bus::Bus::len(&*self.resources.dram) as u64,
        )
    }
}
