/*++

Licensed under the Apache-2.0 license.

File Name:

    driver.rs

Abstract:

    File contains the host driver instance: the DRAM pool, the mailbox, the
    firmware load path and the interrupt handler.

--*/

use crate::{Client, DramPool, Mailbox, DRAM_GRANULE};
use chaos_api::mailbox::DEFAULT_QUEUE_SIZE;
use chaos_api::{Csr, IrqStatus, VerifyStatus};
use chaos_emu_bus::{Bus, CsrBlock, DeviceResources, Event, SharedMemory};
use chaos_error::{ChaosError, ChaosResult};
use chaos_image_verify::status_error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Slots in each mailbox ring; a power of two
    pub queue_size: u64,

    /// How long a request waits for its response
    pub request_timeout: Duration,

    /// How long a firmware load waits for the verification status
    pub load_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            request_timeout: Duration::from_secs(1),
            load_timeout: Duration::from_secs(1),
        }
    }
}

/// Host driver bound to one device
pub struct ChaosDriver {
    resources: DeviceResources,
    mailbox: Mailbox,
    pool: Arc<DramPool>,
    fw_loaded: Event,
    load_lock: Mutex<()>,
    load_timeout: Duration,
}

impl ChaosDriver {
    /// Bind to a device and set up the mailbox rings
    pub fn new(resources: DeviceResources, config: &DriverConfig) -> ChaosResult<Self> {
        let pool = Arc::new(DramPool::new(resources.dram.len(), DRAM_GRANULE)?);
        let mailbox = Mailbox::new(resources.clone(), pool.clone(), config)?;
        Ok(Self {
            resources,
            mailbox,
            pool,
            fw_loaded: Event::new(),
            load_lock: Mutex::new(()),
            load_timeout: config.load_timeout,
        })
    }

    pub fn pool(&self) -> &DramPool {
        &self.pool
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn dram(&self) -> &Arc<SharedMemory> {
        &self.resources.dram
    }

    /// Open a new client handle
    pub fn open(self: &Arc<Self>) -> Client {
        Client::new(self.clone())
    }

    /// Hand a signed image to the device and wait for its verdict
    ///
    /// # Arguments
    ///
    /// * `image` - Signed firmware image
    ///
    /// # Error
    ///
    /// * `DRIVER_MAILBOX_IMAGE_TOO_LARGE` - The image does not fit in DRAM
    /// * `DRIVER_MAILBOX_FW_LOAD_TIMEOUT` - The device did not answer in time
    /// * `IMAGE_VERIFIER_*` - The device rejected the image
    pub fn load_firmware(&self, image: &[u8]) -> ChaosResult<()> {
        if image.len() > self.pool.capacity() {
            return Err(ChaosError::DRIVER_MAILBOX_IMAGE_TOO_LARGE);
        }
        let _load = self.load_lock.lock().unwrap_or_else(|e| e.into_inner());
        let scratch = self.pool.allocate(image.len())?;
        let result = self.load_from(scratch.offset(), image);
        self.pool.free(scratch)?;
        result
    }

    fn load_from(&self, offset: usize, image: &[u8]) -> ChaosResult<()> {
        self.resources.dram.write_bytes(offset, image)?;
        let csr = CsrBlock::new(self.resources.csr.view())?;

        // Forget any verdict left over from a load that timed out
        let _ = self.fw_loaded.wait_timeout(Duration::ZERO);
        csr.write(Csr::LoadAddr, offset as u64);
        csr.write(Csr::FwSize, image.len() as u64);
        self.resources.doorbell.trigger(1);

        if self.fw_loaded.wait_timeout(self.load_timeout).is_none() {
            log::warn!("device did not report a firmware status");
            return Err(ChaosError::DRIVER_MAILBOX_FW_LOAD_TIMEOUT);
        }
        match VerifyStatus(csr.read(Csr::LoadAddr)).decode() {
            Some(Ok(())) => {
                log::info!("firmware accepted");
                Ok(())
            }
            Some(Err(code)) => {
                log::warn!("firmware rejected with status {code}");
                Err(status_error(code))
            }
            None => Err(ChaosError::DRIVER_MAILBOX_FW_UNKNOWN_STATUS),
        }
    }

    /// Interrupt handler for the device's interrupt line
    pub fn handle_irq(&self, irq: IrqStatus) {
        let Ok(csr) = CsrBlock::new(self.resources.csr.view()) else {
            return;
        };
        let pending = csr.irq_status() | irq;
        if pending.contains(IrqStatus::FW_LOADED) {
            csr.clear_irq(IrqStatus::FW_LOADED);
            self.fw_loaded.trigger(1);
        }
        if pending.contains(IrqStatus::RESPONSE) {
            csr.clear_irq(IrqStatus::RESPONSE);
            self.mailbox.handle_response_irq();
        }
    }
}
