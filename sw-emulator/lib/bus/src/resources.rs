// Licensed under the Apache-2.0 license

use crate::{Event, SharedMemory};
use chaos_api::csr::CSRS_SIZE;
use chaos_error::ChaosResult;
use std::sync::Arc;

/// Memory and doorbell shared between the host driver and the device
#[derive(Clone)]
pub struct DeviceResources {
    /// Register file
    pub csr: Arc<SharedMemory>,

    /// DMA-visible DRAM, mapped below 4 GiB
    pub dram: Arc<SharedMemory>,

    /// Doorbell the host rings after publishing work
    pub doorbell: Arc<Event>,
}

impl DeviceResources {
    pub fn new(dram_size: usize) -> ChaosResult<Self> {
        Ok(Self {
            csr: Arc::new(SharedMemory::new(CSRS_SIZE)?),
            dram: Arc::new(SharedMemory::new_low(dram_size)?),
            doorbell: Arc::new(Event::new()),
        })
    }
}
