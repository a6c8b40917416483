/*++

Licensed under the Apache-2.0 license.

File Name:

    csr.rs

Abstract:

    File contains the register block handle shared by the host driver and
    the device.

--*/

use crate::{Bus, MemoryView};
use chaos_api::csr::CSRS_SIZE;
use chaos_api::{Csr, IrqStatus};
use chaos_error::{ChaosError, ChaosResult};
use core::sync::atomic::{AtomicU64, Ordering};

/// Typed handle over the register file.
///
/// Reads use acquire ordering and writes use release ordering, so a cursor
/// update publishes every ring slot written before it.
#[derive(Clone, Copy)]
pub struct CsrBlock<'a> {
    regs: &'a [AtomicU64],
}

impl<'a> CsrBlock<'a> {
    /// Create a handle over the register file at the start of `mem`
    ///
    /// # Arguments
    ///
    /// * `mem` - Region holding the register file; must be 8-byte aligned
    pub fn new(mem: MemoryView<'a>) -> ChaosResult<Self> {
        if mem.len() < CSRS_SIZE {
            return Err(ChaosError::BUS_LOAD_ACCESS_FAULT);
        }
        if mem.base_addr() % core::mem::align_of::<AtomicU64>() != 0 {
            return Err(ChaosError::BUS_LOAD_ADDR_MISALIGNED);
        }
        // SAFETY: the region is at least CSRS_SIZE bytes, aligned, and lives
        // for 'a. AtomicU64 has the same layout as u64.
        let regs = unsafe {
            core::slice::from_raw_parts(
                mem.base_addr() as *const AtomicU64,
                CSRS_SIZE / core::mem::size_of::<u64>(),
            )
        };
        Ok(Self { regs })
    }

    #[inline]
    fn reg(&self, reg: Csr) -> &AtomicU64 {
        &self.regs[reg.offset() / core::mem::size_of::<u64>()]
    }

    #[inline]
    pub fn read(&self, reg: Csr) -> u64 {
        self.reg(reg).load(Ordering::Acquire)
    }

    #[inline]
    pub fn write(&self, reg: Csr, val: u64) {
        self.reg(reg).store(val, Ordering::Release)
    }

    pub fn irq_status(&self) -> IrqStatus {
        IrqStatus::from_bits_truncate(self.read(Csr::IrqStatus))
    }

    /// Latch interrupt causes (device side)
    pub fn raise_irq(&self, irq: IrqStatus) {
        self.reg(Csr::IrqStatus)
            .fetch_or(irq.bits(), Ordering::AcqRel);
    }

    /// Acknowledge interrupt causes (host side)
    pub fn clear_irq(&self, irq: IrqStatus) {
        self.write(Csr::ClearIrq, irq.bits());
        self.reg(Csr::IrqStatus)
            .fetch_and(!irq.bits(), Ordering::AcqRel);
    }
}
