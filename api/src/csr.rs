// Licensed under the Apache-2.0 license

use bitflags::bitflags;
use core::mem::{offset_of, size_of};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Register file shared between the host driver and the device.
///
/// Every field is a 64-bit register; accesses are 8-byte aligned.
#[repr(C)]
#[derive(Debug, Default, Clone, IntoBytes, FromBytes, Immutable, KnownLayout, PartialEq, Eq)]
pub struct Csrs {
    /// DRAM offset of the firmware image; holds the verification status
    /// once the device has processed a load.
    pub load_addr: u64,
    pub fw_size: u64,
    pub cmdq_addr: u64,
    pub rspq_addr: u64,
    pub cmdq_size: u64,
    pub rspq_size: u64,
    pub irq_status: u64,
    pub clear_irq: u64,
    pub cmd_sent: u64,
    pub cmd_head: u64,
    pub cmd_tail: u64,
    pub rsp_head: u64,
    pub rsp_tail: u64,
    pub reserved: [u64; 3],
}

pub const CSRS_SIZE: usize = size_of::<Csrs>();
const _: () = assert!(CSRS_SIZE == 0x80);

/// Register selector used by the typed CSR accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Csr {
    LoadAddr,
    FwSize,
    CmdqAddr,
    RspqAddr,
    CmdqSize,
    RspqSize,
    IrqStatus,
    ClearIrq,
    CmdSent,
    CmdHead,
    CmdTail,
    RspHead,
    RspTail,
}

impl Csr {
    /// Byte offset of the register within [`Csrs`]
    pub const fn offset(self) -> usize {
        match self {
            Csr::LoadAddr => offset_of!(Csrs, load_addr),
            Csr::FwSize => offset_of!(Csrs, fw_size),
            Csr::CmdqAddr => offset_of!(Csrs, cmdq_addr),
            Csr::RspqAddr => offset_of!(Csrs, rspq_addr),
            Csr::CmdqSize => offset_of!(Csrs, cmdq_size),
            Csr::RspqSize => offset_of!(Csrs, rspq_size),
            Csr::IrqStatus => offset_of!(Csrs, irq_status),
            Csr::ClearIrq => offset_of!(Csrs, clear_irq),
            Csr::CmdSent => offset_of!(Csrs, cmd_sent),
            Csr::CmdHead => offset_of!(Csrs, cmd_head),
            Csr::CmdTail => offset_of!(Csrs, cmd_tail),
            Csr::RspHead => offset_of!(Csrs, rsp_head),
            Csr::RspTail => offset_of!(Csrs, rsp_tail),
        }
    }
}

bitflags! {
    /// Interrupt causes raised by the device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqStatus: u64 {
        /// Firmware verification finished; status is in `load_addr`.
        const FW_LOADED = 1 << 0;
        /// New entries are available in the response ring.
        const RESPONSE = 1 << 1;
    }
}

/// Firmware verification status word.
///
/// Bit 63 marks completion. The low 63 bits are zero on success, or hold the
/// negative reason code truncated to 63 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyStatus(pub u64);

impl VerifyStatus {
    pub const DONE: u64 = 1 << 63;

    pub fn encode(result: Result<(), i64>) -> Self {
        match result {
            Ok(()) => Self(Self::DONE),
            Err(code) => Self(Self::DONE | (code as u64 & !Self::DONE)),
        }
    }

    pub fn is_done(self) -> bool {
        self.0 & Self::DONE != 0
    }

    /// Returns `None` while verification is still pending.
    pub fn decode(self) -> Option<Result<(), i64>> {
        if !self.is_done() {
            return None;
        }
        let low = self.0 & !Self::DONE;
        if low == 0 {
            Some(Ok(()))
        } else {
            // Sign-extend the 63-bit payload.
            Some(Err(((low << 1) as i64) >> 1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errno;

    #[test]
    fn test_register_offsets() {
        assert_eq!(Csr::LoadAddr.offset(), 0x00);
        assert_eq!(Csr::FwSize.offset(), 0x08);
        assert_eq!(Csr::IrqStatus.offset(), 0x30);
        assert_eq!(Csr::CmdSent.offset(), 0x40);
        assert_eq!(Csr::CmdHead.offset(), 0x48);
        assert_eq!(Csr::RspTail.offset(), 0x60);
    }

    #[test]
    fn test_verify_status() {
        assert_eq!(VerifyStatus(0).decode(), None);
        assert_eq!(VerifyStatus(0x1234).decode(), None);

        let ok = VerifyStatus::encode(Ok(()));
        assert_eq!(ok.0, 1 << 63);
        assert_eq!(ok.decode(), Some(Ok(())));

        for code in [errno::EINVAL, errno::EKEYREJECTED, errno::EBADMSG] {
            let status = VerifyStatus::encode(Err(-code));
            assert!(status.is_done());
            assert_eq!(status.decode(), Some(Err(-code)));
        }
    }

    #[test]
    fn test_verify_status_matches_raw_encoding() {
        // (1 << 63) | (u64)(-EBADMSG)
        let raw = (1u64 << 63) | (-74i64 as u64);
        assert_eq!(VerifyStatus(raw).decode(), Some(Err(-74)));
    }
}
