/*++

Licensed under the Apache-2.0 license.

File Name:

    mailbox.rs

Abstract:

    File contains the device side of the command and response rings.

--*/

use crate::{Dispatcher, Fatal, Syscalls};
use chaos_api::mailbox::{MAILBOX_CMD_SIZE, MAILBOX_RSP_SIZE};
use chaos_api::{Csr, MailboxCmd, MailboxRsp, RingGeometry};
use chaos_emu_bus::{Bus, CsrBlock};
use chaos_error::ChaosError;

fn slot_offset(base: u64, slot: u64, entry_size: usize) -> Result<usize, Fatal> {
    slot.checked_mul(entry_size as u64)
        .and_then(|off| off.checked_add(base))
        .and_then(|off| usize::try_from(off).ok())
        .ok_or(Fatal(ChaosError::FIRMWARE_BUFFER_OUT_OF_BOUNDS))
}

/// Take the command at `cmd_head`, if any, and advance `cmd_head`
pub fn poll_next_command<B: Bus>(csr: &CsrBlock, dram: &B) -> Result<Option<MailboxCmd>, Fatal> {
    let ring = RingGeometry::new(csr.read(Csr::CmdqSize))?;
    let head = csr.read(Csr::CmdHead);
    let tail = csr.read(Csr::CmdTail);
    if ring.is_empty(head, tail) {
        return Ok(None);
    }
    let offset = slot_offset(csr.read(Csr::CmdqAddr), ring.slot(head), MAILBOX_CMD_SIZE)?;
    let cmd = dram.read_obj(offset)?;
    csr.write(Csr::CmdHead, ring.advance(head));
    Ok(Some(cmd))
}

/// Write `rsp` at `rsp_tail` and advance `rsp_tail`
pub fn push_response<B: Bus>(csr: &CsrBlock, dram: &B, rsp: &MailboxRsp) -> Result<(), Fatal> {
    let ring = RingGeometry::new(csr.read(Csr::RspqSize))?;
    let tail = csr.read(Csr::RspTail);
    let offset = slot_offset(csr.read(Csr::RspqAddr), ring.slot(tail), MAILBOX_RSP_SIZE)?;
    dram.write_obj(offset, rsp)?;
    csr.write(Csr::RspTail, ring.advance(tail));
    Ok(())
}

/// Service at most one command
///
/// # Returns
///
/// * `Fatal` - The command could not be executed; no response is pushed
pub fn handle_mailbox<S: Syscalls, B: Bus>(
    csr: &CsrBlock,
    dispatcher: &Dispatcher<S, B>,
) -> Result<(), Fatal> {
    let Some(cmd) = poll_next_command(csr, dispatcher.dram())? else {
        return Ok(());
    };
    let retval = dispatcher.handle_command(&cmd)?;
    push_response(
        csr,
        dispatcher.dram(),
        &MailboxRsp {
            seq: cmd.seq,
            retval,
        },
    )
}
