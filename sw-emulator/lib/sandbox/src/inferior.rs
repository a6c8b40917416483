// Licensed under the Apache-2.0 license

use chaos_error::ChaosResult;

/// Syscall number and the six argument registers
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyscallInfo {
    pub nr: u64,
    pub args: [u64; 6],
}

/// Why the child stopped running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    /// Entered a syscall; the kernel will not execute it
    Syscall(SyscallInfo),

    /// Exited on its own
    Exited(i32),

    /// Terminated by a signal
    Signaled(i32),

    /// Stopped with a signal pending, e.g. a fault
    Stopped(i32),
}

/// Control over a sandboxed child
pub trait Inferior {
    /// Resume until the next syscall entry or termination
    fn resume_until_syscall(&mut self) -> ChaosResult<Stop>;

    /// Copy `buf.len()` bytes from the child at `addr`; all or nothing
    fn read_memory(&mut self, addr: u64, buf: &mut [u8]) -> ChaosResult<()>;

    /// Copy `data` into the child at `addr`; all or nothing
    fn write_memory(&mut self, addr: u64, data: &[u8]) -> ChaosResult<()>;

    /// Result the pending syscall returns to the child
    fn set_syscall_return(&mut self, val: i64) -> ChaosResult<()>;
}
