/*++

Licensed under the Apache-2.0 license.

File Name:

    call.rs

Abstract:

    File contains decoding of a syscall stop into a sandbox call.

--*/

use crate::SyscallInfo;
use chaos_api::syscall::{SYS_CHAOS_CRYPTO, SYS_EXIT, SYS_EXIT_GROUP};
use chaos_api::PackedBuf;

/// Arguments of the crypto capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoCall {
    pub algo: u64,
    pub input: PackedBuf,
    pub key: PackedBuf,
    pub output: PackedBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxCall {
    Crypto(CryptoCall),
    Exit(i64),
    /// Anything else; the firmware is terminated
    Violation(u64),
}

impl SandboxCall {
    pub fn decode(info: &SyscallInfo) -> Self {
        match info.nr {
            SYS_CHAOS_CRYPTO => SandboxCall::Crypto(CryptoCall {
                algo: info.args[0],
                input: PackedBuf::unpack(info.args[1]),
                key: PackedBuf::unpack(info.args[2]),
                output: PackedBuf::unpack(info.args[3]),
            }),
            SYS_EXIT | SYS_EXIT_GROUP => SandboxCall::Exit(info.args[0] as i64),
            nr => SandboxCall::Violation(nr),
        }
    }
}
