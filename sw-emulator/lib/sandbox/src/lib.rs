/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the sandbox executor: a forked child driven
    through ptrace whose only capabilities are the crypto call and exit.

--*/

mod buffer;
mod call;
mod inferior;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod ptrace;
mod region;
mod sandbox;

pub use buffer::Buffer;
pub use call::{CryptoCall, SandboxCall};
pub use inferior::{Inferior, Stop, SyscallInfo};
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub use ptrace::{ptrace_available, PtraceInferior};
pub use region::{ExecRegion, StackRegion};
pub use sandbox::{CycleOutcome, FailureReason, Sandbox};
