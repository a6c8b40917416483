/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the accelerator firmware.

    The firmware runs inside the sandboxed child. Everything reachable from
    `firmware_entry` must avoid heap allocation, logging and panics: the only
    syscalls the child may issue are the crypto capability and exit.

--*/

mod dispatcher;
mod entry;
mod mailbox;
mod syscalls;

pub use dispatcher::{Dispatcher, Fatal};
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub use entry::firmware_entry;
pub use entry::Trampoline;
pub use mailbox::{handle_mailbox, poll_next_command, push_response};
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub use syscalls::{sys_exit, RawSyscalls};
pub use syscalls::{InProcessSyscalls, Syscalls};
