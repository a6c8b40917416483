/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the accelerator emulator bus library.

--*/
mod bus;
mod csr;
mod event;
mod resources;
mod shared;

pub use crate::bus::{Bus, BusError};
pub use crate::csr::CsrBlock;
pub use crate::event::Event;
pub use crate::resources::DeviceResources;
pub use crate::shared::{MemoryView, SharedMemory};
