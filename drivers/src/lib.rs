/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the accelerator host driver library.

--*/

mod client;
mod dram;
mod driver;
mod mailbox;

pub use client::{Client, MappedBuffer};
pub use dram::{DramPool, Resource, DRAM_GRANULE};
pub use driver::{ChaosDriver, DriverConfig};
pub use mailbox::Mailbox;
