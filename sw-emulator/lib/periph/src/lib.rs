/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the accelerator emulator peripheral library.

--*/

mod config;
mod device;
mod fw_loader;
mod irq;
mod runner;

pub use config::DeviceConfig;
pub use device::ChaosDevice;
pub use fw_loader::{DeviceVerificationEnv, FirmwareLoader};
pub use irq::{IrqHandler, NoIrq};
pub use runner::{FirmwareRunner, InProcessRunner, SandboxRunner};
