// Licensed under the Apache-2.0 license

use chaos_api::IrqStatus;

/// Interrupt line from the device to the host driver.
///
/// Called on the device thread after the cause is latched in `irq_status`.
pub trait IrqHandler: Send + Sync {
    fn handle_irq(&self, irq: IrqStatus);
}

impl<F: Fn(IrqStatus) + Send + Sync> IrqHandler for F {
    fn handle_irq(&self, irq: IrqStatus) {
        self(irq)
    }
}

/// Handler that drops every interrupt
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIrq;

impl IrqHandler for NoIrq {
    fn handle_irq(&self, _irq: IrqStatus) {}
}
