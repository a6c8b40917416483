// Licensed under the Apache-2.0 license

#![cfg_attr(not(test), no_std)]

pub mod csr;

pub mod errno;

pub mod mailbox;

pub mod ring;

pub mod syscall;

pub use chaos_error as error;

pub use csr::{Csr, Csrs, IrqStatus, VerifyStatus};

pub use mailbox::{
    Algorithm, AlgorithmKind, ChaosRequest, CommandCode, MailboxCmd, MailboxRsp, PackedBuf,
};

pub use ring::RingGeometry;

use chaos_error::ChaosError;
use core::fmt;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChaosApiError {
    /// The command ring already holds as many commands as it has slots.
    MailboxBusy,
    /// No response arrived within the request timeout.
    MailboxTimeout,
    /// The waiter's side-table slot was completed by a different request.
    MailboxSequenceMismatch {
        expected: u64,
        actual: u64,
    },
    /// The firmware completed the request with a negative errno.
    FirmwareFailure(i64),
    /// A host-side driver operation failed before anything reached the device.
    Driver(ChaosError),
}

impl From<ChaosError> for ChaosApiError {
    fn from(err: ChaosError) -> Self {
        ChaosApiError::Driver(err)
    }
}

impl fmt::Display for ChaosApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChaosApiError::MailboxBusy => write!(f, "command queue is full"),
            ChaosApiError::MailboxTimeout => write!(f, "timed out waiting for a response"),
            ChaosApiError::MailboxSequenceMismatch { expected, actual } => write!(
                f,
                "response slot carries sequence {actual}, expected {expected}"
            ),
            ChaosApiError::FirmwareFailure(code) => {
                write!(f, "firmware reported error {code}")
            }
            ChaosApiError::Driver(err) => write!(f, "driver error {err}"),
        }
    }
}
