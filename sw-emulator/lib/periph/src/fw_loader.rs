/*++

Licensed under the Apache-2.0 license.

File Name:

    fw_loader.rs

Abstract:

    File contains the device side of a firmware load: read the image the
    host placed in DRAM, verify it against the pinned key and install the
    code in the runner.

--*/

use crate::FirmwareRunner;
use chaos_api::{errno, Csr, IrqStatus, VerifyStatus};
use chaos_emu_bus::{Bus, CsrBlock};
use chaos_emu_crypto::{CryptoBackend, RSA_PUBLIC_EXPONENT};
use chaos_error::ChaosResult;
use chaos_image_types::ImageDigest;
use chaos_image_verify::{status_code, ImageVerificationEnv, ImageVerifier};

/// Verification environment backed by the device crypto
pub struct DeviceVerificationEnv<C: CryptoBackend> {
    crypto: C,
    trust_anchor: Vec<u8>,
    exec_capacity: usize,
}

impl<C: CryptoBackend> DeviceVerificationEnv<C> {
    /// # Arguments
    ///
    /// * `crypto` - Crypto backend
    /// * `trust_anchor` - Little-endian modulus every image must embed
    /// * `exec_capacity` - Size of the execution region
    pub fn new(crypto: C, trust_anchor: Vec<u8>, exec_capacity: usize) -> Self {
        Self {
            crypto,
            trust_anchor,
            exec_capacity,
        }
    }
}

impl<C: CryptoBackend> ImageVerificationEnv for DeviceVerificationEnv<C> {
    fn sha256_digest(&self, data: &[u8]) -> ChaosResult<ImageDigest> {
        Ok(self.crypto.sha256(data))
    }

    fn rsa_public_op(&self, modulus: &[u8], signature: &[u8]) -> ChaosResult<Vec<u8>> {
        self.crypto
            .rsa_modexp(modulus, &RSA_PUBLIC_EXPONENT.to_le_bytes(), signature)
    }

    fn trust_anchor(&self) -> &[u8] {
        &self.trust_anchor
    }

    fn exec_capacity(&self) -> usize {
        self.exec_capacity
    }
}

pub struct FirmwareLoader<C: CryptoBackend> {
    verifier: ImageVerifier<DeviceVerificationEnv<C>>,
}

impl<C: CryptoBackend> FirmwareLoader<C> {
    pub fn new(env: DeviceVerificationEnv<C>) -> Self {
        Self {
            verifier: ImageVerifier::new(env),
        }
    }

    /// Process the load the host requested through `load_addr`/`fw_size`.
    ///
    /// Writes the verification status to `load_addr`, clears `fw_size` and
    /// latches [`IrqStatus::FW_LOADED`]. A rejected image leaves the runner
    /// untouched.
    ///
    /// # Returns
    ///
    /// * `i64` - Negative reason code on rejection
    pub fn load<B: Bus>(
        &self,
        csr: &CsrBlock,
        dram: &B,
        runner: &mut dyn FirmwareRunner,
    ) -> Result<(), i64> {
        let result = self.verify_and_install(csr, dram, runner);
        match result {
            Ok(()) => log::info!("firmware loaded"),
            Err(code) => log::warn!("firmware rejected with status {code}"),
        }
        csr.write(Csr::LoadAddr, VerifyStatus::encode(result).0);
        csr.write(Csr::FwSize, 0);
        csr.raise_irq(IrqStatus::FW_LOADED);
        result
    }

    fn verify_and_install<B: Bus>(
        &self,
        csr: &CsrBlock,
        dram: &B,
        runner: &mut dyn FirmwareRunner,
    ) -> Result<(), i64> {
        let load_addr = csr.read(Csr::LoadAddr);
        let fw_size = csr.read(Csr::FwSize);
        let (Ok(offset), Ok(size)) = (usize::try_from(load_addr), usize::try_from(fw_size)) else {
            return Err(-errno::EINVAL);
        };
        if !dram.contains(offset, size) {
            log::warn!("firmware image {load_addr:#x}+{fw_size:#x} is outside of DRAM");
            return Err(-errno::EINVAL);
        }

        let mut image = vec![0u8; size];
        dram.read_bytes(offset, &mut image)
            .map_err(|_| -errno::EINVAL)?;

        let verified = self
            .verifier
            .verify(&image, fw_size)
            .map_err(status_code)?;
        log::debug!(
            "firmware digest {:02x?}, {} code bytes",
            &verified.digest[..8],
            verified.code.len()
        );
        runner.load(verified.code).map_err(|err| {
            log::error!("installing verified firmware failed: {err}");
            -errno::EINVAL
        })
    }
}
