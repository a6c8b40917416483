/*++

Licensed under the Apache-2.0 license.

File Name:

    rsa.rs

Abstract:

    File contains the raw RSA modular exponentiation used to check firmware
    signatures. Integers are little-endian byte strings.

--*/

use chaos_error::{ChaosError, ChaosResult};
use num_bigint::BigUint;

/// Public exponent used for firmware signatures
pub const RSA_PUBLIC_EXPONENT: u32 = 0x10001;

/// Compute `input ^ exponent mod modulus`
///
/// # Arguments
///
/// * `modulus` - Modulus, little-endian
/// * `exponent` - Exponent, little-endian
/// * `input` - Base, little-endian
///
/// # Returns
///
/// * `Vec<u8>` - Result, little-endian, zero extended to `modulus.len()`
pub fn rsa_modexp(modulus: &[u8], exponent: &[u8], input: &[u8]) -> ChaosResult<Vec<u8>> {
    let n = BigUint::from_bytes_le(modulus);
    if n.bits() == 0 {
        return Err(ChaosError::CRYPTO_RSA_INVALID_MODULUS);
    }
    let e = BigUint::from_bytes_le(exponent);
    let base = BigUint::from_bytes_le(input);
    let mut out = base.modpow(&e, &n).to_bytes_le();
    // to_bytes_le() yields [0] for zero and never more bytes than the modulus
    out.resize(modulus.len().max(out.len()), 0);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_modulus() {
        // 4^13 mod 497 = 445
        let out = rsa_modexp(&497u16.to_le_bytes(), &[13], &[4]).unwrap();
        assert_eq!(out, 445u16.to_le_bytes());
    }

    #[test]
    fn test_zero_extended() {
        let out = rsa_modexp(&[0xfb, 0, 0, 0x80], &[3], &[2]).unwrap();
        assert_eq!(out, [8, 0, 0, 0]);
    }

    #[test]
    fn test_zero_modulus() {
        assert_eq!(
            rsa_modexp(&[0, 0], &[3], &[2]),
            Err(ChaosError::CRYPTO_RSA_INVALID_MODULUS)
        );
    }
}
