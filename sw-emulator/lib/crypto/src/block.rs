/*++

Licensed under the Apache-2.0 license.

File Name:

    block.rs

Abstract:

    File contains the single-block cipher primitives.

--*/

use aes::{Aes128, Aes192, Aes256};
use blowfish::Blowfish;
use chaos_api::Algorithm;
use chaos_error::{ChaosError, ChaosResult};
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, BlockSizeUser, KeyInit};
use twofish::Twofish;

/// Keyed block cipher. AES picks its variant from the key length.
pub enum BlockCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
    Blowfish(Blowfish),
    Twofish(Twofish),
}

fn keyed<C: KeyInit>(key: &[u8]) -> ChaosResult<C> {
    C::new_from_slice(key).map_err(|_| ChaosError::CRYPTO_INVALID_KEY)
}

fn block_mut<C: BlockSizeUser>(block: &mut [u8]) -> ChaosResult<&mut GenericArray<u8, C::BlockSize>> {
    if block.len() != C::block_size() {
        return Err(ChaosError::CRYPTO_INVALID_BLOCK);
    }
    Ok(GenericArray::from_mut_slice(block))
}

impl BlockCipher {
    /// Create a cipher for `algo` keyed with `key`
    ///
    /// # Arguments
    ///
    /// * `algo` - Any block cipher algorithm; direction is chosen per call
    /// * `key` - Key bytes
    pub fn new(algo: Algorithm, key: &[u8]) -> ChaosResult<Self> {
        match algo {
            Algorithm::AesEnc | Algorithm::AesDec => match key.len() {
                16 => Ok(Self::Aes128(keyed(key)?)),
                24 => Ok(Self::Aes192(keyed(key)?)),
                32 => Ok(Self::Aes256(keyed(key)?)),
                _ => Err(ChaosError::CRYPTO_INVALID_KEY),
            },
            Algorithm::BlowfishEnc | Algorithm::BlowfishDec => Ok(Self::Blowfish(keyed(key)?)),
            Algorithm::TwofishEnc | Algorithm::TwofishDec => Ok(Self::Twofish(keyed(key)?)),
            _ => Err(ChaosError::CRYPTO_UNKNOWN_ALGORITHM),
        }
    }

    pub fn block_size(&self) -> usize {
        match self {
            Self::Aes128(_) | Self::Aes192(_) | Self::Aes256(_) => 16,
            Self::Blowfish(_) => 8,
            Self::Twofish(_) => 16,
        }
    }

    /// Encrypt exactly one block in place
    pub fn encrypt_block(&self, block: &mut [u8]) -> ChaosResult<()> {
        match self {
            Self::Aes128(c) => c.encrypt_block(block_mut::<Aes128>(block)?),
            Self::Aes192(c) => c.encrypt_block(block_mut::<Aes192>(block)?),
            Self::Aes256(c) => c.encrypt_block(block_mut::<Aes256>(block)?),
            Self::Blowfish(c) => c.encrypt_block(block_mut::<Blowfish>(block)?),
            Self::Twofish(c) => c.encrypt_block(block_mut::<Twofish>(block)?),
        }
        Ok(())
    }

    /// Decrypt exactly one block in place
    pub fn decrypt_block(&self, block: &mut [u8]) -> ChaosResult<()> {
        match self {
            Self::Aes128(c) => c.decrypt_block(block_mut::<Aes128>(block)?),
            Self::Aes192(c) => c.decrypt_block(block_mut::<Aes192>(block)?),
            Self::Aes256(c) => c.decrypt_block(block_mut::<Aes256>(block)?),
            Self::Blowfish(c) => c.decrypt_block(block_mut::<Blowfish>(block)?),
            Self::Twofish(c) => c.decrypt_block(block_mut::<Twofish>(block)?),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_key_lengths() {
        for len in [16, 24, 32] {
            let cipher = BlockCipher::new(Algorithm::AesEnc, &vec![7u8; len]).unwrap();
            assert_eq!(cipher.block_size(), 16);
        }
        assert!(matches!(
            BlockCipher::new(Algorithm::AesDec, &[0u8; 17]),
            Err(ChaosError::CRYPTO_INVALID_KEY)
        ));
    }

    #[test]
    fn test_wrong_block_length() {
        let cipher = BlockCipher::new(Algorithm::BlowfishEnc, b"blowfish").unwrap();
        let mut block = [0u8; 16];
        assert_eq!(
            cipher.encrypt_block(&mut block),
            Err(ChaosError::CRYPTO_INVALID_BLOCK)
        );
    }

    #[test]
    fn test_round_trips() {
        for (algo, key) in [
            (Algorithm::BlowfishEnc, &b"0123456789abcdef"[..]),
            (Algorithm::TwofishEnc, &[0x42u8; 32][..]),
            (Algorithm::AesEnc, &[0x11u8; 32][..]),
        ] {
            let cipher = BlockCipher::new(algo, key).unwrap();
            let plaintext: Vec<u8> = (0..cipher.block_size() as u8).collect();
            let mut block = plaintext.clone();
            cipher.encrypt_block(&mut block).unwrap();
            assert_ne!(block, plaintext);
            cipher.decrypt_block(&mut block).unwrap();
            assert_eq!(block, plaintext);
        }
    }

    #[test]
    fn test_not_a_block_cipher() {
        assert!(matches!(
            BlockCipher::new(Algorithm::Md5, b""),
            Err(ChaosError::CRYPTO_UNKNOWN_ALGORITHM)
        ));
    }
}
