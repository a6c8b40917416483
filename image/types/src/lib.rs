/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    File contains data structures for the signed firmware image.

    Layout (little-endian, byte packed):

        code_size: u32
        key_size:  u8
        key:       [u8; key_size]
        signature: [u8; key_size]
        code:      [u8; code_size]

--*/

#![cfg_attr(not(feature = "std"), no_std)]

use chaos_error::{ChaosError, ChaosResult};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const SHA256_DIGEST_BYTE_SIZE: usize = 32;
pub const MAX_KEY_BYTE_SIZE: usize = u8::MAX as usize;
pub const IMAGE_PREAMBLE_BYTE_SIZE: usize = core::mem::size_of::<ImagePreamble>();

pub type ImageDigest = [u8; SHA256_DIGEST_BYTE_SIZE];

/// Fixed-size start of every image
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct ImagePreamble {
    pub code_size: U32,
    pub key_size: u8,
}

const _: () = assert!(IMAGE_PREAMBLE_BYTE_SIZE == 5);

impl ImagePreamble {
    /// Full header length: preamble, key and signature
    pub fn header_len(&self) -> usize {
        IMAGE_PREAMBLE_BYTE_SIZE + 2 * self.key_size as usize
    }

    pub fn code_size(&self) -> u32 {
        self.code_size.get()
    }
}

/// Borrowed, layout-checked view of an image
#[derive(Debug, Clone, Copy)]
pub struct FirmwareImage<'a> {
    pub preamble: ImagePreamble,
    pub key: &'a [u8],
    pub signature: &'a [u8],
    pub code: &'a [u8],
}

impl<'a> FirmwareImage<'a> {
    /// Split `bytes` into its fields
    ///
    /// # Arguments
    ///
    /// * `bytes` - Exactly the declared image; trailing bytes are an error
    ///
    /// # Returns
    ///
    /// * `IMAGE_VERIFIER_INVALID_SIZE` - `bytes` is not strictly longer than
    ///   the header, or its length disagrees with the embedded code size
    pub fn parse(bytes: &'a [u8]) -> ChaosResult<Self> {
        let (preamble, rest) = ImagePreamble::read_from_prefix(bytes)
            .map_err(|_| ChaosError::IMAGE_VERIFIER_INVALID_SIZE)?;
        let header_len = preamble.header_len();
        if bytes.len() <= header_len
            || bytes.len() as u64 != header_len as u64 + preamble.code_size() as u64
        {
            return Err(ChaosError::IMAGE_VERIFIER_INVALID_SIZE);
        }
        let key_size = preamble.key_size as usize;
        let (key, rest) = rest.split_at(key_size);
        let (signature, code) = rest.split_at(key_size);
        Ok(Self {
            preamble,
            key,
            signature,
            code,
        })
    }

    pub fn header_len(&self) -> usize {
        self.preamble.header_len()
    }

    pub fn len(&self) -> usize {
        self.header_len() + self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serialize an image
///
/// # Arguments
///
/// * `key` - Embedded public key; at most 255 bytes
/// * `signature` - Signature, same length as `key`
/// * `code` - Executable content
#[cfg(feature = "std")]
pub fn encode_image(key: &[u8], signature: &[u8], code: &[u8]) -> ChaosResult<Vec<u8>> {
    if key.len() > MAX_KEY_BYTE_SIZE || signature.len() != key.len() {
        return Err(ChaosError::IMAGE_VERIFIER_INVALID_SIZE);
    }
    let code_size =
        u32::try_from(code.len()).map_err(|_| ChaosError::IMAGE_VERIFIER_INVALID_SIZE)?;
    let preamble = ImagePreamble {
        code_size: U32::new(code_size),
        key_size: key.len() as u8,
    };
    let mut out = Vec::with_capacity(preamble.header_len() + code.len());
    out.extend_from_slice(preamble.as_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(signature);
    out.extend_from_slice(code);
    Ok(out)
}
