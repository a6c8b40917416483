/*++

Licensed under the Apache-2.0 license.

File Name:

    digest.rs

Abstract:

    File contains the hash primitives.

--*/

use md5::Md5;
use sha2::{Digest, Sha256};

pub const MD5_DIGEST_SIZE: usize = 16;
pub const SHA256_DIGEST_SIZE: usize = 32;

pub fn md5(data: &[u8]) -> [u8; MD5_DIGEST_SIZE] {
    Md5::digest(data).into()
}

pub fn sha256(data: &[u8]) -> [u8; SHA256_DIGEST_SIZE] {
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_md5() {
        assert_eq!(
            hex::encode(md5(b"")),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }
}
