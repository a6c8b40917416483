// Licensed under the Apache-2.0 license

//! Development RSA-1024 key pair. Integers are little-endian; the public
//! exponent is 65537. Never use these outside of tests and emulation.

pub const DEV_RSA_MODULUS: [u8; 128] = [
    0x83, 0xbc, 0x75, 0x00, 0x4f, 0x96, 0x8b, 0xd1, 0x5e, 0xd9, 0xb3, 0xf4,
    0x8a, 0x98, 0x05, 0x71, 0x8a, 0x53, 0xf1, 0x63, 0x95, 0x8b, 0x26, 0x17,
    0x55, 0x97, 0xb0, 0x0f, 0x33, 0x58, 0xad, 0x69, 0xbc, 0x7d, 0x89, 0xd7,
    0x85, 0xbf, 0xdd, 0x30, 0x14, 0x69, 0x64, 0x23, 0xc8, 0x8e, 0x5f, 0xd1,
    0x33, 0xb5, 0x5d, 0x92, 0xdc, 0xe9, 0x44, 0x1a, 0xf3, 0xd5, 0x3b, 0x52,
    0x65, 0x08, 0xa7, 0xbb, 0xe5, 0x71, 0xdb, 0xfc, 0xdf, 0xde, 0xf1, 0x37,
    0xe8, 0x6f, 0xb2, 0x94, 0x6c, 0x41, 0x5f, 0xbe, 0xbf, 0x2b, 0x4f, 0x46,
    0x0a, 0x39, 0xa2, 0xb2, 0x22, 0x59, 0xfe, 0x4b, 0x82, 0x3f, 0x25, 0x47,
    0x53, 0x33, 0xa9, 0xb5, 0x3b, 0x5a, 0x5d, 0x3f, 0x50, 0x09, 0x0a, 0x38,
    0x0b, 0x3b, 0x37, 0xa2, 0xa0, 0x25, 0x28, 0xfa, 0x07, 0x4b, 0xb8, 0xac,
    0x78, 0xfe, 0xe2, 0xab, 0xcc, 0x08, 0xd7, 0xad,
];

pub const DEV_RSA_PRIVATE_EXPONENT: [u8; 128] = [
    0x69, 0x25, 0xc3, 0xd2, 0x6c, 0xa2, 0x68, 0x23, 0x33, 0xb2, 0x64, 0xd0,
    0xeb, 0x70, 0xc5, 0x0e, 0xe1, 0xa7, 0x02, 0x6f, 0xcf, 0xae, 0xf7, 0xd3,
    0x38, 0x4a, 0xde, 0xac, 0x4d, 0xdd, 0x22, 0x00, 0x0b, 0xc7, 0x4b, 0x71,
    0x0b, 0x40, 0x50, 0x92, 0x9b, 0x89, 0x59, 0xed, 0xa1, 0x62, 0xbe, 0xd4,
    0x81, 0xcd, 0xa4, 0x51, 0x5d, 0x23, 0xcd, 0xd7, 0x00, 0x64, 0x40, 0x5c,
    0xd1, 0x25, 0xc3, 0x94, 0x4a, 0x42, 0x3f, 0x47, 0x53, 0xe7, 0x06, 0x96,
    0x17, 0xf6, 0x31, 0x86, 0xf3, 0xd5, 0x9d, 0xe2, 0x7d, 0xde, 0x54, 0xc8,
    0x50, 0x89, 0x30, 0x9c, 0x8e, 0x57, 0xe7, 0xf1, 0xd8, 0x34, 0x5d, 0x3b,
    0x80, 0xf7, 0x8c, 0xad, 0xbb, 0x73, 0x66, 0x82, 0x81, 0x01, 0x28, 0x58,
    0x23, 0x2e, 0x7d, 0x49, 0xad, 0xa1, 0x2f, 0x67, 0x1e, 0x93, 0x02, 0x3d,
    0xe6, 0x4f, 0x18, 0x29, 0x3a, 0xe3, 0xb4, 0x63,
];

#[cfg(test)]
mod tests {
    use super::*;
    use chaos_emu_crypto::{rsa_modexp, RSA_PUBLIC_EXPONENT};

    #[test]
    fn test_key_pair_round_trips() {
        let msg = [0x5a; 32];
        let sig = rsa_modexp(&DEV_RSA_MODULUS, &DEV_RSA_PRIVATE_EXPONENT, &msg).unwrap();
        let out = rsa_modexp(&DEV_RSA_MODULUS, &RSA_PUBLIC_EXPONENT.to_le_bytes(), &sig).unwrap();
        assert_eq!(&out[..32], &msg);
        assert!(out[32..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_modulus_top_byte_set() {
        assert_ne!(DEV_RSA_MODULUS[DEV_RSA_MODULUS.len() - 1], 0);
    }
}
