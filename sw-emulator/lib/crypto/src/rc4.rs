/*++

Licensed under the Apache-2.0 license.

File Name:

    rc4.rs

Abstract:

    File contains implementation of the RC4 stream cipher. Key lengths are
    only known at run time, so this does not go through the typenum-keyed
    RustCrypto cipher traits.

--*/

use chaos_error::{ChaosError, ChaosResult};

pub struct Rc4 {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    /// Run the key schedule
    ///
    /// # Arguments
    ///
    /// * `key` - 1 to 256 key bytes
    pub fn new(key: &[u8]) -> ChaosResult<Self> {
        if key.is_empty() || key.len() > 256 {
            return Err(ChaosError::CRYPTO_INVALID_KEY);
        }
        let mut state = [0u8; 256];
        for (i, s) in state.iter_mut().enumerate() {
            *s = i as u8;
        }
        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }
        Ok(Self { state, i: 0, j: 0 })
    }

    /// XOR the keystream into `data`; encryption and decryption are the same
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.state[self.i as usize]);
            self.state.swap(self.i as usize, self.j as usize);
            let idx = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
            *byte ^= self.state[idx as usize];
        }
    }
}
