/*++

Licensed under the Apache-2.0 license.

File Name:

    dispatcher.rs

Abstract:

    File contains the request dispatcher: command validation, DRAM buffer
    resolution and CBC chaining over the block primitives.

--*/

use crate::Syscalls;
use chaos_api::errno;
use chaos_api::mailbox::CHAOS_REQUEST_SIZE;
use chaos_api::{Algorithm, AlgorithmKind, ChaosRequest, CommandCode, MailboxCmd, PackedBuf};
use chaos_emu_bus::{Bus, BusError};
use chaos_error::ChaosError;

const MAX_BLOCK_SIZE: usize = 16;
const COPY_CHUNK: usize = 64;

/// Unrecoverable command error; the firmware exits without responding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fatal(pub ChaosError);

impl From<BusError> for Fatal {
    fn from(err: BusError) -> Self {
        Fatal(err.into())
    }
}

impl From<ChaosError> for Fatal {
    fn from(err: ChaosError) -> Self {
        Fatal(err)
    }
}

/// A bounds-checked DRAM range
#[derive(Debug, Clone, Copy)]
struct DramBuffer {
    offset: usize,
    size: usize,
}

impl DramBuffer {
    fn sub(&self, start: usize, len: usize) -> DramBuffer {
        DramBuffer {
            offset: self.offset + start,
            size: len,
        }
    }
}

/// Request Dispatcher
pub struct Dispatcher<S: Syscalls, B: Bus> {
    syscalls: S,
    dram: B,
    dram_base: usize,
}

impl<S: Syscalls, B: Bus> Dispatcher<S, B> {
    /// Create an instance
    ///
    /// # Arguments
    ///
    /// * `syscalls` - Capability provider
    /// * `dram` - DRAM region
    /// * `dram_base` - Address of DRAM offset 0 as passed to the capability
    pub fn new(syscalls: S, dram: B, dram_base: usize) -> Self {
        Self {
            syscalls,
            dram,
            dram_base,
        }
    }

    pub fn dram(&self) -> &B {
        &self.dram
    }

    /// Execute one command
    ///
    /// # Returns
    ///
    /// * `i64` - Response value: bytes produced or a negative errno
    /// * `Fatal` - The command is malformed or names buffers outside DRAM
    pub fn handle_command(&self, cmd: &MailboxCmd) -> Result<i64, Fatal> {
        if CommandCode(cmd.code) != CommandCode::REQUEST {
            return Err(Fatal(ChaosError::FIRMWARE_INVALID_COMMAND));
        }
        self.handle_request(cmd)
    }

    fn handle_request(&self, cmd: &MailboxCmd) -> Result<i64, Fatal> {
        if cmd.dma_size as usize != CHAOS_REQUEST_SIZE {
            return Err(Fatal(ChaosError::FIRMWARE_INVALID_COMMAND));
        }
        let dma = self.resolve(cmd.dma_addr, cmd.dma_size)?;
        let req: ChaosRequest = self.dram.read_obj(dma.offset)?;

        let input = self.resolve(req.input, req.in_size)?;
        let key = self.resolve(req.key, req.key_size)?;
        let output = self.resolve(req.output, req.out_size)?;

        let algo = Algorithm::try_from(req.algo)
            .map_err(|_| Fatal(ChaosError::FIRMWARE_UNKNOWN_ALGORITHM))?;

        match algo.kind() {
            AlgorithmKind::Copy => {
                if output.size < input.size {
                    return Ok(-errno::EOVERFLOW);
                }
                self.copy(&input, &output)?;
                Ok(input.size as i64)
            }
            AlgorithmKind::Digest { size } => {
                if output.size < size as usize {
                    return Ok(-errno::EOVERFLOW);
                }
                self.crypto(algo, &input, &key, &output)
            }
            AlgorithmKind::Stream => {
                if output.size < input.size {
                    return Ok(-errno::EOVERFLOW);
                }
                self.crypto(algo, &input, &key, &output)
            }
            AlgorithmKind::Block {
                block_size,
                encrypt,
            } => {
                if output.size < input.size {
                    return Ok(-errno::EOVERFLOW);
                }
                if input.size % block_size as usize != 0 {
                    return Ok(-errno::EINVAL);
                }
                if encrypt {
                    self.cbc_encrypt(algo, &input, &key, &output, block_size as usize)
                } else {
                    self.cbc_decrypt(algo, &input, &key, &output, block_size as usize)
                }
            }
        }
    }

    /// Check `offset..offset + size` lies inside DRAM
    fn resolve(&self, offset: u32, size: u32) -> Result<DramBuffer, Fatal> {
        let dram_size = self.dram.len() as u64;
        let (offset, size) = (offset as u64, size as u64);
        if size > dram_size || offset + size > dram_size {
            return Err(Fatal(ChaosError::FIRMWARE_BUFFER_OUT_OF_BOUNDS));
        }
        Ok(DramBuffer {
            offset: offset as usize,
            size: size as usize,
        })
    }

    fn pack(&self, buf: &DramBuffer) -> Result<PackedBuf, Fatal> {
        let addr = self
            .dram_base
            .checked_add(buf.offset)
            .and_then(|addr| u32::try_from(addr).ok())
            .ok_or(Fatal(ChaosError::FIRMWARE_BUFFER_OUT_OF_BOUNDS))?;
        Ok(PackedBuf::new(addr, buf.size as u32))
    }

    fn crypto(
        &self,
        algo: Algorithm,
        input: &DramBuffer,
        key: &DramBuffer,
        output: &DramBuffer,
    ) -> Result<i64, Fatal> {
        Ok(self.syscalls.crypto(
            algo.into(),
            self.pack(input)?,
            self.pack(key)?,
            self.pack(output)?,
        ))
    }

    /// Overlap-safe copy through a stack chunk
    fn copy(&self, src: &DramBuffer, dst: &DramBuffer) -> Result<(), Fatal> {
        let mut chunk = [0u8; COPY_CHUNK];
        let len = src.size;
        let backwards = dst.offset > src.offset;
        let mut done = 0;
        while done < len {
            let n = COPY_CHUNK.min(len - done);
            let at = if backwards { len - done - n } else { done };
            self.dram.read_bytes(src.offset + at, &mut chunk[..n])?;
            self.dram.write_bytes(dst.offset + at, &chunk[..n])?;
            done += n;
        }
        Ok(())
    }

    /// Each input block is XORed in place with the previous output block
    /// before it is encrypted. The first block uses a zero IV.
    fn cbc_encrypt(
        &self,
        algo: Algorithm,
        input: &DramBuffer,
        key: &DramBuffer,
        output: &DramBuffer,
        block_size: usize,
    ) -> Result<i64, Fatal> {
        let mut chain = [0u8; MAX_BLOCK_SIZE];
        let mut block = [0u8; MAX_BLOCK_SIZE];
        let (chain, block) = (&mut chain[..block_size], &mut block[..block_size]);
        let mut total = 0;

        for start in (0..input.size).step_by(block_size) {
            let in_block = input.sub(start, block_size);
            let out_block = output.sub(start, block_size);
            if start != 0 {
                self.dram.read_bytes(in_block.offset, block)?;
                xor(block, chain);
                self.dram.write_bytes(in_block.offset, block)?;
            }
            let ret = self.crypto(algo, &in_block, key, &out_block)?;
            if ret < 0 {
                return Ok(ret);
            }
            self.dram.read_bytes(out_block.offset, chain)?;
            total += ret;
        }
        Ok(total)
    }

    /// Each block is decrypted, then XORed with the previous ciphertext
    /// block, saved before the call so in-place buffers work.
    fn cbc_decrypt(
        &self,
        algo: Algorithm,
        input: &DramBuffer,
        key: &DramBuffer,
        output: &DramBuffer,
        block_size: usize,
    ) -> Result<i64, Fatal> {
        let mut chain = [0u8; MAX_BLOCK_SIZE];
        let mut cipher = [0u8; MAX_BLOCK_SIZE];
        let mut plain = [0u8; MAX_BLOCK_SIZE];
        let chain = &mut chain[..block_size];
        let cipher = &mut cipher[..block_size];
        let plain = &mut plain[..block_size];
        let mut total = 0;

        for start in (0..input.size).step_by(block_size) {
            let in_block = input.sub(start, block_size);
            let out_block = output.sub(start, block_size);
            self.dram.read_bytes(in_block.offset, cipher)?;
            let ret = self.crypto(algo, &in_block, key, &out_block)?;
            if ret < 0 {
                return Ok(ret);
            }
            self.dram.read_bytes(out_block.offset, plain)?;
            xor(plain, chain);
            self.dram.write_bytes(out_block.offset, plain)?;
            chain.copy_from_slice(cipher);
            total += ret;
        }
        Ok(total)
    }
}

fn xor(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}
