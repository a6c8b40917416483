// Licensed under the Apache-2.0 license

use core::mem::size_of;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const MD5_DIGEST_SIZE: u32 = 16;
pub const AES_BLOCK_SIZE: u32 = 16;
pub const BLOWFISH_BLOCK_SIZE: u32 = 8;
pub const TWOFISH_BLOCK_SIZE: u32 = 16;

/// Default number of slots in each mailbox ring.
pub const DEFAULT_QUEUE_SIZE: u64 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandCode(pub u32);

impl CommandCode {
    pub const REQUEST: Self = Self(0);
}

impl From<CommandCode> for u32 {
    fn from(code: CommandCode) -> Self {
        code.0
    }
}

/// Command ring entry.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout, PartialEq, Eq)]
pub struct MailboxCmd {
    pub seq: u64,
    pub code: u32,
    /// DRAM offset of the payload
    pub dma_addr: u32,
    pub dma_size: u32,
    pub reserved: u32,
}

/// Response ring entry.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout, PartialEq, Eq)]
pub struct MailboxRsp {
    pub seq: u64,
    pub retval: i64,
}

pub const MAILBOX_CMD_SIZE: usize = size_of::<MailboxCmd>();
pub const MAILBOX_RSP_SIZE: usize = size_of::<MailboxRsp>();
const _: () = assert!(MAILBOX_CMD_SIZE == 24);
const _: () = assert!(MAILBOX_RSP_SIZE == 16);

/// Crypto request carried as the payload of a [`CommandCode::REQUEST`].
///
/// Buffer fields are DRAM offsets. `out_size` is replaced with the number of
/// bytes produced once the request completes.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout, PartialEq, Eq)]
pub struct ChaosRequest {
    pub algo: u32,
    pub input: u32,
    pub in_size: u32,
    pub key: u32,
    pub key_size: u32,
    pub output: u32,
    pub out_size: u32,
}

pub const CHAOS_REQUEST_SIZE: usize = size_of::<ChaosRequest>();
const _: () = assert!(CHAOS_REQUEST_SIZE == 28);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Algorithm {
    /// Copies input to output; for testing.
    Echo = 0,
    Md5 = 1,
    AesEnc = 2,
    AesDec = 3,
    Rc4Enc = 4,
    Rc4Dec = 5,
    BlowfishEnc = 6,
    BlowfishDec = 7,
    TwofishEnc = 8,
    TwofishDec = 9,
}

/// How the firmware drives an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    Copy,
    Digest { size: u32 },
    Stream,
    Block { block_size: u32, encrypt: bool },
}

impl Algorithm {
    pub const ALL: [Algorithm; 10] = [
        Algorithm::Echo,
        Algorithm::Md5,
        Algorithm::AesEnc,
        Algorithm::AesDec,
        Algorithm::Rc4Enc,
        Algorithm::Rc4Dec,
        Algorithm::BlowfishEnc,
        Algorithm::BlowfishDec,
        Algorithm::TwofishEnc,
        Algorithm::TwofishDec,
    ];

    pub fn kind(self) -> AlgorithmKind {
        match self {
            Algorithm::Echo => AlgorithmKind::Copy,
            Algorithm::Md5 => AlgorithmKind::Digest {
                size: MD5_DIGEST_SIZE,
            },
            Algorithm::Rc4Enc | Algorithm::Rc4Dec => AlgorithmKind::Stream,
            Algorithm::AesEnc => AlgorithmKind::Block {
                block_size: AES_BLOCK_SIZE,
                encrypt: true,
            },
            Algorithm::AesDec => AlgorithmKind::Block {
                block_size: AES_BLOCK_SIZE,
                encrypt: false,
            },
            Algorithm::BlowfishEnc => AlgorithmKind::Block {
                block_size: BLOWFISH_BLOCK_SIZE,
                encrypt: true,
            },
            Algorithm::BlowfishDec => AlgorithmKind::Block {
                block_size: BLOWFISH_BLOCK_SIZE,
                encrypt: false,
            },
            Algorithm::TwofishEnc => AlgorithmKind::Block {
                block_size: TWOFISH_BLOCK_SIZE,
                encrypt: true,
            },
            Algorithm::TwofishDec => AlgorithmKind::Block {
                block_size: TWOFISH_BLOCK_SIZE,
                encrypt: false,
            },
        }
    }
}

impl Algorithm {
    /// Whether the capability reads the key buffer
    pub fn uses_key(self) -> bool {
        matches!(
            self.kind(),
            AlgorithmKind::Stream | AlgorithmKind::Block { .. }
        )
    }
}

impl TryFrom<u32> for Algorithm {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, u32> {
        Algorithm::ALL
            .iter()
            .copied()
            .find(|algo| *algo as u32 == value)
            .ok_or(value)
    }
}

impl From<Algorithm> for u32 {
    fn from(algo: Algorithm) -> Self {
        algo as u32
    }
}

/// A `(pointer, length)` pair packed into one syscall argument as
/// `addr << 32 | len`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PackedBuf {
    pub addr: u32,
    pub len: u32,
}

impl PackedBuf {
    pub fn new(addr: u32, len: u32) -> Self {
        Self { addr, len }
    }

    pub fn pack(self) -> u64 {
        ((self.addr as u64) << 32) | self.len as u64
    }

    pub fn unpack(raw: u64) -> Self {
        Self {
            addr: (raw >> 32) as u32,
            len: raw as u32,
        }
    }
}
