/*++

Licensed under the Apache-2.0 license.

File Name:

    sandbox.rs

Abstract:

    File contains the mediation loop that services the firmware's syscalls.

--*/

use crate::{Buffer, CryptoCall, Inferior, SandboxCall, Stop};
use chaos_api::errno;
use chaos_api::Algorithm;
use chaos_emu_crypto::CryptoBackend;
use chaos_error::ChaosError;

/// Why a run cycle did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Firmware called exit with a non-zero code
    ExitCode(i64),

    /// Firmware issued a syscall outside the allow-list
    Violation(u64),

    /// Firmware faulted or was killed
    Crashed(Stop),

    /// Controlling the child failed
    Platform(ChaosError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    Failed(FailureReason),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed)
    }
}

/// Sandbox executor
pub struct Sandbox<B: CryptoBackend> {
    backend: B,
}

impl<B: CryptoBackend> Sandbox<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Drive `inferior` until it exits or misbehaves
    pub fn run<I: Inferior + ?Sized>(&self, inferior: &mut I) -> CycleOutcome {
        loop {
            let stop = match inferior.resume_until_syscall() {
                Ok(stop) => stop,
                Err(err) => {
                    log::error!("resuming firmware failed: {err}");
                    return CycleOutcome::Failed(FailureReason::Platform(err));
                }
            };

            let info = match stop {
                Stop::Syscall(info) => info,
                Stop::Exited(0) => return CycleOutcome::Completed,
                Stop::Exited(code) => {
                    return CycleOutcome::Failed(FailureReason::ExitCode(code as i64))
                }
                Stop::Signaled(_) | Stop::Stopped(_) => {
                    log::warn!("firmware crashed: {stop:?}");
                    return CycleOutcome::Failed(FailureReason::Crashed(stop));
                }
            };

            match SandboxCall::decode(&info) {
                SandboxCall::Crypto(call) => {
                    let ret = self.handle_crypto(inferior, &call);
                    log::debug!("crypto call algo {} returned {ret}", call.algo);
                    if let Err(err) = inferior.set_syscall_return(ret) {
                        log::error!("setting syscall return failed: {err}");
                        return CycleOutcome::Failed(FailureReason::Platform(err));
                    }
                }
                SandboxCall::Exit(0) => {
                    log::debug!("firmware exited");
                    return CycleOutcome::Completed;
                }
                SandboxCall::Exit(code) => {
                    log::info!("firmware exited with {code}");
                    return CycleOutcome::Failed(FailureReason::ExitCode(code));
                }
                SandboxCall::Violation(nr) => {
                    log::warn!("firmware issued forbidden syscall {nr}");
                    return CycleOutcome::Failed(FailureReason::Violation(nr));
                }
            }
        }
    }

    fn handle_crypto<I: Inferior + ?Sized>(&self, inferior: &mut I, call: &CryptoCall) -> i64 {
        let Some(algo) = u32::try_from(call.algo)
            .ok()
            .and_then(|algo| Algorithm::try_from(algo).ok())
        else {
            return -errno::ENOSYS;
        };

        let Ok(input) =
            Buffer::from_inferior(inferior, call.input.addr as u64, call.input.len as usize)
        else {
            return -errno::EFAULT;
        };
        let key = if algo.uses_key() {
            match Buffer::from_inferior(inferior, call.key.addr as u64, call.key.len as usize) {
                Ok(key) => Some(key),
                Err(_) => return -errno::EFAULT,
            }
        } else {
            None
        };

        let key: &[u8] = match &key {
            Some(key) => key.as_slice(),
            None => &[],
        };
        let out = match self.backend.transform(algo, input.as_slice(), key) {
            Ok(out) => out,
            Err(err) => {
                log::debug!("{algo:?} rejected its arguments: {err}");
                return -errno::EINVAL;
            }
        };
        if out.len() > call.output.len as usize {
            return -errno::EOVERFLOW;
        }
        let written = Buffer::from_slice(&out)
            .and_then(|out| out.to_inferior(inferior, call.output.addr as u64));
        if written.is_err() {
            return -errno::EFAULT;
        }
        out.len() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyscallInfo;
    use chaos_api::syscall::{SYS_CHAOS_CRYPTO, SYS_EXIT};
    use chaos_api::PackedBuf;
    use chaos_emu_crypto::SoftCrypto;
    use chaos_error::ChaosResult;
    use std::collections::VecDeque;

    const MEM_BASE: u64 = 0x1000_0000;

    /// Scripted child with a flat memory window
    struct MockInferior {
        stops: VecDeque<ChaosResult<Stop>>,
        mem: Vec<u8>,
        returns: Vec<i64>,
    }

    impl MockInferior {
        fn new(stops: Vec<ChaosResult<Stop>>) -> Self {
            Self {
                stops: stops.into(),
                mem: vec![0; 0x1000],
                returns: Vec::new(),
            }
        }

        fn range(&self, addr: u64, len: usize) -> ChaosResult<core::ops::Range<usize>> {
            let start = addr
                .checked_sub(MEM_BASE)
                .ok_or(ChaosError::SANDBOX_TRANSFER_FAULT)? as usize;
            let end = start + len;
            if end > self.mem.len() {
                return Err(ChaosError::SANDBOX_TRANSFER_FAULT);
            }
            Ok(start..end)
        }
    }

    impl Inferior for MockInferior {
        fn resume_until_syscall(&mut self) -> ChaosResult<Stop> {
            self.stops
                .pop_front()
                .unwrap_or(Err(ChaosError::SANDBOX_RESUME_FAILED))
        }

        fn read_memory(&mut self, addr: u64, buf: &mut [u8]) -> ChaosResult<()> {
            let range = self.range(addr, buf.len())?;
            buf.copy_from_slice(&self.mem[range]);
            Ok(())
        }

        fn write_memory(&mut self, addr: u64, data: &[u8]) -> ChaosResult<()> {
            let range = self.range(addr, data.len())?;
            self.mem[range].copy_from_slice(data);
            Ok(())
        }

        fn set_syscall_return(&mut self, val: i64) -> ChaosResult<()> {
            self.returns.push(val);
            Ok(())
        }
    }

    fn crypto(algo: Algorithm, input: PackedBuf, key: PackedBuf, output: PackedBuf) -> Stop {
        Stop::Syscall(SyscallInfo {
            nr: SYS_CHAOS_CRYPTO,
            args: [algo as u64, input.pack(), key.pack(), output.pack(), 0, 0],
        })
    }

    fn exit(code: u64) -> Stop {
        Stop::Syscall(SyscallInfo {
            nr: SYS_EXIT,
            args: [code, 0, 0, 0, 0, 0],
        })
    }

    fn buf(offset: u32, len: u32) -> PackedBuf {
        PackedBuf::new(MEM_BASE as u32 + offset, len)
    }

    #[test]
    fn test_aes_block_through_mediation() {
        let mut child = MockInferior::new(vec![
            Ok(crypto(Algorithm::AesEnc, buf(0, 16), buf(0x100, 16), buf(0x200, 16))),
            Ok(exit(0)),
        ]);
        let plain: Vec<u8> = (0..16).map(|i| i * 2).collect();
        let key: Vec<u8> = (0..16).collect();
        child.mem[..16].copy_from_slice(&plain);
        child.mem[0x100..0x110].copy_from_slice(&key);

        assert_eq!(Sandbox::new(SoftCrypto).run(&mut child), CycleOutcome::Completed);
        assert_eq!(child.returns, [16]);
        assert_eq!(
            hex::encode(&child.mem[0x200..0x210]),
            "ba8c2bb6a178805d061260196db96eaa"
        );
    }

    #[test]
    fn test_crypto_error_codes() {
        let mut child = MockInferior::new(vec![
            // Unknown algorithm
            Ok(Stop::Syscall(SyscallInfo {
                nr: SYS_CHAOS_CRYPTO,
                args: [77, buf(0, 16).pack(), 0, buf(0x200, 16).pack(), 0, 0],
            })),
            // Input outside of the child memory
            Ok(crypto(
                Algorithm::Md5,
                PackedBuf::new(0x10, 4),
                PackedBuf::default(),
                buf(0x200, 16),
            )),
            // Zero-length input
            Ok(crypto(Algorithm::Md5, buf(0, 0), PackedBuf::default(), buf(0x200, 16))),
            // Digest larger than the output
            Ok(crypto(Algorithm::Md5, buf(0, 4), PackedBuf::default(), buf(0x200, 8))),
            // Bad key length
            Ok(crypto(Algorithm::AesEnc, buf(0, 16), buf(0x100, 5), buf(0x200, 16))),
            // Output outside of the child memory
            Ok(crypto(Algorithm::Md5, buf(0, 4), PackedBuf::default(), buf(0xff8, 16))),
            // Digest without a key buffer
            Ok(crypto(Algorithm::Md5, buf(0, 3), PackedBuf::default(), buf(0x200, 16))),
            Ok(exit(0)),
        ]);
        child.mem[..3].copy_from_slice(b"abc");

        assert_eq!(Sandbox::new(SoftCrypto).run(&mut child), CycleOutcome::Completed);
        assert_eq!(
            child.returns,
            [
                -errno::ENOSYS,
                -errno::EFAULT,
                -errno::EFAULT,
                -errno::EOVERFLOW,
                -errno::EINVAL,
                -errno::EFAULT,
                16
            ]
        );
        assert_eq!(
            hex::encode(&child.mem[0x200..0x210]),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_exit_codes() {
        let mut child = MockInferior::new(vec![Ok(exit(2))]);
        assert_eq!(
            Sandbox::new(SoftCrypto).run(&mut child),
            CycleOutcome::Failed(FailureReason::ExitCode(2))
        );

        let mut child = MockInferior::new(vec![Ok(Stop::Exited(0))]);
        assert!(Sandbox::new(SoftCrypto).run(&mut child).is_completed());
    }

    #[test]
    fn test_violation() {
        let mut child = MockInferior::new(vec![
            Ok(crypto(Algorithm::Md5, buf(0, 3), PackedBuf::default(), buf(0x200, 16))),
            Ok(Stop::Syscall(SyscallInfo {
                nr: 39,
                ..Default::default()
            })),
            Ok(exit(0)),
        ]);
        assert_eq!(
            Sandbox::new(SoftCrypto).run(&mut child),
            CycleOutcome::Failed(FailureReason::Violation(39))
        );
        // Nothing after the violation is serviced
        assert_eq!(child.returns.len(), 1);
        assert_eq!(child.stops.len(), 1);
    }

    #[test]
    fn test_crash_and_platform_errors() {
        let mut child = MockInferior::new(vec![Ok(Stop::Stopped(libc::SIGILL))]);
        assert_eq!(
            Sandbox::new(SoftCrypto).run(&mut child),
            CycleOutcome::Failed(FailureReason::Crashed(Stop::Stopped(libc::SIGILL)))
        );

        let mut child = MockInferior::new(vec![Ok(Stop::Signaled(libc::SIGKILL))]);
        assert!(matches!(
            Sandbox::new(SoftCrypto).run(&mut child),
            CycleOutcome::Failed(FailureReason::Crashed(_))
        ));

        let mut child = MockInferior::new(vec![Err(ChaosError::SANDBOX_WAIT_FAILED)]);
        assert_eq!(
            Sandbox::new(SoftCrypto).run(&mut child),
            CycleOutcome::Failed(FailureReason::Platform(ChaosError::SANDBOX_WAIT_FAILED))
        );
    }
}
