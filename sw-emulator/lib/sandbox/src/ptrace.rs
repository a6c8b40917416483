/*++

Licensed under the Apache-2.0 license.

File Name:

    ptrace.rs

Abstract:

    File contains the Linux x86-64 child context: fork, seccomp allow-list,
    ptrace attachment and syscall emulation.

    The child installs a filter that only permits the crypto call and exit,
    then spins without issuing syscalls until the parent takes control. The
    parent resumes it with PTRACE_SYSEMU, so the kernel never executes a
    firmware syscall; every one of them is decoded by the mediation loop.

--*/

use crate::{ExecRegion, Inferior, Sandbox, StackRegion, Stop, SyscallInfo};
use crate::{CycleOutcome, FailureReason};
use chaos_api::syscall::{SYS_CHAOS_CRYPTO, SYS_EXIT, SYS_EXIT_GROUP};
use chaos_emu_bus::SharedMemory;
use chaos_emu_crypto::CryptoBackend;
use chaos_error::{ChaosError, ChaosResult};
use core::sync::atomic::Ordering;
use std::io;
use std::mem::size_of;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const WORD: u64 = size_of::<libc::c_long>() as u64;
const ARM_TIMEOUT: Duration = Duration::from_secs(1);
const ARMED: u64 = 1;

// Classic BPF encoding, linux/filter.h
const BPF_LD: u16 = 0x00;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;

// linux/seccomp.h and linux/audit.h
const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;
const AUDIT_ARCH_X86_64: u32 = 0xc000_003e;
const SECCOMP_DATA_NR: u32 = 0;
const SECCOMP_DATA_ARCH: u32 = 4;

const fn stmt(code: u16, k: u32) -> libc::sock_filter {
    libc::sock_filter {
        code,
        jt: 0,
        jf: 0,
        k,
    }
}

const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> libc::sock_filter {
    libc::sock_filter { code, jt, jf, k }
}

/// Allow-list: crypto call, exit and exit_group on x86-64; kill otherwise
fn seccomp_filter() -> [libc::sock_filter; 9] {
    [
        stmt(BPF_LD | BPF_W | BPF_ABS, SECCOMP_DATA_ARCH),
        jump(BPF_JMP | BPF_JEQ | BPF_K, AUDIT_ARCH_X86_64, 1, 0),
        stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS),
        stmt(BPF_LD | BPF_W | BPF_ABS, SECCOMP_DATA_NR),
        jump(BPF_JMP | BPF_JEQ | BPF_K, SYS_CHAOS_CRYPTO as u32, 3, 0),
        jump(BPF_JMP | BPF_JEQ | BPF_K, SYS_EXIT as u32, 2, 0),
        jump(BPF_JMP | BPF_JEQ | BPF_K, SYS_EXIT_GROUP as u32, 1, 0),
        stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS),
        stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW),
    ]
}

/// Child side after fork. Only async-signal-safe calls; never returns.
///
/// # Safety
///
/// Must only be called in a freshly forked child.
unsafe fn child_main(filter: &libc::sock_fprog, armed: &SharedMemory) -> ! {
    if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) != 0
        || libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) != 0
        || libc::prctl(
            libc::PR_SET_SECCOMP,
            libc::SECCOMP_MODE_FILTER,
            filter as *const libc::sock_fprog,
        ) != 0
    {
        libc::_exit(127);
    }
    // From here on any syscall outside the allow-list kills the child.
    let _ = armed.view().store_u64(0, ARMED, Ordering::Release);
    loop {
        core::hint::spin_loop();
    }
}

fn last_error() -> io::Error {
    io::Error::last_os_error()
}

/// Kills the child if it does not finish in time. Disarmed before the child
/// is reaped, so the signal never reaches a recycled pid.
struct Watchdog {
    armed: Arc<Mutex<bool>>,
    cancel: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Watchdog {
    fn spawn(pid: libc::pid_t, timeout: Duration) -> ChaosResult<Self> {
        let (cancel, rx) = mpsc::channel::<()>();
        let armed = Arc::new(Mutex::new(true));
        let thread_armed = armed.clone();
        let handle = thread::Builder::new()
            .name("chaos-watchdog".into())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(timeout) {
                    let armed = thread_armed.lock().unwrap_or_else(|e| e.into_inner());
                    if *armed {
                        log::warn!("firmware {pid} exceeded {timeout:?}, killing it");
                        // SAFETY: plain signal delivery to a child not yet reaped.
                        unsafe {
                            libc::kill(pid, libc::SIGKILL);
                        }
                    }
                }
            })
            .map_err(|_| ChaosError::DEVICE_THREAD_SPAWN_FAILED)?;
        Ok(Self {
            armed,
            cancel,
            handle,
        })
    }

    fn stop(self) {
        *self.armed.lock().unwrap_or_else(|e| e.into_inner()) = false;
        let _ = self.cancel.send(());
        let _ = self.handle.join();
    }
}

/// Forked child controlled through ptrace
pub struct PtraceInferior {
    pid: libc::pid_t,
    reaped: bool,
    watchdog: Option<Watchdog>,
}

impl PtraceInferior {
    /// Fork a sandboxed child and point it at `entry`
    ///
    /// # Arguments
    ///
    /// * `entry` - Address the child starts executing at
    /// * `stack_top` - Initial stack pointer, 16-byte aligned
    /// * `deadline` - Optional limit on the child's lifetime
    pub fn spawn(entry: u64, stack_top: u64, deadline: Option<Duration>) -> ChaosResult<Self> {
        let filter = seccomp_filter();
        let prog = libc::sock_fprog {
            len: filter.len() as libc::c_ushort,
            filter: filter.as_ptr() as *mut libc::sock_filter,
        };
        let armed = SharedMemory::new(WORD as usize)?;

        // SAFETY: the child only runs `child_main`, which performs no
        // allocation and never returns.
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            log::error!("fork failed: {}", last_error());
            return Err(ChaosError::SANDBOX_FORK_FAILED);
        }
        if pid == 0 {
            unsafe { child_main(&prog, &armed) }
        }

        let mut inferior = Self {
            pid,
            reaped: false,
            watchdog: None,
        };
        inferior.attach(&armed)?;
        inferior.set_context(entry, stack_top)?;
        if let Some(timeout) = deadline {
            inferior.watchdog = Some(Watchdog::spawn(pid, timeout)?);
        }
        log::debug!("sandbox child {pid} ready at {entry:#x}");
        Ok(inferior)
    }

    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    fn attach(&mut self, armed: &SharedMemory) -> ChaosResult<()> {
        let options = libc::PTRACE_O_EXITKILL | libc::PTRACE_O_TRACESYSGOOD;
        // SAFETY: ptrace on our own child.
        let ret = unsafe {
            libc::ptrace(
                libc::PTRACE_SEIZE,
                self.pid,
                core::ptr::null_mut::<libc::c_void>(),
                options as usize as *mut libc::c_void,
            )
        };
        if ret < 0 {
            log::error!("PTRACE_SEIZE of {} failed: {}", self.pid, last_error());
            return Err(ChaosError::SANDBOX_ATTACH_FAILED);
        }

        let start = Instant::now();
        while armed.view().load_u64(0, Ordering::Acquire) != Ok(ARMED) {
            if start.elapsed() > ARM_TIMEOUT || self.try_reap() {
                log::error!("sandbox child {} never armed its filter", self.pid);
                return Err(ChaosError::SANDBOX_ARM_TIMEOUT);
            }
            thread::sleep(Duration::from_micros(100));
        }

        // SAFETY: the child is seized.
        let ret = unsafe {
            libc::ptrace(
                libc::PTRACE_INTERRUPT,
                self.pid,
                core::ptr::null_mut::<libc::c_void>(),
                core::ptr::null_mut::<libc::c_void>(),
            )
        };
        if ret < 0 {
            log::error!("PTRACE_INTERRUPT of {} failed: {}", self.pid, last_error());
            return Err(ChaosError::SANDBOX_ATTACH_FAILED);
        }
        let status = self.wait()?;
        if !libc::WIFSTOPPED(status) {
            self.reaped = true;
            return Err(ChaosError::SANDBOX_ATTACH_FAILED);
        }
        Ok(())
    }

    fn set_context(&mut self, entry: u64, stack_top: u64) -> ChaosResult<()> {
        let mut regs = self.get_regs()?;
        regs.rip = entry;
        regs.rsp = stack_top;
        regs.rax = 0;
        // Not inside a syscall; keeps the kernel from restarting one.
        regs.orig_rax = u64::MAX;
        self.set_regs(&regs)
    }

    /// Non-blocking check whether the child is already gone
    fn try_reap(&mut self) -> bool {
        let mut status = 0;
        // SAFETY: waiting on our own child.
        let ret = unsafe { libc::waitpid(self.pid, &mut status, libc::WNOHANG | libc::__WALL) };
        if ret == self.pid && (libc::WIFEXITED(status) || libc::WIFSIGNALED(status)) {
            self.reaped = true;
        }
        self.reaped
    }

    /// Blocks until the child has a status to report and returns true if
    /// that status is termination. The status stays pending.
    fn peek_exit(&self) -> ChaosResult<bool> {
        loop {
            // SAFETY: siginfo_t is plain old data.
            let mut info: libc::siginfo_t = unsafe { core::mem::zeroed() };
            // SAFETY: waiting on our own child; info is a valid out pointer.
            let ret = unsafe {
                libc::waitid(
                    libc::P_PID,
                    self.pid as libc::id_t,
                    &mut info,
                    libc::WEXITED | libc::WSTOPPED | libc::WNOWAIT | libc::__WALL,
                )
            };
            if ret == 0 {
                return Ok(matches!(
                    info.si_code,
                    libc::CLD_EXITED | libc::CLD_KILLED | libc::CLD_DUMPED
                ));
            }
            let err = last_error();
            if err.kind() != io::ErrorKind::Interrupted {
                log::error!("waitid({}) failed: {err}", self.pid);
                return Err(ChaosError::SANDBOX_WAIT_FAILED);
            }
        }
    }

    fn wait(&mut self) -> ChaosResult<libc::c_int> {
        if self.watchdog.is_some() && self.peek_exit()? {
            if let Some(watchdog) = self.watchdog.take() {
                watchdog.stop();
            }
        }
        loop {
            let mut status = 0;
            // SAFETY: waiting on our own child.
            let ret = unsafe { libc::waitpid(self.pid, &mut status, libc::__WALL) };
            if ret == self.pid {
                return Ok(status);
            }
            let err = last_error();
            if err.kind() != io::ErrorKind::Interrupted {
                log::error!("waitpid({}) failed: {err}", self.pid);
                return Err(ChaosError::SANDBOX_WAIT_FAILED);
            }
        }
    }

    fn get_regs(&self) -> ChaosResult<libc::user_regs_struct> {
        // SAFETY: user_regs_struct is plain old data.
        let mut regs: libc::user_regs_struct = unsafe { core::mem::zeroed() };
        // SAFETY: the child is in a ptrace-stop; regs is a valid out pointer.
        let ret = unsafe {
            libc::ptrace(
                libc::PTRACE_GETREGS,
                self.pid,
                core::ptr::null_mut::<libc::c_void>(),
                &mut regs as *mut libc::user_regs_struct as *mut libc::c_void,
            )
        };
        if ret < 0 {
            log::error!("PTRACE_GETREGS of {} failed: {}", self.pid, last_error());
            return Err(ChaosError::SANDBOX_REGS_FAILED);
        }
        Ok(regs)
    }

    fn set_regs(&self, regs: &libc::user_regs_struct) -> ChaosResult<()> {
        // SAFETY: the child is in a ptrace-stop; regs is a valid pointer.
        let ret = unsafe {
            libc::ptrace(
                libc::PTRACE_SETREGS,
                self.pid,
                core::ptr::null_mut::<libc::c_void>(),
                regs as *const libc::user_regs_struct as *mut libc::c_void,
            )
        };
        if ret < 0 {
            log::error!("PTRACE_SETREGS of {} failed: {}", self.pid, last_error());
            return Err(ChaosError::SANDBOX_REGS_FAILED);
        }
        Ok(())
    }

    fn resume(&self) -> ChaosResult<()> {
        // SAFETY: the child is in a ptrace-stop.
        let ret = unsafe {
            libc::ptrace(
                libc::PTRACE_SYSEMU,
                self.pid,
                core::ptr::null_mut::<libc::c_void>(),
                core::ptr::null_mut::<libc::c_void>(),
            )
        };
        if ret < 0 {
            log::error!("PTRACE_SYSEMU of {} failed: {}", self.pid, last_error());
            return Err(ChaosError::SANDBOX_RESUME_FAILED);
        }
        Ok(())
    }

    fn peek(&self, addr: u64) -> ChaosResult<u64> {
        // SAFETY: errno is thread local; PEEKDATA signals errors through it
        // since -1 is a valid word.
        unsafe {
            *libc::__errno_location() = 0;
        }
        let word = unsafe {
            libc::ptrace(
                libc::PTRACE_PEEKDATA,
                self.pid,
                addr as *mut libc::c_void,
                core::ptr::null_mut::<libc::c_void>(),
            )
        };
        if word == -1 && last_error().raw_os_error().unwrap_or(0) != 0 {
            return Err(ChaosError::SANDBOX_TRANSFER_FAULT);
        }
        Ok(word as u64)
    }

    fn poke(&self, addr: u64, word: u64) -> ChaosResult<()> {
        // SAFETY: the child is in a ptrace-stop.
        let ret = unsafe {
            libc::ptrace(
                libc::PTRACE_POKEDATA,
                self.pid,
                addr as *mut libc::c_void,
                word as usize as *mut libc::c_void,
            )
        };
        if ret < 0 {
            return Err(ChaosError::SANDBOX_TRANSFER_FAULT);
        }
        Ok(())
    }

    /// Words covering `addr..addr + len`, starting at the aligned address
    fn read_words(&self, addr: u64, len: usize) -> ChaosResult<(u64, Vec<u8>)> {
        let end = addr
            .checked_add(len as u64)
            .ok_or(ChaosError::SANDBOX_TRANSFER_FAULT)?;
        let start = addr & !(WORD - 1);
        let mut bytes = Vec::with_capacity((end - start + WORD) as usize);
        let mut at = start;
        while at < end {
            bytes.extend_from_slice(&self.peek(at)?.to_ne_bytes());
            at += WORD;
        }
        Ok((start, bytes))
    }
}

impl Inferior for PtraceInferior {
    fn resume_until_syscall(&mut self) -> ChaosResult<Stop> {
        if self.reaped {
            return Err(ChaosError::SANDBOX_RESUME_FAILED);
        }
        self.resume()?;
        loop {
            let status = self.wait()?;
            if libc::WIFEXITED(status) {
                self.reaped = true;
                return Ok(Stop::Exited(libc::WEXITSTATUS(status)));
            }
            if libc::WIFSIGNALED(status) {
                self.reaped = true;
                return Ok(Stop::Signaled(libc::WTERMSIG(status)));
            }
            let sig = libc::WSTOPSIG(status);
            if sig == libc::SIGTRAP | 0x80 {
                let regs = self.get_regs()?;
                return Ok(Stop::Syscall(SyscallInfo {
                    nr: regs.orig_rax,
                    args: [regs.rdi, regs.rsi, regs.rdx, regs.r10, regs.r8, regs.r9],
                }));
            }
            if sig == libc::SIGTRAP && status >> 16 != 0 {
                // ptrace event stop; nothing to report
                self.resume()?;
                continue;
            }
            return Ok(Stop::Stopped(sig));
        }
    }

    fn read_memory(&mut self, addr: u64, buf: &mut [u8]) -> ChaosResult<()> {
        let (start, words) = self.read_words(addr, buf.len())?;
        let skip = (addr - start) as usize;
        buf.copy_from_slice(&words[skip..skip + buf.len()]);
        Ok(())
    }

    fn write_memory(&mut self, addr: u64, data: &[u8]) -> ChaosResult<()> {
        // Every covering word is read first, so a fault leaves memory intact.
        let (start, mut words) = self.read_words(addr, data.len())?;
        let skip = (addr - start) as usize;
        words[skip..skip + data.len()].copy_from_slice(data);
        for (i, chunk) in words.chunks_exact(WORD as usize).enumerate() {
            let mut word = [0u8; WORD as usize];
            word.copy_from_slice(chunk);
            self.poke(start + i as u64 * WORD, u64::from_ne_bytes(word))?;
        }
        Ok(())
    }

    fn set_syscall_return(&mut self, val: i64) -> ChaosResult<()> {
        let mut regs = self.get_regs()?;
        regs.rax = val as u64;
        self.set_regs(&regs)
    }
}

impl Drop for PtraceInferior {
    fn drop(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.stop();
        }
        if self.reaped {
            return;
        }
        // SAFETY: our own, not yet reaped child.
        unsafe {
            libc::kill(self.pid, libc::SIGKILL);
        }
        loop {
            match self.wait() {
                Ok(status) if libc::WIFEXITED(status) || libc::WIFSIGNALED(status) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        self.reaped = true;
    }
}

impl<B: CryptoBackend> Sandbox<B> {
    /// Run one cycle of the code loaded in `exec` in a fresh child
    pub fn run_isolated(
        &self,
        exec: &ExecRegion,
        stack: &StackRegion,
        deadline: Option<Duration>,
    ) -> CycleOutcome {
        match PtraceInferior::spawn(exec.entry(), stack.top(), deadline) {
            Ok(mut inferior) => self.run(&mut inferior),
            Err(err) => CycleOutcome::Failed(FailureReason::Platform(err)),
        }
    }
}

/// Whether this process may fork and trace children
pub fn ptrace_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        // SAFETY: the child only pauses until it is killed.
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return false;
        }
        if pid == 0 {
            loop {
                unsafe {
                    libc::pause();
                }
            }
        }
        // SAFETY: seize and kill our own child.
        let ok = unsafe {
            libc::ptrace(
                libc::PTRACE_SEIZE,
                pid,
                core::ptr::null_mut::<libc::c_void>(),
                core::ptr::null_mut::<libc::c_void>(),
            ) == 0
        };
        unsafe {
            libc::kill(pid, libc::SIGKILL);
            let mut status = 0;
            libc::waitpid(pid, &mut status, libc::__WALL);
        }
        if !ok {
            log::warn!("ptrace is not permitted: {}", last_error());
        }
        ok
    })
}
