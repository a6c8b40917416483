/*++

Licensed under the Apache-2.0 license.

File Name:

    mailbox.rs

Abstract:

    File contains the host side of the mailbox transport: the command ring
    producer, the response ring consumer that runs from the interrupt path,
    and the per-slot waiters that match responses back to requests.

--*/

use crate::{DramPool, DriverConfig, Resource};
use chaos_api::mailbox::{CHAOS_REQUEST_SIZE, MAILBOX_CMD_SIZE, MAILBOX_RSP_SIZE};
use chaos_api::{
    ChaosApiError, ChaosRequest, CommandCode, Csr, MailboxCmd, MailboxRsp, RingGeometry,
};
use chaos_emu_bus::{Bus, CsrBlock, DeviceResources};
use chaos_error::{ChaosError, ChaosResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// State of one entry of the waiter side table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Idle,
    Waiting { seq: u64 },
    Done { seq: u64, retval: i64 },
}

struct Completions {
    slots: Vec<Slot>,

    /// Host copy of `rsp_head`
    rsp_head: u64,
}

/// Host mailbox
pub struct Mailbox {
    resources: DeviceResources,
    pool: Arc<DramPool>,
    ring: RingGeometry,
    cmdq: Option<Resource>,
    rspq: Option<Resource>,
    timeout: Duration,

    /// Serializes command producers
    producer: Mutex<()>,
    next_seq: AtomicU64,

    /// Written from the interrupt path, so never held across a sleep
    completions: spin::Mutex<Completions>,
    wake_lock: Mutex<()>,
    wake: Condvar,
}

impl Mailbox {
    /// Allocate both rings from `pool` and program the ring registers
    ///
    /// # Arguments
    ///
    /// * `resources` - Shared register file, DRAM and doorbell
    /// * `pool` - DRAM allocator
    /// * `config` - Ring capacity and request timeout
    pub fn new(
        resources: DeviceResources,
        pool: Arc<DramPool>,
        config: &DriverConfig,
    ) -> ChaosResult<Self> {
        let ring = RingGeometry::new(config.queue_size)?;
        let entries =
            usize::try_from(ring.capacity()).map_err(|_| ChaosError::DRIVER_MAILBOX_INVALID_CAPACITY)?;
        let cmd_bytes = entries
            .checked_mul(MAILBOX_CMD_SIZE)
            .ok_or(ChaosError::DRIVER_MAILBOX_INVALID_CAPACITY)?;
        let rsp_bytes = entries
            .checked_mul(MAILBOX_RSP_SIZE)
            .ok_or(ChaosError::DRIVER_MAILBOX_INVALID_CAPACITY)?;

        let cmdq = pool.allocate(cmd_bytes)?;
        let rspq = match pool.allocate(rsp_bytes) {
            Ok(rspq) => rspq,
            Err(err) => {
                pool.free(cmdq)?;
                return Err(err);
            }
        };

        let csr = CsrBlock::new(resources.csr.view())?;
        csr.write(Csr::CmdqAddr, cmdq.offset() as u64);
        csr.write(Csr::CmdqSize, ring.capacity());
        csr.write(Csr::RspqAddr, rspq.offset() as u64);
        csr.write(Csr::RspqSize, ring.capacity());
        for reg in [Csr::CmdHead, Csr::CmdTail, Csr::RspHead, Csr::RspTail] {
            csr.write(reg, 0);
        }
        log::debug!(
            "mailbox rings at {:#x}/{:#x}, {} slots",
            cmdq.offset(),
            rspq.offset(),
            ring.capacity()
        );

        Ok(Self {
            resources,
            pool,
            ring,
            cmdq: Some(cmdq),
            rspq: Some(rspq),
            timeout: config.request_timeout,
            producer: Mutex::new(()),
            next_seq: AtomicU64::new(1),
            completions: spin::Mutex::new(Completions {
                slots: vec![Slot::Idle; entries],
                rsp_head: 0,
            }),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        })
    }

    fn csr(&self) -> ChaosResult<CsrBlock<'_>> {
        CsrBlock::new(self.resources.csr.view())
    }

    fn wake_guard(&self) -> MutexGuard<'_, ()> {
        self.wake_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> u64 {
        self.ring.capacity()
    }

    /// Post `cmd` and block until its response arrives.
    ///
    /// `cmd.seq` is assigned here.
    ///
    /// # Returns
    ///
    /// * `i64` - The response's return value
    ///
    /// # Error
    ///
    /// * `MailboxBusy` - The ring is full, or `N` requests are still owed a
    ///   response
    /// * `MailboxTimeout` - No response before the request timeout
    pub fn submit_and_wait(&self, mut cmd: MailboxCmd) -> Result<i64, ChaosApiError> {
        let csr = self.csr()?;
        let cmdq = self
            .cmdq
            .as_ref()
            .ok_or(ChaosError::DRIVER_MAILBOX_INVALID_CAPACITY)?
            .offset();

        let seq = {
            let _producer = self.producer.lock().unwrap_or_else(|e| e.into_inner());
            let head = csr.read(Csr::CmdHead);
            let tail = csr.read(Csr::CmdTail);
            if self.ring.is_full(head, tail) {
                log::warn!("command ring is full");
                return Err(ChaosApiError::MailboxBusy);
            }

            // The device takes a command before answering it, so the ring
            // alone does not bound the requests still owed a response
            let seq = self.next_seq.load(Ordering::Relaxed);
            let idx = self.ring.slot(seq) as usize;
            if self.completions.lock().slots[idx] != Slot::Idle {
                log::warn!("waiter slot {idx} is still in flight");
                return Err(ChaosApiError::MailboxBusy);
            }

            cmd.seq = seq;
            let offset = cmdq + self.ring.slot(tail) as usize * MAILBOX_CMD_SIZE;
            self.resources
                .dram
                .write_obj(offset, &cmd)
                .map_err(ChaosError::from)?;
            self.next_seq.store(seq.wrapping_add(1), Ordering::Relaxed);

            // The waiter must be armed before the device can see the command
            self.completions.lock().slots[idx] = Slot::Waiting { seq };

            csr.write(Csr::CmdTail, self.ring.advance(tail));
            csr.write(Csr::CmdSent, 1);
            log::debug!("posted seq {seq} at cmd_tail {tail}");
            seq
        };
        self.resources.doorbell.trigger(1);

        self.wait_for(seq)
    }

    /// Block until slot `seq mod N` leaves `Waiting{seq}`. The slot is back
    /// to `Idle` whenever this returns.
    fn wait_for(&self, seq: u64) -> Result<i64, ChaosApiError> {
        let idx = self.ring.slot(seq) as usize;
        let deadline = Instant::now() + self.timeout;
        let mut guard = self.wake_guard();
        loop {
            let timed_out = Instant::now() >= deadline;
            {
                let mut completions = self.completions.lock();
                let result = match completions.slots[idx] {
                    Slot::Waiting { seq: waiting } if waiting == seq && !timed_out => None,
                    Slot::Waiting { seq: waiting } if waiting == seq => {
                        log::warn!("request seq {seq} timed out");
                        Some(Err(ChaosApiError::MailboxTimeout))
                    }
                    Slot::Done { seq: done, retval } if done == seq => Some(Ok(retval)),
                    Slot::Done { seq: actual, .. } | Slot::Waiting { seq: actual } => {
                        log::warn!("response slot {idx} carries seq {actual}, expected {seq}");
                        Some(Err(ChaosApiError::MailboxSequenceMismatch {
                            expected: seq,
                            actual,
                        }))
                    }
                    Slot::Idle => Some(Err(ChaosApiError::MailboxSequenceMismatch {
                        expected: seq,
                        actual: 0,
                    })),
                };
                if let Some(result) = result {
                    completions.slots[idx] = Slot::Idle;
                    return result;
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            guard = self
                .wake
                .wait_timeout(guard, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    /// Run a crypto request through the firmware
    ///
    /// # Returns
    ///
    /// * `ChaosRequest` - `req` with `out_size` set to the bytes produced
    pub fn request(&self, req: &ChaosRequest) -> Result<ChaosRequest, ChaosApiError> {
        let scratch = self.pool.allocate(CHAOS_REQUEST_SIZE)?;
        let result = self
            .resources
            .dram
            .write_obj(scratch.offset(), req)
            .map_err(|err| ChaosApiError::Driver(err.into()))
            .and_then(|()| {
                self.submit_and_wait(MailboxCmd {
                    seq: 0,
                    code: CommandCode::REQUEST.into(),
                    dma_addr: scratch.offset() as u32,
                    dma_size: CHAOS_REQUEST_SIZE as u32,
                    reserved: 0,
                })
            });
        self.pool.free(scratch)?;

        let retval = result?;
        if retval < 0 {
            return Err(ChaosApiError::FirmwareFailure(retval));
        }
        Ok(ChaosRequest {
            out_size: retval as u32,
            ..*req
        })
    }

    /// Drain the response ring; called when the device raises
    /// [`chaos_api::IrqStatus::RESPONSE`]
    pub fn handle_response_irq(&self) {
        let Ok(csr) = self.csr() else {
            return;
        };
        let Some(rspq) = self.rspq.as_ref().map(Resource::offset) else {
            return;
        };
        let drained = {
            let mut completions = self.completions.lock();
            let tail = csr.read(Csr::RspTail);
            let mut head = completions.rsp_head;
            if !self.ring.is_consistent(head, tail) {
                log::error!("device rsp_tail {tail} is inconsistent with rsp_head {head}");
                return;
            }
            let mut drained = 0;
            while head != tail {
                let offset = rspq + self.ring.slot(head) as usize * MAILBOX_RSP_SIZE;
                match self.resources.dram.read_obj::<MailboxRsp>(offset) {
                    Ok(rsp) => {
                        let slot = &mut completions.slots[self.ring.slot(rsp.seq) as usize];
                        if *slot == Slot::Idle {
                            log::debug!("dropping response for seq {}, no waiter", rsp.seq);
                        } else {
                            *slot = Slot::Done {
                                seq: rsp.seq,
                                retval: rsp.retval,
                            };
                        }
                    }
                    Err(err) => log::error!("reading response slot failed: {err:?}"),
                }
                head = self.ring.advance(head);
                drained += 1;
            }
            completions.rsp_head = head;
            csr.write(Csr::RspHead, head);
            drained
        };
        if drained != 0 {
            log::debug!("drained {drained} responses");
            let _guard = self.wake_guard();
            self.wake.notify_all();
        }
    }

    /// Release both rings and detach from the device
    pub fn exit(mut self) -> ChaosResult<()> {
        self.release()
    }

    fn release(&mut self) -> ChaosResult<()> {
        if let Ok(csr) = self.csr() {
            csr.write(Csr::CmdqSize, 0);
            csr.write(Csr::RspqSize, 0);
        }
        if let Some(cmdq) = self.cmdq.take() {
            self.pool.free(cmdq)?;
        }
        if let Some(rspq) = self.rspq.take() {
            self.pool.free(rspq)?;
        }
        Ok(())
    }
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::error!("releasing mailbox rings failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DRAM_GRANULE;
    use chaos_api::IrqStatus;
    use chaos_firmware::{poll_next_command, push_response};
    use std::sync::atomic::AtomicBool;
    use std::thread;

    const DRAM_SIZE: usize = 0x4000;

    struct Harness {
        resources: DeviceResources,
        pool: Arc<DramPool>,
        mailbox: Arc<Mailbox>,
    }

    fn harness(queue_size: u64, timeout: Duration) -> Harness {
        let resources = DeviceResources::new(DRAM_SIZE).unwrap();
        let pool = Arc::new(DramPool::new(DRAM_SIZE, DRAM_GRANULE).unwrap());
        let config = DriverConfig {
            queue_size,
            request_timeout: timeout,
            ..Default::default()
        };
        let mailbox = Arc::new(Mailbox::new(resources.clone(), pool.clone(), &config).unwrap());
        Harness {
            resources,
            pool,
            mailbox,
        }
    }

    /// Device stand-in answering each command with `retval(cmd)`
    fn spawn_device(
        h: &Harness,
        stop: Arc<AtomicBool>,
        retval: fn(&MailboxCmd) -> i64,
    ) -> thread::JoinHandle<()> {
        let resources = h.resources.clone();
        let mailbox = h.mailbox.clone();
        thread::spawn(move || {
            let csr = CsrBlock::new(resources.csr.view()).unwrap();
            while !stop.load(Ordering::Acquire) {
                if resources
                    .doorbell
                    .wait_timeout(Duration::from_millis(10))
                    .is_none()
                {
                    continue;
                }
                while let Some(cmd) = poll_next_command(&csr, &*resources.dram).unwrap() {
                    let rsp = MailboxRsp {
                        seq: cmd.seq,
                        retval: retval(&cmd),
                    };
                    push_response(&csr, &*resources.dram, &rsp).unwrap();
                    csr.raise_irq(IrqStatus::RESPONSE);
                    mailbox.handle_response_irq();
                }
            }
        })
    }

    fn teardown(h: Harness) {
        let Harness { pool, mailbox, .. } = h;
        Arc::into_inner(mailbox).unwrap().exit().unwrap();
        assert_eq!(pool.available(), pool.capacity());
    }

    #[test]
    fn test_rings_programmed() {
        let h = harness(8, Duration::from_millis(100));
        let csr = CsrBlock::new(h.resources.csr.view()).unwrap();
        assert_eq!(csr.read(Csr::CmdqSize), 8);
        assert_eq!(csr.read(Csr::RspqSize), 8);
        assert_eq!(h.pool.available(), DRAM_SIZE - 8 * 24 - 8 * 16);
        teardown(h);
    }

    #[test]
    fn test_invalid_capacity() {
        let resources = DeviceResources::new(DRAM_SIZE).unwrap();
        let pool = Arc::new(DramPool::new(DRAM_SIZE, DRAM_GRANULE).unwrap());
        let config = DriverConfig {
            queue_size: 6,
            ..Default::default()
        };
        assert_eq!(
            Mailbox::new(resources, pool.clone(), &config).err(),
            Some(ChaosError::DRIVER_MAILBOX_INVALID_CAPACITY)
        );
        assert_eq!(pool.available(), DRAM_SIZE);
    }

    #[test]
    fn test_round_trip_many_wraps() {
        let h = harness(4, Duration::from_secs(5));
        let stop = Arc::new(AtomicBool::new(false));
        let device = spawn_device(&h, stop.clone(), |cmd| cmd.seq as i64 * 3);

        for seq in 1..=20u64 {
            let retval = h
                .mailbox
                .submit_and_wait(MailboxCmd::default())
                .unwrap();
            assert_eq!(retval, seq as i64 * 3);
        }

        stop.store(true, Ordering::Release);
        device.join().unwrap();
        teardown(h);
    }

    #[test]
    fn test_timeout_then_busy() {
        let h = harness(2, Duration::from_millis(20));
        // No device: commands pile up in the ring
        assert_eq!(
            h.mailbox.submit_and_wait(MailboxCmd::default()),
            Err(ChaosApiError::MailboxTimeout)
        );
        assert_eq!(
            h.mailbox.submit_and_wait(MailboxCmd::default()),
            Err(ChaosApiError::MailboxTimeout)
        );
        assert_eq!(
            h.mailbox.submit_and_wait(MailboxCmd::default()),
            Err(ChaosApiError::MailboxBusy)
        );
        teardown(h);
    }

    #[test]
    fn test_stale_response_is_a_mismatch() {
        let h = harness(2, Duration::from_millis(200));
        let csr = CsrBlock::new(h.resources.csr.view()).unwrap();

        // seq 1 and seq 2 time out; the device picks them up late
        for expected in 1..=2 {
            assert_eq!(
                h.mailbox.submit_and_wait(MailboxCmd::default()),
                Err(ChaosApiError::MailboxTimeout)
            );
            let stale = poll_next_command(&csr, &*h.resources.dram).unwrap().unwrap();
            assert_eq!(stale.seq, expected);
        }

        // seq 3 shares a side-table slot with seq 1 and receives its response
        let mailbox = h.mailbox.clone();
        let resources = h.resources.clone();
        let late = thread::spawn(move || {
            let csr = CsrBlock::new(resources.csr.view()).unwrap();
            while poll_next_command(&csr, &*resources.dram).unwrap().is_none() {
                thread::yield_now();
            }
            push_response(&csr, &*resources.dram, &MailboxRsp { seq: 1, retval: 0 }).unwrap();
            mailbox.handle_response_irq();
        });
        assert_eq!(
            h.mailbox.submit_and_wait(MailboxCmd::default()),
            Err(ChaosApiError::MailboxSequenceMismatch {
                expected: 3,
                actual: 1
            })
        );
        late.join().unwrap();
        teardown(h);
    }

    fn wait_for_cursor(csr: &CsrBlock<'_>, reg: Csr, value: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while csr.read(reg) != value {
            assert!(Instant::now() < deadline, "{reg:?} never reached {value}");
            thread::yield_now();
        }
    }

    #[test]
    fn test_taken_command_keeps_its_slot() {
        let h = harness(2, Duration::from_secs(5));
        let csr = CsrBlock::new(h.resources.csr.view()).unwrap();
        let submit = || {
            let mailbox = h.mailbox.clone();
            thread::spawn(move || mailbox.submit_and_wait(MailboxCmd::default()))
        };

        let first = submit();
        wait_for_cursor(&csr, Csr::CmdTail, 1);
        let taken = poll_next_command(&csr, &*h.resources.dram).unwrap().unwrap();
        assert_eq!(taken.seq, 1);

        let second = submit();
        wait_for_cursor(&csr, Csr::CmdTail, 2);

        // One command is queued and one is being served: nothing is free
        assert!(!h.mailbox.ring.is_full(csr.read(Csr::CmdHead), csr.read(Csr::CmdTail)));
        assert_eq!(
            h.mailbox.submit_and_wait(MailboxCmd::default()),
            Err(ChaosApiError::MailboxBusy)
        );

        push_response(&csr, &*h.resources.dram, &MailboxRsp { seq: 1, retval: 11 }).unwrap();
        h.mailbox.handle_response_irq();
        assert_eq!(first.join().unwrap(), Ok(11));

        let taken = poll_next_command(&csr, &*h.resources.dram).unwrap().unwrap();
        assert_eq!(taken.seq, 2);
        push_response(&csr, &*h.resources.dram, &MailboxRsp { seq: 2, retval: 12 }).unwrap();
        h.mailbox.handle_response_irq();
        assert_eq!(second.join().unwrap(), Ok(12));

        teardown(h);
    }

    #[test]
    fn test_more_submitters_than_slots() {
        let h = harness(4, Duration::from_secs(5));
        let stop = Arc::new(AtomicBool::new(false));
        let device = spawn_device(&h, stop.clone(), |cmd| {
            thread::sleep(Duration::from_millis(1));
            cmd.dma_addr as i64
        });

        thread::scope(|s| {
            for t in 0..12u32 {
                let mailbox = &h.mailbox;
                s.spawn(move || {
                    for i in 0..10u32 {
                        let cmd = MailboxCmd {
                            dma_addr: t * 100 + i,
                            ..Default::default()
                        };
                        let retval = loop {
                            match mailbox.submit_and_wait(cmd) {
                                Err(ChaosApiError::MailboxBusy) => {
                                    thread::sleep(Duration::from_micros(200))
                                }
                                other => break other,
                            }
                        };
                        assert_eq!(retval, Ok((t * 100 + i) as i64));
                    }
                });
            }
        });

        stop.store(true, Ordering::Release);
        device.join().unwrap();
        teardown(h);
    }

    #[test]
    fn test_inconsistent_rsp_tail_is_ignored() {
        let h = harness(4, Duration::from_millis(100));
        let csr = CsrBlock::new(h.resources.csr.view()).unwrap();

        for bogus in [9, 8, 5, u64::MAX] {
            csr.write(Csr::RspTail, bogus);
            let (tx, rx) = std::sync::mpsc::channel();
            let mailbox = h.mailbox.clone();
            let drain = thread::spawn(move || {
                mailbox.handle_response_irq();
                tx.send(()).unwrap();
            });
            assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
            drain.join().unwrap();
            assert_eq!(csr.read(Csr::RspHead), 0);
        }

        // A sane cursor afterwards is drained normally
        csr.write(Csr::RspTail, 0);
        let mailbox = h.mailbox.clone();
        let resources = h.resources.clone();
        let device = thread::spawn(move || {
            let csr = CsrBlock::new(resources.csr.view()).unwrap();
            let cmd = loop {
                if let Some(cmd) = poll_next_command(&csr, &*resources.dram).unwrap() {
                    break cmd;
                }
                thread::yield_now();
            };
            push_response(&csr, &*resources.dram, &MailboxRsp { seq: cmd.seq, retval: 5 }).unwrap();
            mailbox.handle_response_irq();
        });
        assert_eq!(h.mailbox.submit_and_wait(MailboxCmd::default()), Ok(5));
        device.join().unwrap();
        assert_eq!(csr.read(Csr::RspHead), 1);
        teardown(h);
    }

    #[test]
    fn test_request_maps_errors() {
        let h = harness(4, Duration::from_secs(5));
        let stop = Arc::new(AtomicBool::new(false));
        let device = spawn_device(&h, stop.clone(), |cmd| {
            if cmd.dma_size as usize != CHAOS_REQUEST_SIZE {
                -22
            } else if cmd.seq % 2 == 1 {
                9
            } else {
                -75
            }
        });

        let req = ChaosRequest {
            out_size: 64,
            ..Default::default()
        };
        let done = h.mailbox.request(&req).unwrap();
        assert_eq!(done.out_size, 9);
        assert_eq!(
            h.mailbox.request(&req),
            Err(ChaosApiError::FirmwareFailure(-75))
        );

        stop.store(true, Ordering::Release);
        device.join().unwrap();
        teardown(h);
    }
}
