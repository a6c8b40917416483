// Licensed under the Apache-2.0 license

#![cfg(all(target_os = "linux", target_arch = "x86_64"))]

use chaos_api::{Algorithm, ChaosRequest};
use chaos_emu_periph::{DeviceConfig, FirmwareRunner, SandboxRunner};
use chaos_emu_sandbox::{ptrace_available, CycleOutcome, FailureReason, Stop};
use chaos_hw_model::{ChaosModel, InitParams, RunnerKind};
use chaos_image_fake_keys::{DEV_RSA_MODULUS, DEV_RSA_PRIVATE_EXPONENT};
use chaos_image_gen::{ImageGenerator, RsaSigningKey, SoftGeneratorCrypto};
use std::time::{Duration, Instant};

// mov eax, 60; xor edi, edi; syscall
const EXIT_0: &[u8] = &[0xb8, 0x3c, 0x00, 0x00, 0x00, 0x31, 0xff, 0x0f, 0x05];
// mov eax, 60; mov edi, 3; syscall
const EXIT_3: &[u8] = &[
    0xb8, 0x3c, 0x00, 0x00, 0x00, 0xbf, 0x03, 0x00, 0x00, 0x00, 0x0f, 0x05,
];
// mov eax, 39; syscall
const GETPID: &[u8] = &[0xb8, 0x27, 0x00, 0x00, 0x00, 0x0f, 0x05];
const UD2: &[u8] = &[0x0f, 0x0b];
// jmp $
const SPIN: &[u8] = &[0xeb, 0xfe];

macro_rules! require_ptrace {
    () => {
        if !ptrace_available() {
            eprintln!("ptrace is not permitted here, skipping");
            return;
        }
    };
}

fn run_blob(code: &[u8], watchdog: Option<Duration>) -> CycleOutcome {
    let mut runner = SandboxRunner::new(0x1000, 0x4000, watchdog).unwrap();
    runner.load(code).unwrap();
    runner.run_cycle()
}

#[test]
fn test_exit_codes() {
    require_ptrace!();
    assert_eq!(run_blob(EXIT_0, None), CycleOutcome::Completed);
    assert_eq!(
        run_blob(EXIT_3, None),
        CycleOutcome::Failed(FailureReason::ExitCode(3))
    );
}

#[test]
fn test_forbidden_syscall() {
    require_ptrace!();
    assert_eq!(
        run_blob(GETPID, None),
        CycleOutcome::Failed(FailureReason::Violation(39))
    );
}

#[test]
fn test_crash() {
    require_ptrace!();
    assert!(matches!(
        run_blob(UD2, None),
        CycleOutcome::Failed(FailureReason::Crashed(Stop::Stopped(4) | Stop::Signaled(4)))
    ));
}

#[test]
fn test_watchdog_kills_spinning_firmware() {
    require_ptrace!();
    let start = Instant::now();
    let outcome = run_blob(SPIN, Some(Duration::from_millis(100)));
    assert!(matches!(
        outcome,
        CycleOutcome::Failed(FailureReason::Crashed(_) | FailureReason::Platform(_))
    ));
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_cycles_are_independent() {
    require_ptrace!();
    let mut runner = SandboxRunner::new(0x1000, 0x4000, None).unwrap();
    runner.load(EXIT_3).unwrap();
    assert!(!runner.run_cycle().is_completed());
    runner.load(EXIT_0).unwrap();
    for _ in 0..3 {
        assert!(runner.run_cycle().is_completed());
    }
}

#[test]
fn test_trampoline_firmware_end_to_end() {
    require_ptrace!();
    let model = ChaosModel::new(InitParams {
        config: DeviceConfig {
            queue_size: 4,
            dram_size: 0x10000,
            request_timeout_ms: 5000,
            cycle_watchdog_ms: 5000,
            ..Default::default()
        },
        runner: RunnerKind::Sandbox,
        trust_anchor: DEV_RSA_MODULUS.to_vec(),
    })
    .unwrap();

    let key = RsaSigningKey::new(&DEV_RSA_MODULUS, &DEV_RSA_PRIVATE_EXPONENT);
    let image = ImageGenerator::new(SoftGeneratorCrypto)
        .generate(&key, &model.trampoline_code())
        .unwrap();
    model.load_firmware(&image).unwrap();

    let mut client = model.open();
    client.allocate_buffer(0x100).unwrap();
    let map = client.map(0, 0x100).unwrap();
    let aes_key: Vec<u8> = (0..16).collect();
    let plain: Vec<u8> = (0..16).map(|i| i * 2).collect();
    map.write(0x00, &plain).unwrap();
    map.write(0x40, &aes_key).unwrap();

    let done = client
        .request(&ChaosRequest {
            algo: Algorithm::AesEnc.into(),
            input: 0x00,
            in_size: 16,
            key: 0x40,
            key_size: 16,
            output: 0x80,
            out_size: 16,
        })
        .unwrap();
    assert_eq!(done.out_size, 16);
    let mut out = [0u8; 16];
    map.read(0x80, &mut out).unwrap();
    assert_eq!(hex::encode(out), "ba8c2bb6a178805d061260196db96eaa");

    // More than twice the ring size through forked children
    for i in 0..9u8 {
        map.write(0xc0, &[i; 8]).unwrap();
        let done = client
            .request(&ChaosRequest {
                algo: Algorithm::Echo.into(),
                input: 0xc0,
                in_size: 8,
                output: 0xe0,
                out_size: 8,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(done.out_size, 8);
        let mut echoed = [0u8; 8];
        map.read(0xe0, &mut echoed).unwrap();
        assert_eq!(echoed, [i; 8]);
    }
}
