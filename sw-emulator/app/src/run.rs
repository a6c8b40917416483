/*++

Licensed under the Apache-2.0 license.

File Name:

    run.rs

Abstract:

    File contains the command that loads an image into an emulated device
    and executes one request.

--*/

use crate::config::{load_device_config, load_key_config, KeyConfig};
use anyhow::{anyhow, Context};
use chaos_api::{Algorithm, AlgorithmKind, ChaosRequest};
use chaos_hw_model::{ChaosModel, InitParams, RunnerKind};
use chaos_image_gen::{ImageGenerator, SoftGeneratorCrypto};
use clap::ArgMatches;
use std::path::PathBuf;

const ALGORITHM_NAMES: [(&str, Algorithm); 10] = [
    ("echo", Algorithm::Echo),
    ("md5", Algorithm::Md5),
    ("aes-enc", Algorithm::AesEnc),
    ("aes-dec", Algorithm::AesDec),
    ("rc4-enc", Algorithm::Rc4Enc),
    ("rc4-dec", Algorithm::Rc4Dec),
    ("blowfish-enc", Algorithm::BlowfishEnc),
    ("blowfish-dec", Algorithm::BlowfishDec),
    ("twofish-enc", Algorithm::TwofishEnc),
    ("twofish-dec", Algorithm::TwofishDec),
];

pub(crate) fn algorithm_names() -> impl Iterator<Item = &'static str> {
    ALGORITHM_NAMES.iter().map(|(name, _)| *name)
}

fn parse_algorithm(name: &str) -> anyhow::Result<Algorithm> {
    ALGORITHM_NAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, algo)| *algo)
        .ok_or_else(|| anyhow!("Unknown algorithm {name}"))
}

fn align8(val: usize) -> usize {
    (val + 7) & !7
}

/// Staging buffer layout: input, then key, then output
#[derive(Debug, PartialEq, Eq)]
struct Layout {
    input: usize,
    key: usize,
    output: usize,
    total: usize,
}

impl Layout {
    fn new(in_size: usize, key_size: usize, out_size: usize) -> Self {
        let key = align8(in_size);
        let output = key + align8(key_size);
        Self {
            input: 0,
            key,
            output,
            total: (output + align8(out_size)).max(8),
        }
    }
}

fn default_out_size(algo: Algorithm, in_size: usize) -> usize {
    match algo.kind() {
        AlgorithmKind::Digest { size } => size as usize,
        _ => in_size,
    }
}

fn builtin_image(model: &ChaosModel, keys: &KeyConfig) -> anyhow::Result<Vec<u8>> {
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    let code = model.trampoline_code();
    #[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
    let code: Vec<u8> = {
        let _ = model;
        anyhow::bail!("Built-in firmware needs Linux on x86_64");
    };
    ImageGenerator::new(SoftGeneratorCrypto).generate(&keys.signing_key()?, &code)
}

/// Run the command
pub(crate) fn run_cmd(args: &ArgMatches) -> anyhow::Result<()> {
    let key_config_path: &PathBuf = args
        .get_one::<PathBuf>("key-config")
        .with_context(|| "key-config arg not specified")?;

    let algo_name: &String = args
        .get_one::<String>("algo")
        .with_context(|| "algo arg not specified")?;

    let input_hex: &String = args
        .get_one::<String>("input")
        .with_context(|| "input arg not specified")?;

    let keys = load_key_config(key_config_path)?;
    let config = load_device_config(
        args.get_one::<PathBuf>("device-config")
            .map(PathBuf::as_path),
    )?;
    let algo = parse_algorithm(algo_name)?;
    let input = hex::decode(input_hex).context("Invalid input hex")?;
    let key = match args.get_one::<String>("key") {
        Some(key) => hex::decode(key).context("Invalid key hex")?,
        None => Vec::new(),
    };
    let out_size = match args.get_one::<u32>("out-size") {
        Some(size) => *size as usize,
        None => default_out_size(algo, input.len()),
    };

    let runner = if args.get_flag("in-process") {
        RunnerKind::InProcess
    } else {
        RunnerKind::Sandbox
    };
    let model = ChaosModel::new(InitParams {
        config,
        runner,
        trust_anchor: keys.trust_anchor()?,
    })
    .map_err(|err| anyhow!("Failed to start the device: {err}"))?;

    let image = match args.get_one::<PathBuf>("image") {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read image {}", path.display()))?,
        None => builtin_image(&model, &keys)?,
    };
    model
        .load_firmware(&image)
        .map_err(|err| anyhow!("Firmware load failed: {err}"))?;

    let layout = Layout::new(input.len(), key.len(), out_size);
    let mut client = model.open();
    client
        .allocate_buffer(layout.total)
        .map_err(|err| anyhow!("Buffer allocation failed: {err}"))?;
    let map = client
        .map(0, layout.total)
        .map_err(|err| anyhow!("Mapping the buffer failed: {err}"))?;
    map.write(layout.input, &input)
        .and_then(|_| map.write(layout.key, &key))
        .map_err(|err| anyhow!("Staging the request failed: {err}"))?;

    let done = client
        .request(&ChaosRequest {
            algo: algo.into(),
            input: layout.input as u32,
            in_size: input.len() as u32,
            key: layout.key as u32,
            key_size: key.len() as u32,
            output: layout.output as u32,
            out_size: out_size as u32,
        })
        .map_err(|err| anyhow!("Request failed: {err}"))?;

    let mut output = vec![0u8; done.out_size as usize];
    map.read(layout.output, &mut output)
        .map_err(|err| anyhow!("Reading the output failed: {err}"))?;
    println!("{}", hex::encode(output));

    if (done.out_size as usize) < out_size {
        log::warn!("firmware produced {} of {out_size} bytes", done.out_size);
    }
    Ok(())
}
