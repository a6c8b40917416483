/*++

Licensed under the Apache-2.0 license.

File Name:

    sign.rs

Abstract:

    File contains the image signing command.

--*/

use crate::config::load_key_config;
use anyhow::Context;
use chaos_image_gen::{ImageGenerator, ImageGeneratorCrypto, SoftGeneratorCrypto};
use clap::ArgMatches;
use std::path::PathBuf;

/// Run the command
pub(crate) fn run_cmd(args: &ArgMatches) -> anyhow::Result<()> {
    let config_path: &PathBuf = args
        .get_one::<PathBuf>("key-config")
        .with_context(|| "key-config arg not specified")?;

    let code_path: &PathBuf = args
        .get_one::<PathBuf>("code")
        .with_context(|| "code arg not specified")?;

    let out_path: &PathBuf = args
        .get_one::<PathBuf>("out")
        .with_context(|| "out arg not specified")?;

    let key = load_key_config(config_path)?.signing_key()?;
    let code = SoftGeneratorCrypto::code_from_file(code_path)?;
    let image = ImageGenerator::new(SoftGeneratorCrypto).generate(&key, &code)?;

    std::fs::write(out_path, &image)
        .with_context(|| format!("Failed to write image {}", out_path.display()))?;
    log::info!(
        "signed {} code bytes into {} ({} bytes)",
        code.len(),
        out_path.display(),
        image.len()
    );
    Ok(())
}
