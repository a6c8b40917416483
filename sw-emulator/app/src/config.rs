/*++

Licensed under the Apache-2.0 license.

File Name:

    config.rs

Abstract:

    File contains utilities for parsing the key and device configuration files.

--*/

use anyhow::{bail, Context};
use chaos_emu_periph::DeviceConfig;
use chaos_image_gen::RsaSigningKey;
use serde_derive::{Deserialize, Serialize};
use std::path::Path;

/// RSA key material as little-endian hex
#[derive(Default, Serialize, Deserialize)]
pub(crate) struct RsaKeyConfig {
    pub modulus: String,

    pub private_exponent: Option<String>,
}

// Key Configuration
#[derive(Default, Serialize, Deserialize)]
pub(crate) struct KeyConfig {
    pub rsa: RsaKeyConfig,
}

impl KeyConfig {
    /// Pinned public key the device checks images against
    pub fn trust_anchor(&self) -> anyhow::Result<Vec<u8>> {
        let modulus = hex::decode(self.rsa.modulus.trim()).context("Invalid modulus hex")?;
        if modulus.is_empty() {
            bail!("RSA modulus must not be empty");
        }
        Ok(modulus)
    }

    pub fn signing_key(&self) -> anyhow::Result<RsaSigningKey> {
        let Some(private_exponent) = &self.rsa.private_exponent else {
            bail!("Key configuration has no private exponent");
        };
        RsaSigningKey::from_hex(&self.rsa.modulus, private_exponent)
    }
}

fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let config_str = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read the config file {}", path.display()))?;

    toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Load Key Configuration from file
pub(crate) fn load_key_config(path: &Path) -> anyhow::Result<KeyConfig> {
    load_toml(path)
}

/// Load Device Configuration from file, or the defaults
pub(crate) fn load_device_config(path: Option<&Path>) -> anyhow::Result<DeviceConfig> {
    match path {
        Some(path) => load_toml(path),
        None => Ok(DeviceConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaos_image_fake_keys::{DEV_RSA_MODULUS, DEV_RSA_PRIVATE_EXPONENT};

    #[test]
    fn test_key_config() {
        let text = format!(
            "[rsa]\nmodulus = \"{}\"\nprivate_exponent = \"{}\"\n",
            hex::encode(DEV_RSA_MODULUS),
            hex::encode(DEV_RSA_PRIVATE_EXPONENT)
        );
        let config: KeyConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.trust_anchor().unwrap(), DEV_RSA_MODULUS.to_vec());
        let key = config.signing_key().unwrap();
        assert_eq!(key.private_exponent, DEV_RSA_PRIVATE_EXPONENT.to_vec());

        let public_only: KeyConfig =
            toml::from_str(&format!("[rsa]\nmodulus = \"{}\"\n", hex::encode(DEV_RSA_MODULUS)))
                .unwrap();
        assert!(public_only.signing_key().is_err());
        assert!(toml::from_str::<KeyConfig>("[rsa]\nmodulus = \"\"\n")
            .unwrap()
            .trust_anchor()
            .is_err());
    }

    #[test]
    fn test_missing_device_config_uses_defaults() {
        assert_eq!(load_device_config(None).unwrap(), DeviceConfig::default());
        assert!(load_device_config(Some(Path::new("/nonexistent/chaos.toml"))).is_err());
    }
}
