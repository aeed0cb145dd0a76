use anyhow::{bail, Context, Result};
use hysen2pfc_lib::Status;

pub const DEFAULT_SNAPSHOT_FILE: &str = "hysen2pfc.yaml";

/// Loads a status snapshot written by [`save`] or by hand.
pub fn load(path: &str) -> Result<Status> {
    log::debug!("Loading status snapshot from {path:?}");
    let file = std::fs::File::open(path)
        .with_context(|| format!("Cannot open status snapshot {path:?}"))?;
    let status: Status = serde_yaml::from_reader(&file)
        .with_context(|| format!("Cannot read status snapshot from file: {path:?}"))?;
    Ok(status)
}

pub fn save(path: &str, status: &Status) -> Result<()> {
    log::debug!("Saving status snapshot to {path:?}");
    let file = std::fs::File::create(path)
        .with_context(|| format!("Cannot create status snapshot {path:?}"))?;
    serde_yaml::to_writer(&file, status)
        .with_context(|| format!("Cannot write status snapshot to file: {path:?}"))?;
    Ok(())
}

/// Parses hex bytes as printed by packet captures: `01 03 00`, `01:03:00`, `010300` or
/// `0x01,0x03,0x00`.
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let mut digits = String::with_capacity(text.len());
    for token in text.split(|c: char| c.is_whitespace() || c == ',' || c == ':' || c == '-') {
        let token = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if token.len() == 1 {
            digits.push('0');
        }
        digits.push_str(token);
    }
    if !digits.is_ascii() {
        bail!("Invalid hex digits in {text:?}");
    }
    if digits.len() % 2 != 0 {
        bail!("Odd number of hex digits in {text:?}");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .with_context(|| format!("Invalid hex byte {:?} in {text:?}", &digits[i..i + 2]))
        })
        .collect()
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
