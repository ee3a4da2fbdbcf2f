//! `kslive inspect`: decode a captured frame from hex.

use std::io::Read;

use anyhow::{Context, Result};

use crate::protocol::inspect::{dump, parse_hex};

/// Decode `hex` (or stdin when `hex` is `-`) and print the frame tree.
pub fn run(hex: &str) -> Result<()> {
    let input = if hex == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read frame from stdin")?;
        buf
    } else {
        hex.to_string()
    };

    let bytes = parse_hex(&input)?;
    print!("{}", dump(&bytes)?);
    Ok(())
}
