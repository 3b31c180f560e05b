//! Short-lived processes Claude Code runs at its lifecycle points.

pub mod approval;
mod detail;
pub mod response;
mod rules;
mod transcript;

use std::io::Read;

use crate::errors::{AppError, Result};

fn read_stdin() -> Result<String> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .map_err(|_| AppError::HookReadStdin)?;
    Ok(raw)
}
