//! Lenient argument accessors for operation handlers
//!
//! Models are loose with JSON types (`"10"` for `10`, `"true"` for `true`),
//! so numeric and boolean accessors also accept their string spellings.
//! An explicit `null` reads as "not given".

use anyhow::{anyhow, bail, Result};
use serde_json::Value;

use crate::tool::Arguments;

pub fn opt_str(args: &Arguments, name: &str) -> Result<Option<String>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => bail!("Parameter '{}' must be a string, got {}", name, other),
    }
}

pub fn req_str(args: &Arguments, name: &str) -> Result<String> {
    opt_str(args, name)?.ok_or_else(|| anyhow!("Parameter '{}' is required", name))
}

pub fn opt_i64(args: &Arguments, name: &str) -> Result<Option<i64>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| anyhow!("Parameter '{}' must be an integer, got {}", name, n)),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Parameter '{}' must be an integer, got '{}'", name, s)),
        Some(other) => bail!("Parameter '{}' must be an integer, got {}", name, other),
    }
}

pub fn req_i64(args: &Arguments, name: &str) -> Result<i64> {
    opt_i64(args, name)?.ok_or_else(|| anyhow!("Parameter '{}' is required", name))
}

pub fn opt_bool(args: &Arguments, name: &str) -> Result<Option<bool>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::Number(n)) => Ok(Some(n.as_i64() != Some(0))),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            "none" | "null" | "all" => Ok(None),
            _ => bail!("Parameter '{}' must be a boolean, got '{}'", name, s),
        },
        Some(other) => bail!("Parameter '{}' must be a boolean, got {}", name, other),
    }
}
