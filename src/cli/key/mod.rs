//! Key command - derives keys without touching any cache

use anyhow::Context;
use clap::Args;
use serde_json::Value;

use crate::domain::cache::{DigestAlgorithm, KeyDeriver, canonical_text};

#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Namespace prefix
    pub prefix: String,

    /// Positional arguments as a JSON array
    #[arg(long)]
    pub args: Option<String>,

    /// Named arguments as a JSON object
    #[arg(long)]
    pub kwargs: Option<String>,

    /// Use SHA-256 instead of MD5
    #[arg(long)]
    pub sha256: bool,

    /// Also print the canonical text that is hashed
    #[arg(long)]
    pub canonical: bool,
}

pub fn run(args: KeyArgs) -> anyhow::Result<()> {
    let positional = parse_json("--args", args.args.as_deref())?;
    let named = parse_json("--kwargs", args.kwargs.as_deref())?;

    let algorithm = if args.sha256 { DigestAlgorithm::Sha256 } else { DigestAlgorithm::Md5 };
    let key = KeyDeriver::new()
        .with_algorithm(algorithm)
        .derive(&args.prefix, &positional, &named)?;

    if args.canonical {
        println!("{}", canonical_text(&positional, &named)?);
    }
    println!("{}", key);

    Ok(())
}

fn parse_json(flag: &str, raw: Option<&str>) -> anyhow::Result<Value> {
    match raw {
        Some(text) => serde_json::from_str(text).with_context(|| format!("{} is not valid JSON", flag)),
        None => Ok(Value::Null),
    }
}
