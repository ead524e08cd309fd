//! Cache key derivation
//!
//! Keys have the form `"{prefix}:{fragment}"` where the fragment is a
//! truncated hex digest of a canonical JSON rendering of the call arguments:
//!
//! ```text
//! {"args": [2, 3], "kwargs": {"page": 1}}
//! ```
//!
//! The rendering sorts object keys at every depth, uses `", "` and `": "`
//! separators, escapes every non-ASCII character as `\uXXXX` and prints
//! floats with Python-style exponents. Keys produced by the previous
//! deployment therefore stay addressable.

use std::fmt;
use std::io;

use md5::Md5;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::DomainError;

/// Number of hex characters kept from the digest
pub const DEFAULT_FRAGMENT_LENGTH: usize = 12;

/// Digest used to shorten the canonical argument text
///
/// Neither choice is a security property; the fragment only has to be
/// short and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    fn hex_digest(&self, input: &[u8]) -> String {
        match self {
            DigestAlgorithm::Md5 => hex::encode(Md5::digest(input)),
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(input)),
        }
    }

    fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 32,
            DigestAlgorithm::Sha256 => 64,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Md5 => write!(f, "md5"),
            DigestAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            _ => Err(DomainError::configuration(format!(
                "Unknown digest algorithm: {}. Valid algorithms: md5, sha256",
                s
            ))),
        }
    }
}

/// Derives cache keys from a namespace prefix and call arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDeriver {
    algorithm: DigestAlgorithm,
    length: usize,
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self {
            algorithm: DigestAlgorithm::Md5,
            length: DEFAULT_FRAGMENT_LENGTH,
        }
    }
}

impl KeyDeriver {
    /// Creates a deriver producing 12-character MD5 fragments
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the digest algorithm
    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets the fragment length, capped at the full digest length
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length.clamp(1, self.algorithm.hex_len());
        self
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Derives `"{prefix}:{fragment}"` for the given arguments
    ///
    /// `args` serializing to an array is taken as the positional list
    /// (tuples, `Vec`s). Unit or `None` means no positional arguments and
    /// any other value is a single positional argument. `kwargs` must
    /// serialize to a map, a struct, unit or `None`.
    pub fn derive<A, K>(&self, prefix: &str, args: &A, kwargs: &K) -> Result<String, DomainError>
    where
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
    {
        if prefix.is_empty() {
            return Err(DomainError::validation("Cache key prefix must not be empty"));
        }

        let text = canonical_text(args, kwargs)?;
        let digest = self.algorithm.hex_digest(text.as_bytes());
        let length = self.length.min(digest.len());

        Ok(format!("{}:{}", prefix, &digest[..length]))
    }
}

/// Derives a key with the default deriver (MD5, 12 hex characters)
pub fn derive_key<A, K>(prefix: &str, args: &A, kwargs: &K) -> Result<String, DomainError>
where
    A: Serialize + ?Sized,
    K: Serialize + ?Sized,
{
    KeyDeriver::default().derive(prefix, args, kwargs)
}

/// Renders the canonical text that is hashed into a key
pub fn canonical_text<A, K>(args: &A, kwargs: &K) -> Result<String, DomainError>
where
    A: Serialize + ?Sized,
    K: Serialize + ?Sized,
{
    let positional = match serde_json::to_value(args)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };

    let named = match serde_json::to_value(kwargs)? {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(DomainError::serialization(format!(
                "Named arguments must serialize to a map, got {}",
                value_kind(&other)
            )));
        }
    };

    let mut document = Map::new();
    document.insert("args".to_string(), Value::Array(positional));
    document.insert("kwargs".to_string(), Value::Object(named));

    let canonical = sort_keys(Value::Object(document));

    let mut buf = Vec::with_capacity(128);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter);
    canonical.serialize(&mut serializer)?;

    String::from_utf8(buf).map_err(|e| DomainError::serialization(e.to_string()))
}

// Rebuilds objects with their entries inserted in key order so the output is
// sorted whichever map backs `serde_json::Map`.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, sort_keys(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// JSON formatter matching the separators and escaping of the key format
struct CanonicalFormatter;

impl serde_json::ser::Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(float_repr(value).as_bytes())
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];

        for ch in fragment.chars() {
            // DEL is ASCII but still escaped
            if (' '..='~').contains(&ch) {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }

        Ok(())
    }
}

/// Shortest round-trip float text, fixed notation for decimal exponents in
/// `-4..16`, otherwise `d.ddde+XX`
fn float_repr(value: f64) -> String {
    let sign = if value.is_sign_negative() { "-" } else { "" };
    let scientific = format!("{:e}", value.abs());

    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return format!("{}{}", sign, scientific);
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let point = exponent + 1;

    if !(-4 < point && point <= 16) {
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}{}e{}{:02}", sign, mantissa, exp_sign, exponent.abs());
    }

    let fixed = if point <= 0 {
        format!("0.{}{}", "0".repeat(point.unsigned_abs() as usize), digits)
    } else {
        let point = point as usize;
        if point >= digits.len() {
            format!("{}{}.0", digits, "0".repeat(point - digits.len()))
        } else {
            format!("{}.{}", &digits[..point], &digits[point..])
        }
    };

    format!("{}{}", sign, fixed)
}
