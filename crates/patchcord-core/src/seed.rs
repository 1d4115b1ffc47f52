//! Seed parsing and rendering.
//!
//! A seed is the textual specification of one endpoint:
//! `TYPE[:ADDR[,OPT(,OPT)*]]` where `OPT` is `KEY` or `KEY=VALUE`. Parsing is
//! total; whether the options make sense is each endpoint's business.

use std::collections::BTreeMap;
use std::fmt;

/// Option-map key carrying the positional address.
pub const ADDR_KEY: &str = "addr";

/// A parsed seed: a lowercased type token plus an option map.
///
/// The address lives in the option map under [`ADDR_KEY`] and is always
/// present (possibly empty). Option keys are lowercased; values are kept
/// verbatim. Duplicate keys resolve to the last occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    kind: String,
    options: BTreeMap<String, String>,
}

impl Seed {
    /// Parse a seed string. Never fails.
    pub fn parse(input: &str) -> Self {
        let (kind, rest) = match input.split_once(':') {
            Some((kind, rest)) => (kind, Some(rest)),
            None => (input, None),
        };

        let mut options = BTreeMap::new();
        options.insert(ADDR_KEY.to_string(), String::new());

        let mut seed = Seed {
            kind: kind.to_ascii_lowercase(),
            options,
        };

        if let Some(rest) = rest {
            let (addr, tail) = match rest.split_once(',') {
                Some((addr, tail)) => (addr, Some(tail)),
                None => (rest, None),
            };
            seed.options.insert(ADDR_KEY.to_string(), addr.to_string());

            if let Some(tail) = tail {
                for opt in tail.split(',') {
                    let (key, value) = match opt.split_once('=') {
                        Some((key, value)) => (key, value),
                        None => (opt, ""),
                    };
                    seed.options
                        .insert(key.to_ascii_lowercase(), value.to_string());
                }
            }
        }

        seed
    }

    /// The (canonical, once constructed) type token.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Rewrite the type token to its canonical form. Endpoint constructors
    /// call this so aliases render canonically.
    pub fn set_kind(&mut self, kind: &str) {
        self.kind = kind.to_string();
    }

    /// The positional address, possibly empty.
    pub fn addr(&self) -> &str {
        self.options
            .get(ADDR_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// All options, including `addr`, in key order.
    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Look up a single option value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

impl fmt::Display for Seed {
    /// Render as `kind:addr[,k[=v]…]`. The address is positional; valueless
    /// options render as bare keys. Output round-trips through [`Seed::parse`]
    /// to the same option map.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.addr())?;
        for (key, value) in &self.options {
            if key == ADDR_KEY {
                continue;
            }
            if value.is_empty() {
                write!(f, ",{key}")?;
            } else {
                write!(f, ",{key}={value}")?;
            }
        }
        Ok(())
    }
}
