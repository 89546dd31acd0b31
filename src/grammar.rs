//! Reference grammar for repository names, tags and digests.
//!
//! Fragment-for-fragment rendering of the docker reference grammar. The
//! pattern functions return unanchored fragments meant to be composed
//! into larger expressions; the anchored matchers live in
//! [`crate::utils::validation`].

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use crate::error::{ErrorCode, RegistryError};

pub const ALPHA_NUMERIC: &str = "[a-z0-9]+";
pub const SEPARATOR: &str = "(?:[_.]|__|[-]*)";
pub const DOMAIN_COMPONENT: &str = "(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])";
pub const PORT_NUMBER: &str = "[0-9]+";
pub const TAG: &str = r"[\w][\w.-]{0,127}";
pub const DIGEST_ALGORITHM_SEPARATOR: &str = "[+._-]";
pub const DIGEST_ALGORITHM_COMPONENT: &str = "[A-Za-z][A-Za-z0-9]*";
pub const DIGEST_HEX: &str = "[0-9a-fA-F]{32,}";

pub fn path_component() -> String {
    format!("{ALPHA_NUMERIC}(?:{SEPARATOR}{ALPHA_NUMERIC})*")
}

pub fn domain() -> String {
    format!("{DOMAIN_COMPONENT}(?:\\.{DOMAIN_COMPONENT})*(?::{PORT_NUMBER})?")
}

/// `[domain/]path-component[/path-component...]`
pub fn name() -> String {
    let component = path_component();
    format!("(?:{}/)?{component}(?:/{component})*", domain())
}

pub fn digest_algorithm() -> String {
    format!("{DIGEST_ALGORITHM_COMPONENT}(?:{DIGEST_ALGORITHM_SEPARATOR}{DIGEST_ALGORITHM_COMPONENT})*")
}

pub fn digest() -> String {
    format!("{}:{DIGEST_HEX}", digest_algorithm())
}

/// `name[:tag][@digest]`
pub fn reference() -> String {
    format!("{}(?::{TAG})?(?:@{})?", name(), digest())
}

static DIGEST_EXPR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^({}):({DIGEST_HEX})$", digest_algorithm())).unwrap()
});

/// A parsed content address, `<algorithm>:<hex>`.
///
/// Only `sha256` digests are ever produced by this registry, but the
/// grammar accepts the full algorithm alphabet so foreign digests can at
/// least be looked up and reported as unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl FromStr for Digest {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = DIGEST_EXPR.captures(s).ok_or_else(|| {
            RegistryError::from_code(ErrorCode::DigestInvalid).with_detail(json!({ "digest": s }))
        })?;
        Ok(Digest {
            algorithm: captures[1].to_string(),
            hex: captures[2].to_string(),
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}
