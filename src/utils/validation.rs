use std::sync::LazyLock;

use regex::Regex;

use crate::grammar;

static NAME_EXPR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^(?:{})$", grammar::name())).unwrap());

static TAG_EXPR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^(?:{})$", grammar::TAG)).unwrap());

pub fn is_valid_name(name: &str) -> bool {
    NAME_EXPR.is_match(name)
}

pub fn is_valid_tag(tag: &str) -> bool {
    TAG_EXPR.is_match(tag)
}

pub fn is_valid_digest(digest: &str) -> bool {
    digest.parse::<grammar::Digest>().is_ok()
}

/// A manifest reference in a request path is either a tag or a digest.
pub fn is_valid_reference(reference: &str) -> bool {
    is_valid_digest(reference) || is_valid_tag(reference)
}
