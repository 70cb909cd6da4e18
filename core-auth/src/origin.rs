//! Expected-origin derivation for result messages.
//!
//! The redirect page that posts the result lives at the `redirect_uri` the
//! authorization URL carries, so its origin is the only one allowed to
//! settle the handshake.

use url::{Origin, Url};

/// Query parameters that may carry the redirect target, in lookup order.
const REDIRECT_PARAMS: &[&str] = &["redirect_uri", "redirect_url"];

/// Origin of the redirect target embedded in `auth_url`.
///
/// Returns `None` when the URL cannot be parsed, carries no redirect target,
/// or the target has an opaque origin.
pub fn expected_origin(auth_url: &str) -> Option<String> {
    let url = Url::parse(auth_url).ok()?;

    let redirect = REDIRECT_PARAMS.iter().find_map(|param| {
        url.query_pairs()
            .find(|(key, _)| key == *param)
            .map(|(_, value)| value.into_owned())
    })?;

    let target = Url::parse(&redirect).ok()?;
    match target.origin() {
        origin @ Origin::Tuple(..) => Some(origin.ascii_serialization()),
        Origin::Opaque(_) => None,
    }
}

/// Whether a message from `actual` may settle a handshake expecting `expected`.
pub fn origin_allowed(expected: Option<&str>, actual: &str) -> bool {
    match expected {
        None => true,
        Some(expected) => expected.eq_ignore_ascii_case(actual.trim_end_matches('/')),
    }
}
