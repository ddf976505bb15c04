//! Anonymous contributor tags for shared pool uploads.
//!
//! The tag is a 32-bit string hash of the uploader's network address. It is
//! a coarse "who contributed" label for statistics, not an identity and not
//! an authentication mechanism: collisions are possible and addresses behind
//! the same proxy share a tag.

/// Address used when the request carries no forwarding headers.
pub const ANONYMOUS_ADDRESS: &str = "anonymous";

/// Pick the client address from forwarding headers:
/// first `x-forwarded-for` entry, then `x-real-ip`, then `anonymous`.
pub fn client_address<'a>(forwarded_for: Option<&'a str>, real_ip: Option<&'a str>) -> &'a str {
    if let Some(forwarded) = forwarded_for.filter(|v| !v.is_empty()) {
        return forwarded.split(',').next().unwrap_or(forwarded);
    }
    real_ip
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_ADDRESS)
}

/// `contrib_<n>` where n is |h| of the classic `h = h * 31 + c` hash over
/// UTF-16 code units with 32-bit wraparound.
pub fn contributor_id(address: &str) -> String {
    let mut hash: i32 = 0;
    for unit in address.encode_utf16() {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit));
    }
    format!("contrib_{}", hash.unsigned_abs())
}
