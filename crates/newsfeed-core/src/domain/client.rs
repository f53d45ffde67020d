//! Rate-limit bucket selection.

/// Bucket shared by every request that carries neither an identity nor an origin.
///
/// All such traffic is throttled as a single client. This is intentional:
/// requests that cannot be attributed get one shared budget rather than none.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// Derive the rate-limit key for a request.
///
/// An authenticated identity wins over the network origin; with neither,
/// the request falls into [`ANONYMOUS_CLIENT`].
pub fn client_key(identity: Option<&str>, origin: Option<&str>) -> String {
    fn present(v: Option<&str>) -> Option<&str> {
        v.map(str::trim).filter(|s| !s.is_empty())
    }

    if let Some(id) = present(identity) {
        return format!("user:{id}");
    }
    if let Some(addr) = present(origin) {
        return format!("ip:{addr}");
    }
    ANONYMOUS_CLIENT.to_string()
}
