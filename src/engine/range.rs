// Range header parsing for the streaming relay.

/// Parse a `Range` header value into the requested start byte.
///
/// Only the open-ended form `bytes=<start>-` is honored; anything after
/// the dash is ignored. Any other unit, malformed digits, or an absent
/// header means "no range requested" and maps to `None`. Clients that
/// send closed or multi-range requests fall back to full content.
pub fn parse_range_start(header: Option<&str>) -> Option<u64> {
    let value = header?.trim();
    let rest = value.strip_prefix("bytes=")?;
    let (start, _suffix) = rest.split_once('-')?;
    start.trim().parse().ok()
}

/// Format a start byte as an open-ended upstream `Range` header value.
pub fn open_ended_range(start: u64) -> String {
    format!("bytes={}-", start)
}
