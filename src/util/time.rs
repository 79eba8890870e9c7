//! Millisecond-resolution timestamp helpers, used for resync back-off and
//! diagnostics, in the same spirit as `garage_util::time`.
use chrono::{TimeZone, Utc};

pub fn now_msec() -> u64 {
	use std::time::{SystemTime, UNIX_EPOCH};
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("system clock is before the Unix epoch")
		.as_millis() as u64
}

pub fn msec_to_rfc3339(msec: u64) -> String {
	Utc.timestamp_millis_opt(msec as i64)
		.single()
		.map(|t| t.to_rfc3339())
		.unwrap_or_else(|| "invalid timestamp".into())
}
