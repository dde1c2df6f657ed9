//! Cached credential (token plus expiry) for one downstream service.

// self
use crate::{
	_prelude::*,
	auth::{ServiceName, TokenSecret},
};

/// Token issued for a downstream service together with its expiry instant.
///
/// A credential is always fully populated: the only constructor requires both the token and the
/// expiry, and refreshes replace the whole value rather than patching fields.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Downstream service the token is scoped to.
	pub service: ServiceName,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Instant the token response was received.
	pub issued_at: OffsetDateTime,
	/// Instant after which the token must not be reused.
	pub expires_at: OffsetDateTime,
}
impl Credential {
	/// Creates a credential from its parts.
	pub fn new(
		service: ServiceName,
		access_token: impl Into<TokenSecret>,
		issued_at: OffsetDateTime,
		expires_at: OffsetDateTime,
	) -> Self {
		Self { service, access_token: access_token.into(), issued_at, expires_at }
	}

	/// Returns `true` once `instant` reaches the expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns `true` when the credential is expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` when the credential must be refreshed at `instant`, treating the last
	/// `skew` of its lifetime as already expired.
	pub fn needs_refresh_at(&self, instant: OffsetDateTime, skew: Duration) -> bool {
		match instant.checked_add(skew) {
			Some(shifted) => self.is_expired_at(shifted),
			None => true,
		}
	}

	/// Lifetime left at `instant`, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("service", &self.service)
			.field("access_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
