//! Optional observability helpers for token refreshes and service calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `service_auth.op` with the `op` (operation)
//!   and `stage` (call site) fields, plus debug/warn events for refresh and retry decisions.
//! - Enable `metrics` to increment the `service_auth_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Client-credentials exchange against the identity provider.
	TokenRefresh,
	/// Authenticated (or plain) call to a downstream service.
	ServiceCall,
	/// Permission lookup through the permissions client.
	PermissionCheck,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::TokenRefresh => "token_refresh",
			OpKind::ServiceCall => "service_call",
			OpKind::PermissionCheck => "permission_check",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `f` inside an [`OpSpan`] and records attempt plus success/failure outcomes around it.
pub fn observe<T, E, F>(kind: OpKind, stage: &'static str, f: F) -> Result<T, E>
where
	F: FnOnce() -> Result<T, E>,
{
	let _guard = OpSpan::new(kind, stage).entered();

	record_op_outcome(kind, OpOutcome::Attempt);

	let result = f();

	match &result {
		Ok(_) => record_op_outcome(kind, OpOutcome::Success),
		Err(_) => record_op_outcome(kind, OpOutcome::Failure),
	}

	result
}
