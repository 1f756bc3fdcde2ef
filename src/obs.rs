//! Optional observability helpers for engine commands.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `token_engine.command` with the `command`
//!   (operation) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `token_engine_command_total` counter for every
//!   attempt/success/failure/cancellation, labeled by `command` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Command kinds observed by the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
	/// Interactive (user-facing) token acquisition.
	Interactive,
	/// Silent (cache/refresh) token acquisition.
	Silent,
	/// Account removal.
	RemoveAccount,
	/// Account enumeration.
	LoadAccounts,
	/// Shared-device current-account lookup.
	CurrentAccount,
}
impl CommandKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CommandKind::Interactive => "interactive",
			CommandKind::Silent => "silent",
			CommandKind::RemoveAccount => "remove_account",
			CommandKind::LoadAccounts => "load_accounts",
			CommandKind::CurrentAccount => "current_account",
		}
	}

	/// Returns true for the kind scheduled on the single-flight interactive lane.
	pub const fn is_interactive(self) -> bool {
		matches!(self, CommandKind::Interactive)
	}
}
impl Display for CommandKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandOutcome {
	/// Entry into the dispatcher.
	Attempt,
	/// Definitive success delivered to the caller.
	Success,
	/// Typed error delivered to the caller.
	Failure,
	/// Interactive command resolved through UI teardown.
	Cancelled,
}
impl CommandOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CommandOutcome::Attempt => "attempt",
			CommandOutcome::Success => "success",
			CommandOutcome::Failure => "failure",
			CommandOutcome::Cancelled => "cancelled",
		}
	}
}
impl Display for CommandOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
