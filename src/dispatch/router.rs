//! Continuation routing for out-of-band interactive completions.

// crates.io
use tokio::sync::oneshot;
// self
use crate::{_prelude::*, obs, ui::AuthorizationOutcome};

/// Routes authorization completions back to the one command waiting on them.
///
/// The UI collaborator reports completion or cancellation keyed by the same
/// correlation id the authorization request carried; an unmatched continuation
/// is logged and discarded, never a crash.
#[derive(Debug, Default)]
pub struct RedirectRouter {
	pending: Mutex<HashMap<Uuid, oneshot::Sender<AuthorizationOutcome>>>,
}
impl RedirectRouter {
	/// Registers a waiting command and returns its continuation receiver.
	///
	/// Registering the same correlation id twice replaces the earlier entry;
	/// the superseded receiver resolves as cancelled.
	pub fn register(&self, correlation_id: Uuid) -> oneshot::Receiver<AuthorizationOutcome> {
		let (sender, receiver) = oneshot::channel();

		self.pending.lock().insert(correlation_id, sender);

		receiver
	}

	/// Delivers a continuation to the command waiting on the correlation id.
	///
	/// Returns false when no command is waiting; the continuation is discarded.
	pub fn complete(&self, correlation_id: Uuid, outcome: AuthorizationOutcome) -> bool {
		let Some(sender) = self.pending.lock().remove(&correlation_id) else {
			obs::warn_unmatched_continuation(correlation_id);

			return false;
		};

		// A closed receiver means the waiting command already resolved; the
		// continuation is stale and dropped like an unmatched one.
		sender.send(outcome).is_ok()
	}

	/// Drops a registration whose command failed before any continuation.
	pub fn abandon(&self, correlation_id: Uuid) {
		self.pending.lock().remove(&correlation_id);
	}

	/// Number of commands currently awaiting a continuation.
	pub fn pending(&self) -> usize {
		self.pending.lock().len()
	}
}
