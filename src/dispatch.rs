//! Command dispatcher: execution lanes, single-flight interactive semantics,
//! duplicate detection, and controller fallthrough.
//!
//! The interactive lane is a fair async mutex held for the entire multi-step
//! protocol, so a second interactive command queues strictly behind the first.
//! Silent commands each run on their own worker future with no relative
//! ordering. Every command resolves exactly once: a result, a typed error, or
//! the distinct cancellation outcome.

pub mod router;

pub use router::*;

// std
use std::{
	collections::HashSet,
	sync::atomic::{AtomicU64, Ordering},
};
// self
use crate::{
	_prelude::*,
	command::{Command, CommandState},
	controller::{Controller, ControllerOutcome},
	error::UiRequiredError,
	obs::{self, CommandOutcome, CommandSpan},
};

/// Boxed future produced by the per-candidate operation closure.
///
/// The closure owns its captures (parameters clone plus the candidate's
/// `Arc`), so the future carries no borrow of the dispatcher.
pub type DispatchFuture<T> = Pin<Box<dyn Future<Output = ControllerOutcome<T>> + Send>>;

/// Terminal resolution delivered to the caller exactly once.
///
/// Cancellation is a first-class outcome, never routed through the error path.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResolution<T> {
	/// The command produced its result.
	Completed(T),
	/// The interactive UI surface was torn down before completion.
	Cancelled,
}
impl<T> CommandResolution<T> {
	/// Returns true for the cancellation outcome.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, CommandResolution::Cancelled)
	}

	/// Returns the completed value, if any.
	pub fn into_completed(self) -> Option<T> {
		match self {
			CommandResolution::Completed(value) => Some(value),
			CommandResolution::Cancelled => None,
		}
	}
}

/// Thread-safe counters for dispatched commands.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
	attempts: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
	cancellations: AtomicU64,
}
impl DispatchMetrics {
	/// Returns the total number of submitted commands.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of commands that resolved with a result.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Returns the number of commands that resolved with a typed error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Returns the number of commands that resolved through cancellation.
	pub fn cancellations(&self) -> u64 {
		self.cancellations.load(Ordering::Relaxed)
	}

	fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	fn record_success(&self) {
		self.successes.fetch_add(1, Ordering::Relaxed);
	}

	fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	fn record_cancellation(&self) {
		self.cancellations.fetch_add(1, Ordering::Relaxed);
	}
}

/// Schedules commands onto execution lanes and delivers their resolutions.
#[derive(Default)]
pub struct CommandDispatcher {
	interactive_lane: AsyncMutex<()>,
	in_flight: Mutex<HashSet<String>>,
	router: Arc<RedirectRouter>,
	metrics: Arc<DispatchMetrics>,
}
impl CommandDispatcher {
	/// Creates a dispatcher with empty lanes.
	pub fn new() -> Self {
		Self::default()
	}

	/// Continuation router the UI collaborator reports completions through.
	pub fn router(&self) -> Arc<RedirectRouter> {
		self.router.clone()
	}

	/// In-process dispatch counters.
	pub fn metrics(&self) -> Arc<DispatchMetrics> {
		self.metrics.clone()
	}

	/// Schedules a command and resolves it exactly once.
	///
	/// `operation` invokes the command's operation on one candidate; the
	/// dispatcher owns lane placement, duplicate detection, and the
	/// fallthrough walk over the candidate list.
	pub async fn dispatch<T, Op>(
		&self,
		command: Command,
		operation: Op,
	) -> Result<CommandResolution<T>>
	where
		Op: Fn(Arc<dyn Controller>) -> DispatchFuture<T>,
	{
		let kind = command.kind();

		self.metrics.record_attempt();
		obs::record_command_outcome(kind, CommandOutcome::Attempt);

		let Some(_claim) = self.claim(command.fingerprint()) else {
			self.metrics.record_failure();
			obs::record_command_outcome(kind, CommandOutcome::Failure);

			return Err(Error::DuplicateCommand);
		};

		command.advance(CommandState::Queued);

		let span = CommandSpan::new(kind, "dispatch");
		let result = span
			.instrument(async {
				// The lane guard spans the whole protocol, pending user
				// interaction included; that is what makes interactive
				// execution single-flight and strictly FIFO.
				let _lane =
					if kind.is_interactive() { Some(self.interactive_lane.lock().await) } else { None };

				command.advance(CommandState::Running);

				run_chain(&command, &operation).await
			})
			.await;

		match &result {
			Ok(CommandResolution::Completed(_)) => {
				command.advance(CommandState::Succeeded);
				self.metrics.record_success();
				obs::record_command_outcome(kind, CommandOutcome::Success);
			},
			Ok(CommandResolution::Cancelled) => {
				command.advance(CommandState::Cancelled);
				self.metrics.record_cancellation();
				obs::record_command_outcome(kind, CommandOutcome::Cancelled);
			},
			Err(_) => {
				command.advance(CommandState::Failed);
				self.metrics.record_failure();
				obs::record_command_outcome(kind, CommandOutcome::Failure);
			},
		}

		result
	}

	fn claim(&self, fingerprint: &str) -> Option<InFlightClaim<'_>> {
		if !self.in_flight.lock().insert(fingerprint.to_owned()) {
			return None;
		}

		Some(InFlightClaim { dispatcher: self, fingerprint: fingerprint.to_owned() })
	}
}
impl Debug for CommandDispatcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CommandDispatcher")
			.field("in_flight", &self.in_flight.lock().len())
			.field("pending_continuations", &self.router.pending())
			.finish()
	}
}

/// Walks the candidate list in order until one controller resolves the command.
async fn run_chain<T, Op>(command: &Command, operation: &Op) -> Result<CommandResolution<T>>
where
	Op: Fn(Arc<dyn Controller>) -> DispatchFuture<T>,
{
	for controller in command.controllers() {
		match operation(controller.clone()).await {
			ControllerOutcome::Resolved(Ok(value)) =>
				return Ok(CommandResolution::Completed(value)),
			ControllerOutcome::Resolved(Err(e)) => return Err(e),
			ControllerOutcome::Cancelled => return Ok(CommandResolution::Cancelled),
			// Only the not-owned result advances the chain.
			ControllerOutcome::NotOwned => continue,
		}
	}

	Err(UiRequiredError::NoAccountFound.into())
}

/// Releases the command's fingerprint when the dispatch concludes.
struct InFlightClaim<'a> {
	dispatcher: &'a CommandDispatcher,
	fingerprint: String,
}
impl Drop for InFlightClaim<'_> {
	fn drop(&mut self) {
		self.dispatcher.in_flight.lock().remove(&self.fingerprint);
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::AtomicU64;
	// self
	use super::*;
	use crate::{
		auth::{
			Account, AuthenticationResult, InteractiveParameters, LoadAccountsParameters,
			RemoveAccountParameters, ScopeSet, SilentParameters, TokenSecret,
		},
		controller::{Capability, ControllerFuture, unsupported},
		error::ServiceError,
	};

	#[derive(Clone, Copy)]
	enum Script {
		Succeed,
		NotOwned,
		Fail,
		Cancel,
	}

	struct ScriptedController {
		script: Script,
		calls: AtomicU64,
	}
	impl ScriptedController {
		fn new(script: Script) -> Arc<Self> {
			Arc::new(Self { script, calls: AtomicU64::new(0) })
		}

		fn calls(&self) -> u64 {
			self.calls.load(Ordering::SeqCst)
		}

		fn result() -> AuthenticationResult {
			AuthenticationResult {
				access_token: TokenSecret::new("at"),
				id_token: None,
				account: Account::new(
					"uid.tid",
					"user@contoso.com",
					"login.microsoftonline.com",
					"tid",
				),
				granted_scopes: ScopeSet::new(["user.read"])
					.expect("Scope fixture should be valid."),
				expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
				correlation_id: Uuid::new_v4(),
			}
		}
	}
	impl Controller for ScriptedController {
		fn name(&self) -> &'static str {
			"scripted"
		}

		fn capabilities(&self) -> &'static [Capability] {
			&[Capability::AcquireTokenSilent]
		}

		fn acquire_token_interactive<'a>(
			&'a self,
			_: &'a InteractiveParameters,
		) -> ControllerFuture<'a, AuthenticationResult> {
			unsupported(Capability::AcquireTokenInteractive)
		}

		fn acquire_token_silent<'a>(
			&'a self,
			_: &'a SilentParameters,
		) -> ControllerFuture<'a, AuthenticationResult> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Box::pin(async move {
				match self.script {
					Script::Succeed => ControllerOutcome::ok(Self::result()),
					Script::NotOwned => ControllerOutcome::NotOwned,
					Script::Fail => ControllerOutcome::err(ServiceError::new(
						crate::error::ServiceErrorKind::AccessDenied,
						"denied",
					)),
					Script::Cancel => ControllerOutcome::Cancelled,
				}
			})
		}

		fn remove_account<'a>(
			&'a self,
			_: &'a RemoveAccountParameters,
		) -> ControllerFuture<'a, ()> {
			unsupported(Capability::RemoveAccount)
		}

		fn load_accounts<'a>(
			&'a self,
			_: &'a LoadAccountsParameters,
		) -> ControllerFuture<'a, Vec<Account>> {
			unsupported(Capability::LoadAccounts)
		}

		fn current_account<'a>(
			&'a self,
			_: &'a LoadAccountsParameters,
		) -> ControllerFuture<'a, Option<Account>> {
			unsupported(Capability::GetCurrentAccount)
		}
	}

	fn parameters() -> SilentParameters {
		SilentParameters::new(
			ScopeSet::new(["user.read"]).expect("Scope fixture should be valid."),
			Account::new("uid.tid", "user@contoso.com", "login.microsoftonline.com", "tid"),
		)
	}

	async fn dispatch_silent(
		dispatcher: &CommandDispatcher,
		parameters: &SilentParameters,
		controllers: Vec<Arc<dyn Controller>>,
	) -> Result<CommandResolution<AuthenticationResult>> {
		let command = Command::silent(parameters, controllers);
		let parameters = parameters.clone();

		dispatcher
			.dispatch(command, move |controller| {
				let parameters = parameters.clone();

				Box::pin(async move { controller.acquire_token_silent(&parameters).await })
			})
			.await
	}

	#[tokio::test]
	async fn fallthrough_skips_to_the_next_candidate_only_on_not_owned() {
		let dispatcher = CommandDispatcher::new();
		let first = ScriptedController::new(Script::NotOwned);
		let second = ScriptedController::new(Script::Succeed);
		let parameters = parameters();
		let resolution =
			dispatch_silent(&dispatcher, &parameters, vec![first.clone(), second.clone()])
				.await
				.expect("Second candidate should resolve the command.");

		assert!(matches!(resolution, CommandResolution::Completed(_)));
		assert_eq!(first.calls(), 1);
		assert_eq!(second.calls(), 1);
		assert_eq!(dispatcher.metrics().successes(), 1);
	}

	#[tokio::test]
	async fn definitive_errors_stop_the_chain() {
		let dispatcher = CommandDispatcher::new();
		let first = ScriptedController::new(Script::Fail);
		let second = ScriptedController::new(Script::Succeed);
		let parameters = parameters();
		let err = dispatch_silent(&dispatcher, &parameters, vec![first, second.clone()])
			.await
			.expect_err("First candidate's error should be definitive.");

		assert!(matches!(err, Error::Service(_)));
		assert_eq!(second.calls(), 0);
		assert_eq!(dispatcher.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn exhausted_candidates_resolve_as_no_account_found() {
		let dispatcher = CommandDispatcher::new();
		let parameters = parameters();
		let err = dispatch_silent(
			&dispatcher,
			&parameters,
			vec![
				ScriptedController::new(Script::NotOwned),
				ScriptedController::new(Script::NotOwned),
			],
		)
		.await
		.expect_err("Exhausted chain should fail.");

		assert!(matches!(err, Error::UiRequired(UiRequiredError::NoAccountFound)));
	}

	#[tokio::test]
	async fn cancellation_is_a_distinct_outcome_not_an_error() {
		let dispatcher = CommandDispatcher::new();
		let parameters = parameters();
		let resolution =
			dispatch_silent(&dispatcher, &parameters, vec![ScriptedController::new(Script::Cancel)])
				.await
				.expect("Cancellation resolves the command without an error.");

		assert!(resolution.is_cancelled());
		assert_eq!(dispatcher.metrics().cancellations(), 1);
		assert_eq!(dispatcher.metrics().failures(), 0);
	}

	#[tokio::test]
	async fn duplicate_fingerprints_are_rejected_while_in_flight() {
		let dispatcher = Arc::new(CommandDispatcher::new());
		let gate = Arc::new(tokio::sync::Notify::new());

		struct GatedController {
			gate: Arc<tokio::sync::Notify>,
			entered: AtomicU64,
		}
		impl Controller for GatedController {
			fn name(&self) -> &'static str {
				"gated"
			}

			fn capabilities(&self) -> &'static [Capability] {
				&[Capability::AcquireTokenSilent]
			}

			fn acquire_token_interactive<'a>(
				&'a self,
				_: &'a InteractiveParameters,
			) -> ControllerFuture<'a, AuthenticationResult> {
				unsupported(Capability::AcquireTokenInteractive)
			}

			fn acquire_token_silent<'a>(
				&'a self,
				_: &'a SilentParameters,
			) -> ControllerFuture<'a, AuthenticationResult> {
				self.entered.fetch_add(1, Ordering::SeqCst);

				Box::pin(async move {
					self.gate.notified().await;

					ControllerOutcome::ok(ScriptedController::result())
				})
			}

			fn remove_account<'a>(
				&'a self,
				_: &'a RemoveAccountParameters,
			) -> ControllerFuture<'a, ()> {
				unsupported(Capability::RemoveAccount)
			}

			fn load_accounts<'a>(
				&'a self,
				_: &'a LoadAccountsParameters,
			) -> ControllerFuture<'a, Vec<Account>> {
				unsupported(Capability::LoadAccounts)
			}

			fn current_account<'a>(
				&'a self,
				_: &'a LoadAccountsParameters,
			) -> ControllerFuture<'a, Option<Account>> {
				unsupported(Capability::GetCurrentAccount)
			}
		}

		let gated = Arc::new(GatedController { gate: gate.clone(), entered: AtomicU64::new(0) });
		let controller: Arc<dyn Controller> = gated.clone();
		let parameters = parameters();
		let running = {
			let dispatcher = dispatcher.clone();
			let parameters = parameters.clone();
			let controller = controller.clone();

			tokio::spawn(async move {
				dispatch_silent(&dispatcher, &parameters, vec![controller]).await
			})
		};

		// Let the first command reach its controller before the duplicate lands.
		while gated.entered.load(Ordering::SeqCst) == 0 {
			tokio::task::yield_now().await;
		}

		let duplicate = dispatch_silent(&dispatcher, &parameters, vec![controller.clone()])
			.await
			.expect_err("In-flight fingerprint should reject the duplicate.");

		assert!(matches!(duplicate, Error::DuplicateCommand));

		gate.notify_one();

		running
			.await
			.expect("Dispatch task should not panic.")
			.expect("Gated command should resolve.");

		// The fingerprint is released once the first command resolves.
		gate.notify_one();
		dispatch_silent(&dispatcher, &parameters, vec![controller])
			.await
			.expect("Resubmission after resolution should run.");
	}
}
