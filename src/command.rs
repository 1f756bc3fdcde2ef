//! Command model: one logical operation bound to parameters, context, and an
//! ordered candidate-controller list.

// self
use crate::{
	_prelude::*,
	auth::{
		InteractiveParameters, LoadAccountsParameters, RemoveAccountParameters, SilentParameters,
	},
	controller::Controller,
	obs::CommandKind,
};

/// Lifecycle states a command moves through.
///
/// `Created → Queued → Running → {Succeeded, Failed, Cancelled}`; the three
/// terminal states are mutually exclusive and entered exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandState {
	/// Built but not yet submitted.
	Created,
	/// Accepted by the dispatcher, waiting for its lane.
	Queued,
	/// Executing against its candidate controllers.
	Running,
	/// A controller returned a definitive success.
	Succeeded,
	/// Candidates were exhausted or a non-recoverable error occurred.
	Failed,
	/// The interactive UI surface was torn down before completion.
	Cancelled,
}
impl CommandState {
	/// Returns a stable label suitable for spans and diagnostics.
	pub const fn as_str(self) -> &'static str {
		match self {
			CommandState::Created => "created",
			CommandState::Queued => "queued",
			CommandState::Running => "running",
			CommandState::Succeeded => "succeeded",
			CommandState::Failed => "failed",
			CommandState::Cancelled => "cancelled",
		}
	}

	/// Returns true once the command can no longer change state.
	pub const fn is_terminal(self) -> bool {
		matches!(self, CommandState::Succeeded | CommandState::Failed | CommandState::Cancelled)
	}

	const fn can_advance_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(CommandState::Created, CommandState::Queued)
				| (CommandState::Queued, CommandState::Running)
				| (CommandState::Running, CommandState::Succeeded)
				| (CommandState::Running, CommandState::Failed)
				| (CommandState::Running, CommandState::Cancelled),
		)
	}
}
impl Display for CommandState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[derive(Debug)]
struct StateCell(Mutex<CommandState>);
impl StateCell {
	fn advance(&self, next: CommandState) {
		let mut state = self.0.lock();

		debug_assert!(state.can_advance_to(next), "Illegal transition {state} -> {next}.");

		if state.can_advance_to(next) {
			*state = next;
		}
	}
}

/// Read-only view of a command's state, usable after submission.
#[derive(Clone, Debug)]
pub struct CommandProbe(Arc<StateCell>);
impl CommandProbe {
	/// Current lifecycle state.
	pub fn state(&self) -> CommandState {
		*self.0.0.lock()
	}
}

/// A single logical operation scheduled through the dispatcher.
///
/// The fingerprint identifies the operation plus its parameters (excluding the
/// per-command correlation id); the dispatcher rejects a submission whose
/// fingerprint matches one already in flight.
pub struct Command {
	kind: CommandKind,
	correlation_id: Uuid,
	fingerprint: String,
	controllers: Vec<Arc<dyn Controller>>,
	state: Arc<StateCell>,
}
impl Command {
	fn new(
		kind: CommandKind,
		correlation_id: Uuid,
		fingerprint_parts: &[&str],
		controllers: Vec<Arc<dyn Controller>>,
	) -> Self {
		let mut fingerprint = kind.as_str().to_owned();

		for part in fingerprint_parts {
			fingerprint.push(':');
			fingerprint.push_str(part);
		}

		Self {
			kind,
			correlation_id,
			fingerprint,
			controllers,
			state: Arc::new(StateCell(Mutex::new(CommandState::Created))),
		}
	}

	/// Builds an interactive acquisition command.
	pub fn interactive(
		parameters: &InteractiveParameters,
		controllers: Vec<Arc<dyn Controller>>,
	) -> Self {
		let subject = parameters
			.account
			.as_ref()
			.map(|account| account.home_account_id.as_str())
			.or(parameters.login_hint.as_deref())
			.unwrap_or("-");

		Self::new(
			CommandKind::Interactive,
			parameters.correlation_id,
			&[
				&parameters.scopes.fingerprint(),
				parameters.authority.as_deref().unwrap_or("-"),
				subject,
			],
			controllers,
		)
	}

	/// Builds a silent acquisition command.
	pub fn silent(parameters: &SilentParameters, controllers: Vec<Arc<dyn Controller>>) -> Self {
		Self::new(
			CommandKind::Silent,
			parameters.correlation_id,
			&[
				&parameters.scopes.fingerprint(),
				&parameters.account.home_account_id,
				parameters.authority.as_deref().unwrap_or("-"),
				if parameters.force_refresh { "force" } else { "-" },
			],
			controllers,
		)
	}

	/// Builds an account-removal command.
	pub fn remove_account(
		parameters: &RemoveAccountParameters,
		controllers: Vec<Arc<dyn Controller>>,
	) -> Self {
		Self::new(
			CommandKind::RemoveAccount,
			parameters.correlation_id,
			&[&parameters.account.home_account_id],
			controllers,
		)
	}

	/// Builds an account-enumeration command.
	pub fn load_accounts(
		parameters: &LoadAccountsParameters,
		controllers: Vec<Arc<dyn Controller>>,
	) -> Self {
		Self::new(CommandKind::LoadAccounts, parameters.correlation_id, &[], controllers)
	}

	/// Builds a shared-device current-account command.
	pub fn current_account(
		parameters: &LoadAccountsParameters,
		controllers: Vec<Arc<dyn Controller>>,
	) -> Self {
		Self::new(CommandKind::CurrentAccount, parameters.correlation_id, &[], controllers)
	}

	/// Operation kind the command executes.
	pub fn kind(&self) -> CommandKind {
		self.kind
	}

	/// Correlation id generated once for this command.
	pub fn correlation_id(&self) -> Uuid {
		self.correlation_id
	}

	/// Duplicate-detection fingerprint (operation + parameters).
	pub fn fingerprint(&self) -> &str {
		&self.fingerprint
	}

	/// Ordered candidate controllers, local-first then broker.
	pub fn controllers(&self) -> &[Arc<dyn Controller>] {
		&self.controllers
	}

	/// Returns a read-only state probe that outlives submission.
	pub fn probe(&self) -> CommandProbe {
		CommandProbe(self.state.clone())
	}

	pub(crate) fn advance(&self, next: CommandState) {
		self.state.advance(next);
	}
}
impl Debug for Command {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Command")
			.field("kind", &self.kind)
			.field("correlation_id", &self.correlation_id)
			.field("fingerprint", &self.fingerprint)
			.field("controllers", &self.controllers.len())
			.field("state", &self.probe().state())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::{Account, ScopeSet};

	fn silent_parameters() -> SilentParameters {
		SilentParameters::new(
			ScopeSet::new(["user.read", "openid"]).expect("Scope fixture should be valid."),
			Account::new("uid.tid", "user@contoso.com", "login.microsoftonline.com", "tid"),
		)
	}

	#[test]
	fn state_machine_only_moves_forward() {
		let command = Command::silent(&silent_parameters(), Vec::new());
		let probe = command.probe();

		assert_eq!(probe.state(), CommandState::Created);

		command.advance(CommandState::Queued);
		command.advance(CommandState::Running);
		command.advance(CommandState::Succeeded);

		assert_eq!(probe.state(), CommandState::Succeeded);
		assert!(probe.state().is_terminal());
	}

	#[test]
	fn fingerprints_ignore_the_correlation_id() {
		let scopes = ScopeSet::new(["user.read"]).expect("Scope fixture should be valid.");
		let account =
			Account::new("uid.tid", "user@contoso.com", "login.microsoftonline.com", "tid");
		let first = Command::silent(
			&SilentParameters::new(scopes.clone(), account.clone()),
			Vec::new(),
		);
		let second =
			Command::silent(&SilentParameters::new(scopes, account.clone()), Vec::new());

		assert_eq!(first.fingerprint(), second.fingerprint());

		let different = Command::silent(
			&SilentParameters::new(
				ScopeSet::new(["mail.read"]).expect("Scope fixture should be valid."),
				account,
			),
			Vec::new(),
		);

		assert_ne!(first.fingerprint(), different.fingerprint());
	}

	#[test]
	fn interactive_fingerprints_distinguish_the_subject() {
		let scopes = ScopeSet::new(["user.read"]).expect("Scope fixture should be valid.");
		let hinted = Command::interactive(
			&InteractiveParameters::new(scopes.clone()).with_login_hint("a@contoso.com"),
			Vec::new(),
		);
		let other = Command::interactive(
			&InteractiveParameters::new(scopes).with_login_hint("b@contoso.com"),
			Vec::new(),
		);

		assert_ne!(hinted.fingerprint(), other.fingerprint());
	}
}
