//! Controller capability model and the backends that execute commands.
//!
//! A controller executes one operation end-to-end against a chosen backend.
//! [`LocalController`] runs the protocol in-process; [`BrokerController`]
//! delegates across an IPC boundary to a trusted external process. Each
//! controller declares its capability set, and [`ControllerFactory`] offers only
//! controllers whose capabilities satisfy the requested operation.

pub mod broker;
pub mod factory;
pub mod local;
mod session;

pub use broker::BrokerController;
pub use factory::{BrokerPolicy, ControllerFactory};
pub use local::LocalController;

// self
use crate::{
	_prelude::*,
	auth::{
		Account, AuthenticationResult, InteractiveParameters, LoadAccountsParameters,
		RemoveAccountParameters, SilentParameters,
	},
};

/// Operations a controller can execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
	/// Interactive (user-facing) token acquisition.
	AcquireTokenInteractive,
	/// Silent (cache/refresh) token acquisition.
	AcquireTokenSilent,
	/// Account removal.
	RemoveAccount,
	/// Account enumeration.
	LoadAccounts,
	/// Shared-device current-account lookup.
	GetCurrentAccount,
}
impl Capability {
	/// Returns a stable operation label for errors, spans, and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Capability::AcquireTokenInteractive => "acquire_token_interactive",
			Capability::AcquireTokenSilent => "acquire_token_silent",
			Capability::RemoveAccount => "remove_account",
			Capability::LoadAccounts => "load_accounts",
			Capability::GetCurrentAccount => "get_current_account",
		}
	}
}
impl Display for Capability {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome of one controller attempt within a command's candidate chain.
///
/// A definitive success or error stops the chain; [`NotOwned`](Self::NotOwned)
/// advances to the next candidate; [`Cancelled`](Self::Cancelled) resolves the
/// command through the distinct cancellation terminal state.
#[derive(Debug)]
pub enum ControllerOutcome<T> {
	/// Definitive result, success or typed error.
	Resolved(Result<T>),
	/// The interactive UI surface was torn down before completion.
	Cancelled,
	/// The account is not owned by this controller; the next candidate runs.
	NotOwned,
}
impl<T> ControllerOutcome<T> {
	/// Wraps a definitive success.
	pub fn ok(value: T) -> Self {
		Self::Resolved(Ok(value))
	}

	/// Wraps a definitive error.
	pub fn err(error: impl Into<Error>) -> Self {
		Self::Resolved(Err(error.into()))
	}
}
impl<T> From<Result<T>> for ControllerOutcome<T> {
	fn from(result: Result<T>) -> Self {
		Self::Resolved(result)
	}
}

/// Boxed future returned by [`Controller`] operations.
pub type ControllerFuture<'a, T> =
	Pin<Box<dyn Future<Output = ControllerOutcome<T>> + 'a + Send>>;

/// Backend capable of executing commands end-to-end.
///
/// Implementations must resolve every invoked operation exactly once and must
/// answer unsupported operations with [`Error::NotSupported`] rather than
/// panicking; [`unsupported`] builds that reply.
pub trait Controller
where
	Self: Send + Sync,
{
	/// Stable backend name for spans and fallthrough diagnostics.
	fn name(&self) -> &'static str;

	/// Operations this backend can execute.
	fn capabilities(&self) -> &'static [Capability];

	/// Returns true when the backend can execute the operation.
	fn supports(&self, capability: Capability) -> bool {
		self.capabilities().contains(&capability)
	}

	/// Runs the full interactive protocol and returns issued tokens.
	fn acquire_token_interactive<'a>(
		&'a self,
		parameters: &'a InteractiveParameters,
	) -> ControllerFuture<'a, AuthenticationResult>;

	/// Satisfies the request from cache or a refresh grant, without UI.
	fn acquire_token_silent<'a>(
		&'a self,
		parameters: &'a SilentParameters,
	) -> ControllerFuture<'a, AuthenticationResult>;

	/// Removes the account from the backend that owns it.
	fn remove_account<'a>(
		&'a self,
		parameters: &'a RemoveAccountParameters,
	) -> ControllerFuture<'a, ()>;

	/// Enumerates the accounts the backend knows about.
	fn load_accounts<'a>(
		&'a self,
		parameters: &'a LoadAccountsParameters,
	) -> ControllerFuture<'a, Vec<Account>>;

	/// Returns the device's current account in shared-device mode.
	fn current_account<'a>(
		&'a self,
		parameters: &'a LoadAccountsParameters,
	) -> ControllerFuture<'a, Option<Account>>;
}

/// Builds the definitive [`Error::NotSupported`] reply for an operation.
pub fn unsupported<'a, T>(capability: Capability) -> ControllerFuture<'a, T>
where
	T: 'a + Send,
{
	Box::pin(async move {
		ControllerOutcome::err(Error::NotSupported { operation: capability.as_str() })
	})
}
