//! Authorization UI collaborator interface.
//!
//! The engine never renders UI. An embedding application implements
//! [`AuthorizationUi`] to display the authorization request, then reports the
//! outcome back through the dispatcher's redirect router keyed by the same
//! correlation id.

// self
use crate::_prelude::*;

/// Everything a UI surface needs to run one authorization round trip.
#[derive(Clone, Debug)]
pub struct AuthorizationDescriptor {
	/// Fully-formed authorization URL to display.
	pub authorize_url: Url,
	/// Redirect URI the provider will return the user to.
	pub redirect_uri: Url,
	/// Correlation id the completion must be keyed by.
	pub correlation_id: Uuid,
}

/// Completion payload reported by the UI surface after the redirect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationResponse {
	/// Authorization code returned by the provider.
	pub code: String,
	/// State echoed back by the provider.
	pub state: String,
}

/// Terminal outcome of one authorization round trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthorizationOutcome {
	/// Provider redirected back with an authorization response.
	Completed(AuthorizationResponse),
	/// The UI surface was torn down before completion.
	Cancelled,
}

/// Failure raised when the UI surface cannot display the request.
#[derive(Debug, ThisError)]
#[error("UI surface failed to present the authorization request: {message}.")]
pub struct UiError {
	/// Surface-supplied failure summary.
	pub message: String,
}
impl UiError {
	/// Creates a presentation failure with the provided summary.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// UI collaborator displaying authorization requests.
pub trait AuthorizationUi
where
	Self: Send + Sync,
{
	/// Displays the authorization request to the user.
	///
	/// Completion arrives separately through the redirect router; this call
	/// only starts the round trip.
	fn present(&self, descriptor: AuthorizationDescriptor) -> Result<(), UiError>;
}
