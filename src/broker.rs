//! Broker IPC contract: message model, version negotiation, and error mapping.
//!
//! The broker is a separate trusted process that centrally manages accounts
//! for every app on a device. Its presence and advertised capability are
//! injected values ([`BrokerAvailability`]); the engine never hard-codes
//! discovery mechanics. Requests carry an operation name plus serialized
//! parameters; replies carry either a payload or a tagged error code that maps
//! into the engine taxonomy.

// crates.io
use serde_json::Value as JsonValue;
// self
use crate::{
	_prelude::*,
	auth::{Account, AuthenticationResult, ScopeSet, TokenSecret},
	error::{ServiceError, ServiceErrorKind, UiRequiredError},
};

/// Reply tag marking an account the broker does not own.
///
/// This tag is the one broker error that is not definitive: the dispatcher
/// advances to the next candidate controller instead of failing the command.
pub const ACCOUNT_NOT_OWNED: &str = "account_not_owned";

/// Operations the engine can delegate across the IPC boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerOperation {
	/// Interactive token acquisition.
	AcquireTokenInteractive,
	/// Silent token acquisition.
	AcquireTokenSilent,
	/// Account removal.
	RemoveAccount,
	/// Account enumeration.
	LoadAccounts,
	/// Shared-device current-account lookup.
	GetCurrentAccount,
}
impl BrokerOperation {
	/// Returns the wire name of the operation.
	pub const fn as_str(self) -> &'static str {
		match self {
			BrokerOperation::AcquireTokenInteractive => "acquire_token_interactive",
			BrokerOperation::AcquireTokenSilent => "acquire_token_silent",
			BrokerOperation::RemoveAccount => "remove_account",
			BrokerOperation::LoadAccounts => "load_accounts",
			BrokerOperation::GetCurrentAccount => "get_current_account",
		}
	}
}

/// Request message sent to the broker process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerRequest {
	/// Operation the broker must execute.
	pub operation: BrokerOperation,
	/// Correlation id of the originating command.
	pub correlation_id: Uuid,
	/// Operation parameters, serialized as JSON.
	pub payload: JsonValue,
}

/// Reply message returned by the broker process.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BrokerReply {
	/// Operation succeeded; payload shape depends on the operation.
	Ok {
		/// Operation result, serialized as JSON.
		#[serde(default)]
		payload: JsonValue,
	},
	/// Operation failed with a tagged code plus message.
	Error {
		/// Stable error tag.
		code: String,
		/// Human-readable failure detail.
		message: String,
	},
}

/// IPC-level failure raised by [`BrokerTransport`] implementations.
#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct BrokerTransportError {
	/// Transport-supplied failure summary.
	pub message: String,
}
impl From<BrokerTransportError> for Error {
	fn from(e: BrokerTransportError) -> Self {
		Error::BrokerCommunication { message: e.message }
	}
}

/// Boxed future returned by [`BrokerTransport::exchange`].
pub type BrokerFuture<'a> =
	Pin<Box<dyn Future<Output = Result<BrokerReply, BrokerTransportError>> + 'a + Send>>;

/// IPC boundary to the trusted broker process.
pub trait BrokerTransport
where
	Self: Send + Sync,
{
	/// Performs one request/reply exchange with the broker.
	fn exchange(&self, request: BrokerRequest) -> BrokerFuture<'_>;
}

/// Injected description of the installed broker's capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerAvailability {
	/// Protocol version the broker advertises.
	pub protocol_version: u32,
}
impl BrokerAvailability {
	/// Creates an availability record for the advertised version.
	pub fn new(protocol_version: u32) -> Self {
		Self { protocol_version }
	}

	/// Returns true when the advertised version satisfies the app's minimum.
	pub fn satisfies(&self, minimum: u32) -> bool {
		self.protocol_version >= minimum
	}
}

/// Token payload returned by broker token operations.
#[derive(Clone, Debug, Deserialize)]
pub struct BrokerTokenPayload {
	/// Issued access token.
	pub access_token: String,
	/// Issued id token, when present.
	#[serde(default)]
	pub id_token: Option<String>,
	/// Seconds until the access token expires.
	pub expires_in: i64,
	/// Scopes the broker reports as granted.
	pub granted_scopes: ScopeSet,
	/// Account the tokens belong to.
	pub account: Account,
}
impl BrokerTokenPayload {
	/// Converts the payload into an engine [`AuthenticationResult`].
	pub fn into_result(self, correlation_id: Uuid) -> AuthenticationResult {
		AuthenticationResult {
			access_token: TokenSecret::new(self.access_token),
			id_token: self.id_token.map(TokenSecret::new),
			account: self.account,
			granted_scopes: self.granted_scopes,
			expires_at: OffsetDateTime::now_utc() + Duration::seconds(self.expires_in),
			correlation_id,
		}
	}
}

/// Maps a broker error tag into the engine taxonomy.
///
/// Recognized tags translate one-to-one; anything else becomes a generic
/// service error so unknown broker versions degrade instead of crashing.
pub fn map_broker_error(code: &str, message: String, correlation_id: Uuid) -> Error {
	match code {
		"interaction_required" | "invalid_grant" | "login_required" =>
			UiRequiredError::InvalidGrant { description: message }.into(),
		"no_tokens_found" => UiRequiredError::NoTokensFound.into(),
		"invalid_request" => service(ServiceErrorKind::InvalidRequest, message, correlation_id),
		"unauthorized_client" =>
			service(ServiceErrorKind::UnauthorizedClient, message, correlation_id),
		"access_denied" => service(ServiceErrorKind::AccessDenied, message, correlation_id),
		"invalid_scope" => service(ServiceErrorKind::InvalidScope, message, correlation_id),
		"broker_unavailable" => Error::BrokerCommunication { message },
		_ => service(ServiceErrorKind::Unknown, message, correlation_id),
	}
}

fn service(kind: ServiceErrorKind, message: String, correlation_id: Uuid) -> Error {
	ServiceError::new(kind, message).with_correlation_id(correlation_id).into()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recognized_tags_map_into_the_taxonomy() {
		let correlation_id = Uuid::new_v4();

		assert!(matches!(
			map_broker_error("interaction_required", "mfa".into(), correlation_id),
			Error::UiRequired(UiRequiredError::InvalidGrant { .. }),
		));
		assert!(matches!(
			map_broker_error("access_denied", "nope".into(), correlation_id),
			Error::Service(ServiceError { kind: ServiceErrorKind::AccessDenied, .. }),
		));
		assert!(matches!(
			map_broker_error("broker_unavailable", "ipc down".into(), correlation_id),
			Error::BrokerCommunication { .. },
		));
	}

	#[test]
	fn unrecognized_tags_degrade_to_a_generic_service_error() {
		let err = map_broker_error("shiny_new_failure", "???".into(), Uuid::new_v4());

		assert!(matches!(
			err,
			Error::Service(ServiceError { kind: ServiceErrorKind::Unknown, .. }),
		));
	}

	#[test]
	fn version_negotiation_compares_against_the_minimum() {
		let availability = BrokerAvailability::new(3);

		assert!(availability.satisfies(3));
		assert!(availability.satisfies(1));
		assert!(!availability.satisfies(4));
	}

	#[test]
	fn replies_round_trip_their_tagged_form() {
		let reply = BrokerReply::Error { code: "access_denied".into(), message: "policy".into() };
		let json = serde_json::to_string(&reply).expect("Reply should serialize.");

		assert!(json.contains("\"status\":\"error\""));

		let parsed: BrokerReply = serde_json::from_str(&json).expect("Reply should deserialize.");

		assert!(matches!(parsed, BrokerReply::Error { .. }));
	}
}
