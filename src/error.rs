//! Engine-level error taxonomy shared across controllers, dispatch, and resolvers.

// self
use crate::{_prelude::*, auth::SilentParameters};

/// Engine-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical engine error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Caller supplied invalid or incomplete parameters.
	#[error(transparent)]
	Argument(#[from] ArgumentError),
	/// Authority string could not be parsed into a typed descriptor.
	#[error(transparent)]
	MalformedAuthority(#[from] MalformedAuthorityError),
	/// Authority is neither developer-configured nor discovered as trusted.
	#[error("Authority `{authority}` is not a known issuer.")]
	UnknownAuthority {
		/// Authority URL that failed the trust check.
		authority: String,
	},
	/// Transport-level failure (timeout, exhausted retry, IO).
	#[error(transparent)]
	Network(#[from] NetworkError),
	/// Token endpoint or broker rejected the request at the protocol level.
	#[error(transparent)]
	Service(#[from] ServiceError),
	/// Silent path cannot proceed without user interaction.
	#[error(transparent)]
	UiRequired(#[from] UiRequiredError),
	/// Token cache failure surfaced by the external store.
	#[error("{0}")]
	Cache(
		#[from]
		#[source]
		crate::cache::CacheError,
	),
	/// UI surface could not present the authorization request.
	#[error("{0}")]
	Ui(
		#[from]
		#[source]
		crate::ui::UiError,
	),

	/// Provider granted only part of the requested scope set.
	#[error("Provider declined scopes: {}.", declined.join(" "))]
	DeclinedScope {
		/// Scopes the provider actually granted.
		granted: crate::auth::ScopeSet,
		/// Scopes the provider refused to issue.
		declined: Vec<String>,
		/// Ready-to-dispatch silent parameters covering the granted subset.
		silent_retry: Box<SilentParameters>,
	},
	/// Broker protocol version does not satisfy the app's minimum.
	#[error("Broker protocol version {advertised} does not satisfy the required minimum {required}.")]
	UnsupportedBroker {
		/// Minimum protocol version the app accepts.
		required: u32,
		/// Version the installed broker advertises.
		advertised: u32,
	},
	/// IPC exchange with the broker process failed.
	#[error("Broker communication failed: {message}.")]
	BrokerCommunication {
		/// Transport-supplied failure summary.
		message: String,
	},
	/// An identical command is already in flight.
	#[error("An identical command is already in flight.")]
	DuplicateCommand,
	/// Selected controller does not implement the requested operation.
	#[error("No eligible controller supports {operation}.")]
	NotSupported {
		/// Stable operation label.
		operation: &'static str,
	},
}

/// Parameter validation failures raised before any network call.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ArgumentError {
	/// Token-issuing operations require at least one scope.
	#[error("Scopes must be non-empty for token operations.")]
	EmptyScopes,
	/// Operation requires a resolved account.
	#[error("Operation requires an account.")]
	MissingAccount,
	/// Scope entries failed normalization.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
}

/// Authority parsing failures.
#[derive(Debug, ThisError)]
pub enum MalformedAuthorityError {
	/// The authority string is not a valid URL.
	#[error("Authority URL could not be parsed.")]
	InvalidUrl {
		/// Underlying parser failure.
		#[source]
		source: url::ParseError,
	},
	/// Authorities must be reachable over HTTPS.
	#[error("Authority URL must use the https scheme, got `{scheme}`.")]
	InsecureScheme {
		/// Scheme found on the input URL.
		scheme: String,
	},
	/// The authority URL carries no host component.
	#[error("Authority URL is missing a host.")]
	MissingHost,
	/// B2C authorities require a policy path segment.
	#[error("B2C authority is missing tenant/policy path segments.")]
	MissingPolicy,
}

/// Transport failures surfaced after the exchange client's retry budget is spent.
#[derive(Debug, ThisError)]
pub enum NetworkError {
	/// Connect or read deadline elapsed on every attempt.
	#[error("Request timed out after {attempts} attempt(s).")]
	Timeout {
		/// Total attempts issued before giving up.
		attempts: u8,
	},
	/// Retry budget exhausted on a retryable status (500/503/504).
	#[error("Service unavailable after retry (last status {status}).")]
	ServiceUnavailable {
		/// Last status observed from the endpoint.
		status: u16,
	},
	/// Transport-level IO failure (DNS, TCP, TLS).
	#[error("I/O failure during the exchange.")]
	Io {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
}
impl NetworkError {
	/// Wraps a transport-specific failure as an IO error.
	pub fn io(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Io { source: Box::new(src) }
	}
}

/// Protocol-level rejection category reported by a token endpoint or broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceErrorKind {
	/// Request was malformed or missing required fields.
	InvalidRequest,
	/// Client is not authorized for the grant.
	UnauthorizedClient,
	/// Resource owner or provider denied the request.
	AccessDenied,
	/// Requested scope is invalid or unknown.
	InvalidScope,
	/// Unrecognized provider error code.
	Unknown,
}
impl ServiceErrorKind {
	/// Returns a stable label suitable for spans and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			ServiceErrorKind::InvalidRequest => "invalid_request",
			ServiceErrorKind::UnauthorizedClient => "unauthorized_client",
			ServiceErrorKind::AccessDenied => "access_denied",
			ServiceErrorKind::InvalidScope => "invalid_scope",
			ServiceErrorKind::Unknown => "unknown",
		}
	}
}
impl Display for ServiceErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Structured protocol rejection carrying the observed HTTP status.
#[derive(Clone, Debug, ThisError)]
#[error("Service rejected the request ({kind}{}): {description}.", status.map(|s| format!(", status {s}")).unwrap_or_default())]
pub struct ServiceError {
	/// Canonical rejection category.
	pub kind: ServiceErrorKind,
	/// HTTP status code, when the rejection came over HTTP.
	pub status: Option<u16>,
	/// Provider- or broker-supplied description.
	pub description: String,
	/// Correlation id of the command that hit the rejection.
	pub correlation_id: Option<Uuid>,
}
impl ServiceError {
	/// Builds a service error without HTTP context.
	pub fn new(kind: ServiceErrorKind, description: impl Into<String>) -> Self {
		Self { kind, status: None, description: description.into(), correlation_id: None }
	}

	/// Attaches the HTTP status observed alongside the rejection.
	pub fn with_status(mut self, status: u16) -> Self {
		self.status = Some(status);

		self
	}

	/// Attaches the originating command's correlation id.
	pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
		self.correlation_id = Some(correlation_id);

		self
	}
}

/// Conditions a silent command cannot recover from without user interaction.
///
/// Callers branch on this family to decide whether to escalate to an
/// interactive command reusing the same scopes/authority/account.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum UiRequiredError {
	/// Refresh grant was rejected; the cached session is no longer valid.
	#[error("Refresh grant was rejected; interaction is required: {description}.")]
	InvalidGrant {
		/// Provider-supplied rejection detail.
		description: String,
	},
	/// No cached credentials satisfy the request.
	#[error("No cached tokens satisfy the request; interaction is required.")]
	NoTokensFound,
	/// No controller owns a matching account.
	#[error("No matching account is available; interaction is required.")]
	NoAccountFound,
}
