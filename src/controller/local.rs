//! Local controller: runs the authorization protocol in-process.
//!
//! Interactive acquisitions walk the authorization-code + PKCE handshake
//! through the injected UI surface; silent acquisitions are satisfied from the
//! token cache or a refresh grant. Every path resolves the target authority and
//! passes the issuer-trust check before any token-endpoint call.

// std
use std::collections::BTreeMap;
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{
	_prelude::*,
	auth::{
		Account, AuthenticationResult, InteractiveParameters, LoadAccountsParameters,
		RemoveAccountParameters, ScopeSet, SilentParameters, TokenSecret,
	},
	authority::{Authority, AuthorityResolver},
	cache::{CacheQuery, CredentialRecord, TokenCache},
	controller::{
		Capability, Controller, ControllerFuture, ControllerOutcome, session,
		session::AuthorizationSession, unsupported,
	},
	dispatch::RedirectRouter,
	error::{ServiceError, ServiceErrorKind, UiRequiredError},
	http::{ExchangeClient, ExchangeRequest, ExchangeResponse},
	ui::{AuthorizationDescriptor, AuthorizationOutcome, AuthorizationUi, UiError},
};

const CAPABILITIES: &[Capability] = &[
	Capability::AcquireTokenInteractive,
	Capability::AcquireTokenSilent,
	Capability::RemoveAccount,
	Capability::LoadAccounts,
];
/// Applied when a provider omits `expires_in` from a token response.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3_600;

/// In-process protocol backend over the resolver, exchange client, and cache.
pub struct LocalController {
	client_id: String,
	redirect_uri: Url,
	default_authority: String,
	resolver: AuthorityResolver,
	exchange: ExchangeClient,
	cache: Arc<dyn TokenCache>,
	ui: Option<Arc<dyn AuthorizationUi>>,
	router: Arc<RedirectRouter>,
}
impl LocalController {
	/// Creates a local controller over the provided collaborators.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		client_id: impl Into<String>,
		redirect_uri: Url,
		default_authority: impl Into<String>,
		resolver: AuthorityResolver,
		exchange: ExchangeClient,
		cache: Arc<dyn TokenCache>,
		ui: Option<Arc<dyn AuthorizationUi>>,
		router: Arc<RedirectRouter>,
	) -> Self {
		Self {
			client_id: client_id.into(),
			redirect_uri,
			default_authority: default_authority.into(),
			resolver,
			exchange,
			cache,
			ui,
			router,
		}
	}

	/// Resolves an authority string and fails fast unless it is trusted.
	async fn resolve_trusted(&self, raw: Option<&str>) -> Result<(Authority, Url)> {
		let authority = self.resolver.resolve(raw.unwrap_or(&self.default_authority))?;

		self.resolver.known_authority_result(&authority).await.into_result()?;

		let issuer = self.resolver.canonicalize(&authority);

		Ok((authority, issuer))
	}

	// None marks a cancelled UI round trip.
	async fn interactive(
		&self,
		parameters: &InteractiveParameters,
	) -> Result<Option<AuthenticationResult>> {
		let Some(ui) = &self.ui else {
			return Err(UiError::new("No authorization UI surface is installed").into());
		};
		let (authority, issuer) = self.resolve_trusted(parameters.authority.as_deref()).await?;
		let slice = match &authority {
			Authority::AzureAd { slice, .. } => slice.clone(),
			_ => None,
		};
		let session = AuthorizationSession::start(
			&issuer,
			&self.client_id,
			&self.redirect_uri,
			parameters,
			slice.as_deref(),
		);
		// Register before presenting so an immediate completion cannot race the
		// waiting command.
		let continuation = self.router.register(parameters.correlation_id);

		if let Err(e) = ui.present(AuthorizationDescriptor {
			authorize_url: session.authorize_url.clone(),
			redirect_uri: self.redirect_uri.clone(),
			correlation_id: parameters.correlation_id,
		}) {
			self.router.abandon(parameters.correlation_id);

			return Err(e.into());
		}

		let response = match continuation.await {
			Ok(AuthorizationOutcome::Completed(response)) => response,
			// A dropped sender means the surface went away without reporting.
			Ok(AuthorizationOutcome::Cancelled) | Err(_) => return Ok(None),
		};

		session.validate_state(&response.state)?;

		let mut form = BTreeMap::new();

		form.insert("grant_type".to_owned(), "authorization_code".to_owned());
		form.insert("client_id".to_owned(), self.client_id.clone());
		form.insert("code".to_owned(), response.code);
		form.insert("redirect_uri".to_owned(), self.redirect_uri.to_string());
		form.insert("code_verifier".to_owned(), session.verifier().to_owned());
		form.insert("scope".to_owned(), parameters.scopes.normalized());

		if let Some(claims) = &parameters.claims
			&& !claims.is_empty()
		{
			form.insert("claims".to_owned(), claims.to_json());
		}

		let payload = self.token_exchange(&issuer, form, parameters.correlation_id).await?;
		let account = account_from_response(&payload, &authority.host(), parameters.account.as_ref())?
			.with_authority_url(issuer.as_str());
		let (result, record) = self.assemble(
			payload,
			account,
			&parameters.scopes,
			&issuer,
			parameters.correlation_id,
		)?;

		self.cache.save(record).await?;
		ensure_full_grant(&parameters.scopes, &result, &issuer)?;

		Ok(Some(result))
	}

	// None marks an account this controller does not own.
	async fn silent(
		&self,
		parameters: &SilentParameters,
	) -> Result<Option<AuthenticationResult>> {
		let raw_authority = parameters
			.authority
			.clone()
			.or_else(|| parameters.account.authority_url.clone());
		let (authority, issuer) = self.resolve_trusted(raw_authority.as_deref()).await?;
		let query = CacheQuery::new(&self.client_id, parameters.scopes.clone())
			.with_account(parameters.account.clone())
			.with_authority_url(issuer.as_str());
		let records = self.cache.find(&query).await?;
		let Some(record) = records.into_iter().max_by_key(|record| record.issued_at) else {
			let owned = self
				.cache
				.accounts()
				.await?
				.iter()
				.any(|known| known.same_account(&parameters.account));

			if !owned {
				return Ok(None);
			}

			return Err(UiRequiredError::NoTokensFound.into());
		};
		let now = OffsetDateTime::now_utc();
		// A claims request always forces a fresh issuance; cached tokens cannot
		// carry claims they were not minted with.
		let needs_refresh =
			parameters.force_refresh || parameters.claims.is_some() || !record.is_active_at(now);

		if !needs_refresh {
			return Ok(Some(result_from_record(record, parameters.correlation_id)));
		}

		let Some(refresh_token) = record.refresh_token.clone() else {
			return Err(UiRequiredError::NoTokensFound.into());
		};
		let mut form = BTreeMap::new();

		form.insert("grant_type".to_owned(), "refresh_token".to_owned());
		form.insert("client_id".to_owned(), self.client_id.clone());
		form.insert("refresh_token".to_owned(), refresh_token.expose().to_owned());
		form.insert("scope".to_owned(), parameters.scopes.normalized());

		if let Some(claims) = &parameters.claims
			&& !claims.is_empty()
		{
			form.insert("claims".to_owned(), claims.to_json());
		}

		let payload = self.token_exchange(&issuer, form, parameters.correlation_id).await?;
		let account =
			account_from_response(&payload, &authority.host(), Some(&parameters.account))?
				.with_authority_url(issuer.as_str());
		let (result, mut updated) = self.assemble(
			payload,
			account,
			&parameters.scopes,
			&issuer,
			parameters.correlation_id,
		)?;

		// Providers that do not rotate keep the prior refresh token alive.
		if updated.refresh_token.is_none() {
			updated.refresh_token = Some(refresh_token);
		}

		self.cache.save(updated).await?;
		ensure_full_grant(&parameters.scopes, &result, &issuer)?;

		Ok(Some(result))
	}

	async fn token_exchange(
		&self,
		issuer: &Url,
		form: BTreeMap<String, String>,
		correlation_id: Uuid,
	) -> Result<TokenResponsePayload> {
		let request =
			ExchangeRequest::form_post(session::endpoint(issuer, "oauth2/v2.0/token"), &form)
				.with_header("client-request-id", correlation_id.to_string());
		let response = self.exchange.send(request).await?;

		parse_token_response(response, correlation_id)
	}

	fn assemble(
		&self,
		payload: TokenResponsePayload,
		account: Account,
		requested: &ScopeSet,
		issuer: &Url,
		correlation_id: Uuid,
	) -> Result<(AuthenticationResult, CredentialRecord)> {
		// A response without a scope list grants exactly what was requested.
		let granted = match &payload.scope {
			Some(scope) => ScopeSet::from_str(scope).map_err(|_| {
				Error::from(
					ServiceError::new(
						ServiceErrorKind::Unknown,
						"Token response carried a malformed scope list",
					)
					.with_correlation_id(correlation_id),
				)
			})?,
			None => requested.clone(),
		};
		let issued_at = OffsetDateTime::now_utc();
		let expires_at = issued_at + Duration::seconds(payload.expires_in);
		let mut builder =
			CredentialRecord::builder(&self.client_id, account.clone(), issuer.as_str(), granted.clone())
				.access_token(TokenSecret::new(payload.access_token.clone()))
				.issued_at(issued_at)
				.expires_at(expires_at);

		if let Some(refresh_token) = &payload.refresh_token {
			builder = builder.refresh_token(TokenSecret::new(refresh_token.clone()));
		}
		if let Some(id_token) = &payload.id_token {
			builder = builder.id_token(TokenSecret::new(id_token.clone()));
		}

		let record = builder.build().map_err(|source| {
			Error::from(
				ServiceError::new(ServiceErrorKind::Unknown, source.to_string())
					.with_correlation_id(correlation_id),
			)
		})?;
		let result = AuthenticationResult {
			access_token: TokenSecret::new(payload.access_token),
			id_token: payload.id_token.map(TokenSecret::new),
			account,
			granted_scopes: granted,
			expires_at,
			correlation_id,
		};

		Ok((result, record))
	}
}
impl Controller for LocalController {
	fn name(&self) -> &'static str {
		"local"
	}

	fn capabilities(&self) -> &'static [Capability] {
		CAPABILITIES
	}

	fn acquire_token_interactive<'a>(
		&'a self,
		parameters: &'a InteractiveParameters,
	) -> ControllerFuture<'a, AuthenticationResult> {
		Box::pin(async move {
			match self.interactive(parameters).await {
				Ok(Some(result)) => ControllerOutcome::ok(result),
				Ok(None) => ControllerOutcome::Cancelled,
				Err(e) => ControllerOutcome::Resolved(Err(e)),
			}
		})
	}

	fn acquire_token_silent<'a>(
		&'a self,
		parameters: &'a SilentParameters,
	) -> ControllerFuture<'a, AuthenticationResult> {
		Box::pin(async move {
			match self.silent(parameters).await {
				Ok(Some(result)) => ControllerOutcome::ok(result),
				Ok(None) => ControllerOutcome::NotOwned,
				Err(e) => ControllerOutcome::Resolved(Err(e)),
			}
		})
	}

	fn remove_account<'a>(
		&'a self,
		parameters: &'a RemoveAccountParameters,
	) -> ControllerFuture<'a, ()> {
		Box::pin(async move {
			let owned = match self.cache.accounts().await {
				Ok(accounts) =>
					accounts.iter().any(|known| known.same_account(&parameters.account)),
				Err(e) => return ControllerOutcome::err(e),
			};

			if !owned {
				return ControllerOutcome::NotOwned;
			}

			match self.cache.remove(&parameters.account).await {
				Ok(()) => ControllerOutcome::ok(()),
				Err(e) => ControllerOutcome::err(e),
			}
		})
	}

	fn load_accounts<'a>(
		&'a self,
		_: &'a LoadAccountsParameters,
	) -> ControllerFuture<'a, Vec<Account>> {
		Box::pin(async move {
			match self.cache.accounts().await {
				Ok(accounts) => ControllerOutcome::ok(accounts),
				Err(e) => ControllerOutcome::err(e),
			}
		})
	}

	fn current_account<'a>(
		&'a self,
		_: &'a LoadAccountsParameters,
	) -> ControllerFuture<'a, Option<Account>> {
		unsupported(Capability::GetCurrentAccount)
	}
}
impl Debug for LocalController {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LocalController")
			.field("client_id", &self.client_id)
			.field("redirect_uri", &self.redirect_uri)
			.field("default_authority", &self.default_authority)
			.finish()
	}
}

/// Success shape returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponsePayload {
	access_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	id_token: Option<String>,
	#[serde(default = "default_expires_in")]
	expires_in: i64,
	#[serde(default)]
	scope: Option<String>,
	#[serde(default)]
	client_info: Option<String>,
}

/// Error shape returned by the token endpoint.
#[derive(Debug, Default, Deserialize)]
struct TokenErrorPayload {
	#[serde(default)]
	error: String,
	#[serde(default)]
	error_description: Option<String>,
}

/// Subset of id-token claims the engine reads for account identity.
#[derive(Debug, Default, Deserialize)]
struct IdTokenClaims {
	#[serde(default)]
	oid: Option<String>,
	#[serde(default)]
	sub: Option<String>,
	#[serde(default)]
	tid: Option<String>,
	#[serde(default)]
	preferred_username: Option<String>,
}

/// `client_info` payload carried alongside AAD token responses.
#[derive(Debug, Deserialize)]
struct ClientInfoPayload {
	uid: String,
	utid: String,
}

const fn default_expires_in() -> i64 {
	DEFAULT_EXPIRES_IN_SECS
}

fn parse_token_response(
	response: ExchangeResponse,
	correlation_id: Uuid,
) -> Result<TokenResponsePayload> {
	if response.is_success() {
		let mut deserializer = serde_json::Deserializer::from_str(&response.body);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
			ServiceError::new(
				ServiceErrorKind::Unknown,
				format!("Token endpoint returned malformed JSON: {source}"),
			)
			.with_status(response.status)
			.with_correlation_id(correlation_id)
			.into()
		})
	} else {
		let failure: TokenErrorPayload =
			serde_json::from_str(&response.body).unwrap_or_default();

		Err(map_protocol_error(failure, response.status, correlation_id))
	}
}

fn map_protocol_error(failure: TokenErrorPayload, status: u16, correlation_id: Uuid) -> Error {
	let description = failure
		.error_description
		.unwrap_or_else(|| "Token endpoint rejected the request".to_owned());

	match failure.error.as_str() {
		// Interaction-required families must stay distinct so callers can
		// escalate to an interactive command.
		"invalid_grant" | "interaction_required" | "login_required" | "consent_required" =>
			UiRequiredError::InvalidGrant { description }.into(),
		"invalid_request" => service(ServiceErrorKind::InvalidRequest, description, status, correlation_id),
		"unauthorized_client" =>
			service(ServiceErrorKind::UnauthorizedClient, description, status, correlation_id),
		"access_denied" => service(ServiceErrorKind::AccessDenied, description, status, correlation_id),
		"invalid_scope" => service(ServiceErrorKind::InvalidScope, description, status, correlation_id),
		_ => service(ServiceErrorKind::Unknown, description, status, correlation_id),
	}
}

fn service(kind: ServiceErrorKind, description: String, status: u16, correlation_id: Uuid) -> Error {
	ServiceError::new(kind, description).with_status(status).with_correlation_id(correlation_id).into()
}

/// Derives the owning account from a token response.
///
/// Preference order: id-token claims, the `client_info` companion payload, then
/// the account the request was pinned to.
fn account_from_response(
	payload: &TokenResponsePayload,
	environment: &str,
	fallback: Option<&Account>,
) -> Result<Account> {
	if let Some(id_token) = &payload.id_token
		&& let Some(claims) = decode_jwt_claims(id_token)
		&& let Some(uid) = claims.oid.or(claims.sub)
	{
		let realm = claims.tid.unwrap_or_default();
		let home_account_id =
			if realm.is_empty() { uid.clone() } else { format!("{uid}.{realm}") };

		return Ok(Account::new(
			home_account_id,
			claims.preferred_username.unwrap_or_default(),
			environment,
			realm,
		));
	}
	if let Some(client_info) = &payload.client_info
		&& let Some(info) = decode_client_info(client_info)
	{
		let username =
			fallback.map(|account| account.username.clone()).unwrap_or_default();

		return Ok(Account::new(
			format!("{}.{}", info.uid, info.utid),
			username,
			environment,
			info.utid,
		));
	}
	if let Some(account) = fallback {
		return Ok(account.clone());
	}

	Err(ServiceError::new(
		ServiceErrorKind::Unknown,
		"Token response carried no account identity",
	)
	.into())
}

fn decode_jwt_claims(token: &str) -> Option<IdTokenClaims> {
	let payload = token.split('.').nth(1)?;
	let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;

	serde_json::from_slice(&bytes).ok()
}

fn decode_client_info(client_info: &str) -> Option<ClientInfoPayload> {
	let bytes = URL_SAFE_NO_PAD.decode(client_info.trim_end_matches('=')).ok()?;

	serde_json::from_slice(&bytes).ok()
}

fn result_from_record(record: CredentialRecord, correlation_id: Uuid) -> AuthenticationResult {
	AuthenticationResult {
		access_token: record.access_token,
		id_token: record.id_token,
		account: record.account,
		granted_scopes: record.scopes,
		expires_at: record.expires_at,
		correlation_id,
	}
}

/// Raises [`Error::DeclinedScope`] when the grant only partially covers the
/// request, carrying a ready-to-dispatch silent retry for the granted subset.
fn ensure_full_grant(requested: &ScopeSet, result: &AuthenticationResult, issuer: &Url) -> Result<()> {
	let declined = requested.difference(&result.granted_scopes);

	if declined.is_empty() {
		return Ok(());
	}

	let silent_retry = SilentParameters::new(result.granted_scopes.clone(), result.account.clone())
		.with_authority(issuer.as_str());

	Err(Error::DeclinedScope {
		granted: result.granted_scopes.clone(),
		declined,
		silent_retry: Box::new(silent_retry),
	})
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::BTreeMap;
	// self
	use super::*;

	fn response(status: u16, body: &str) -> ExchangeResponse {
		ExchangeResponse { status, headers: BTreeMap::new(), body: body.to_owned() }
	}

	fn encode_jwt(payload: &str) -> String {
		format!(
			"{}.{}.signature",
			URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
			URL_SAFE_NO_PAD.encode(payload),
		)
	}

	#[test]
	fn success_payload_parses_with_defaults() {
		let payload = parse_token_response(
			response(200, r#"{"access_token":"at","scope":"openid user.read"}"#),
			Uuid::new_v4(),
		)
		.expect("Minimal token response should parse.");

		assert_eq!(payload.access_token, "at");
		assert_eq!(payload.expires_in, DEFAULT_EXPIRES_IN_SECS);
		assert!(payload.refresh_token.is_none());
	}

	#[test]
	fn invalid_grant_maps_to_ui_required() {
		let err = parse_token_response(
			response(400, r#"{"error":"invalid_grant","error_description":"expired"}"#),
			Uuid::new_v4(),
		)
		.expect_err("Protocol rejection should map to an error.");

		assert!(matches!(err, Error::UiRequired(UiRequiredError::InvalidGrant { .. })));
	}

	#[test]
	fn unknown_protocol_errors_carry_the_status() {
		let err = parse_token_response(
			response(418, r#"{"error":"brand_new_code"}"#),
			Uuid::new_v4(),
		)
		.expect_err("Protocol rejection should map to an error.");
		let Error::Service(service) = err else {
			panic!("Expected a service error.");
		};

		assert_eq!(service.kind, ServiceErrorKind::Unknown);
		assert_eq!(service.status, Some(418));
	}

	#[test]
	fn account_identity_prefers_id_token_claims() {
		let id_token = encode_jwt(
			r#"{"oid":"uid-1","tid":"tid-1","sub":"sub-1","preferred_username":"user@contoso.com"}"#,
		);
		let payload = TokenResponsePayload {
			access_token: "at".into(),
			refresh_token: None,
			id_token: Some(id_token),
			expires_in: 3600,
			scope: None,
			client_info: None,
		};
		let account = account_from_response(&payload, "login.microsoftonline.com", None)
			.expect("Account should derive from id-token claims.");

		assert_eq!(account.home_account_id, "uid-1.tid-1");
		assert_eq!(account.realm, "tid-1");
		assert_eq!(account.username, "user@contoso.com");
	}

	#[test]
	fn account_identity_falls_back_to_client_info_then_request_account() {
		let client_info = URL_SAFE_NO_PAD.encode(r#"{"uid":"uid-2","utid":"tid-2"}"#);
		let payload = TokenResponsePayload {
			access_token: "at".into(),
			refresh_token: None,
			id_token: None,
			expires_in: 3600,
			scope: None,
			client_info: Some(client_info),
		};
		let account = account_from_response(&payload, "login.microsoftonline.com", None)
			.expect("Account should derive from client_info.");

		assert_eq!(account.home_account_id, "uid-2.tid-2");

		let pinned =
			Account::new("uid-3.tid-3", "user@contoso.com", "login.microsoftonline.com", "tid-3");
		let bare = TokenResponsePayload {
			access_token: "at".into(),
			refresh_token: None,
			id_token: None,
			expires_in: 3600,
			scope: None,
			client_info: None,
		};

		assert_eq!(
			account_from_response(&bare, "login.microsoftonline.com", Some(&pinned))
				.expect("Pinned account should back-fill identity."),
			pinned,
		);
		assert!(account_from_response(&bare, "login.microsoftonline.com", None).is_err());
	}

	#[test]
	fn partial_grants_raise_declined_scope_with_a_silent_retry() {
		let requested = ScopeSet::new(["openid", "user.read", "calendars.read"])
			.expect("Requested scope fixture should be valid.");
		let granted =
			ScopeSet::new(["openid", "user.read"]).expect("Granted scope fixture should be valid.");
		let issuer = Url::parse("https://login.microsoftonline.com/common")
			.expect("Issuer fixture should parse.");
		let result = AuthenticationResult {
			access_token: TokenSecret::new("at"),
			id_token: None,
			account: Account::new(
				"uid.tid",
				"user@contoso.com",
				"login.microsoftonline.com",
				"tid",
			),
			granted_scopes: granted.clone(),
			expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
			correlation_id: Uuid::new_v4(),
		};

		assert!(ensure_full_grant(&granted, &result, &issuer).is_ok());

		let err = ensure_full_grant(&requested, &result, &issuer)
			.expect_err("Partial grant should raise DeclinedScope.");
		let Error::DeclinedScope { granted: reported, declined, silent_retry } = err else {
			panic!("Expected a declined-scope error.");
		};

		assert_eq!(reported, granted);
		assert_eq!(declined, vec!["calendars.read".to_owned()]);
		assert_eq!(silent_retry.scopes, granted);
		assert_eq!(
			silent_retry.authority.as_deref(),
			Some("https://login.microsoftonline.com/common"),
		);
	}
}
