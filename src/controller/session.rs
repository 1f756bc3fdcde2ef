// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::InteractiveParameters,
	error::{ServiceError, ServiceErrorKind},
};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub(crate) fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// One interactive handshake: state, PKCE pair, and the authorize URL built
/// from them.
#[derive(Clone)]
pub(crate) struct AuthorizationSession {
	/// Opaque state value that must round-trip via the redirect handler.
	pub(crate) state: String,
	/// Fully-formed authorize URL the UI surface should display.
	pub(crate) authorize_url: Url,
	pkce: PkcePair,
}
impl AuthorizationSession {
	/// Starts a handshake for the provided issuer and parameters.
	pub(crate) fn start(
		issuer: &Url,
		client_id: &str,
		redirect_uri: &Url,
		parameters: &InteractiveParameters,
		slice: Option<&str>,
	) -> Self {
		let state = random_string(STATE_LEN);
		let pkce = PkcePair::generate();
		let authorize_url =
			build_authorize_url(issuer, client_id, redirect_uri, parameters, slice, &state, &pkce);

		Self { state, authorize_url, pkce }
	}

	/// PKCE code verifier sent on the token exchange.
	pub(crate) fn verifier(&self) -> &str {
		&self.pkce.verifier
	}

	/// Validates the returned `state` parameter after the authorization redirect.
	pub(crate) fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state {
			Ok(())
		} else {
			Err(ServiceError::new(
				ServiceErrorKind::InvalidRequest,
				"Authorization state mismatch",
			)
			.into())
		}
	}
}
impl Debug for AuthorizationSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationSession")
			.field("state", &self.state)
			.field("authorize_url", &self.authorize_url)
			.field("code_challenge", &self.pkce.challenge)
			.field("code_challenge_method", &self.pkce.method)
			.finish()
	}
}

#[derive(Clone)]
struct PkcePair {
	verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}
}

fn build_authorize_url(
	issuer: &Url,
	client_id: &str,
	redirect_uri: &Url,
	parameters: &InteractiveParameters,
	slice: Option<&str>,
	state: &str,
	pkce: &PkcePair,
) -> Url {
	let mut url = endpoint(issuer, "oauth2/v2.0/authorize");

	{
		let mut pairs = url.query_pairs_mut();

		pairs.append_pair("response_type", "code");
		pairs.append_pair("client_id", client_id);
		pairs.append_pair("redirect_uri", redirect_uri.as_str());
		pairs.append_pair("scope", &parameters.scopes.normalized());
		pairs.append_pair("state", state);
		pairs.append_pair("code_challenge", &pkce.challenge);
		pairs.append_pair("code_challenge_method", pkce.method.as_str());
		pairs.append_pair("prompt", parameters.prompt.as_str());
		pairs.append_pair("client-request-id", &parameters.correlation_id.to_string());

		if let Some(hint) = &parameters.login_hint {
			pairs.append_pair("login_hint", hint);
		}
		if let Some(claims) = &parameters.claims
			&& !claims.is_empty()
		{
			pairs.append_pair("claims", &claims.to_json());
		}
		if let Some(slice) = slice {
			pairs.append_pair("slice", slice);
		}

		for (key, value) in &parameters.extra_query_parameters {
			pairs.append_pair(key, value);
		}
	}

	url
}

/// Joins a protocol endpoint path onto a canonical issuer URL.
pub(crate) fn endpoint(issuer: &Url, path: &str) -> Url {
	// The issuer came out of authority resolution, so recomposition cannot fail.
	Url::parse(&format!("{}/{path}", issuer.as_str().trim_end_matches('/')))
		.unwrap_or_else(|_| issuer.clone())
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(verifier.as_bytes());
	let digest = hasher.finalize();
	URL_SAFE_NO_PAD.encode(digest)
}
