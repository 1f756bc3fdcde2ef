//! Credential record structs, lifecycle helpers, and builder.

// self
use crate::{
	_prelude::*,
	auth::{Account, ScopeSet, TokenSecret},
};

/// Errors produced by [`CredentialRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Immutable record describing credentials issued for one client/account/scope
/// combination.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
	/// Application (client) id the tokens were issued to.
	pub client_id: String,
	/// Account the tokens belong to.
	pub account: Account,
	/// Canonical issuer that minted the tokens.
	pub authority_url: String,
	/// Scopes granted on the record.
	pub scopes: ScopeSet,
	/// Access token secret.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Id token secret, if the scope set included OIDC scopes.
	pub id_token: Option<TokenSecret>,
	/// Issued-at instant recorded from the provider response.
	pub issued_at: OffsetDateTime,
	/// Expiry instant derived from issued_at plus expires_in or absolute expiry.
	pub expires_at: OffsetDateTime,
}
impl CredentialRecord {
	/// Returns a builder for the mandatory identity fields.
	pub fn builder(
		client_id: impl Into<String>,
		account: Account,
		authority_url: impl Into<String>,
		scopes: ScopeSet,
	) -> CredentialRecordBuilder {
		CredentialRecordBuilder {
			client_id: client_id.into(),
			account,
			authority_url: authority_url.into(),
			scopes,
			access_token: None,
			refresh_token: None,
			id_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Returns true when the access token has expired at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns true when the access token can still satisfy requests at `instant`.
	pub fn is_active_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.issued_at && !self.is_expired_at(instant)
	}
}
impl Debug for CredentialRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialRecord")
			.field("client_id", &self.client_id)
			.field("account", &self.account)
			.field("authority_url", &self.authority_url)
			.field("scopes", &self.scopes)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`CredentialRecord`].
#[derive(Clone, Debug)]
pub struct CredentialRecordBuilder {
	client_id: String,
	account: Account,
	authority_url: String,
	scopes: ScopeSet,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	id_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CredentialRecordBuilder {
	/// Provides the access token.
	pub fn access_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.access_token = Some(token.into());

		self
	}

	/// Provides the refresh token.
	pub fn refresh_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(token.into());

		self
	}

	/// Provides the id token.
	pub fn id_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.id_token = Some(token.into());

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`CredentialRecord`].
	pub fn build(self) -> Result<CredentialRecord, CredentialRecordBuilderError> {
		let access_token =
			self.access_token.ok_or(CredentialRecordBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(CredentialRecordBuilderError::MissingExpiry),
		};

		Ok(CredentialRecord {
			client_id: self.client_id,
			account: self.account,
			authority_url: self.authority_url,
			scopes: self.scopes,
			access_token,
			refresh_token: self.refresh_token,
			id_token: self.id_token,
			issued_at,
			expires_at,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn builder() -> CredentialRecordBuilder {
		CredentialRecord::builder(
			"client-1",
			Account::new("uid.tid", "user@contoso.com", "login.microsoftonline.com", "tid"),
			"https://login.microsoftonline.com/common",
			ScopeSet::new(["user.read"]).expect("Scope fixture should be valid."),
		)
	}

	#[test]
	fn builder_requires_access_token_and_expiry() {
		assert_eq!(
			builder().issued_at(OffsetDateTime::now_utc()).expires_in(Duration::hours(1)).build().err(),
			Some(CredentialRecordBuilderError::MissingAccessToken),
		);
		assert_eq!(
			builder().access_token(TokenSecret::new("at")).build().err(),
			Some(CredentialRecordBuilderError::MissingExpiry),
		);
	}

	#[test]
	fn relative_expiry_derives_from_issued_at() {
		let record = builder()
			.access_token(TokenSecret::new("at"))
			.issued_at(macros::datetime!(2025-06-01 00:00 UTC))
			.expires_in(Duration::minutes(90))
			.build()
			.expect("Relative expiry record should build.");

		assert_eq!(record.expires_at, macros::datetime!(2025-06-01 01:30 UTC));
	}

	#[test]
	fn activity_window_tracks_the_clock() {
		let record = builder()
			.access_token(TokenSecret::new("at"))
			.issued_at(macros::datetime!(2025-06-01 00:00 UTC))
			.expires_at(macros::datetime!(2025-06-01 01:00 UTC))
			.build()
			.expect("Windowed record should build.");

		assert!(!record.is_active_at(macros::datetime!(2025-05-31 23:59 UTC)));
		assert!(record.is_active_at(macros::datetime!(2025-06-01 00:30 UTC)));
		assert!(record.is_expired_at(macros::datetime!(2025-06-01 01:00 UTC)));
	}

	#[test]
	fn debug_output_redacts_secrets() {
		let record = builder()
			.access_token(TokenSecret::new("at-value"))
			.refresh_token(TokenSecret::new("rt-value"))
			.expires_in(Duration::hours(1))
			.build()
			.expect("Record fixture should build.");
		let rendered = format!("{record:?}");

		assert!(!rendered.contains("at-value"));
		assert!(!rendered.contains("rt-value"));
	}
}
