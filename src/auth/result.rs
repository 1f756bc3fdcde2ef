//! Final result type delivered by every token-issuing command.

// self
use crate::{
	_prelude::*,
	auth::{Account, ScopeSet, TokenSecret},
};

/// Tokens and identity returned by a successful acquisition.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthenticationResult {
	/// Issued access token.
	pub access_token: TokenSecret,
	/// Issued id token, when the scope set included OIDC scopes.
	pub id_token: Option<TokenSecret>,
	/// Account the tokens were issued for.
	pub account: Account,
	/// Scopes the provider actually granted.
	pub granted_scopes: ScopeSet,
	/// Access token expiry instant.
	pub expires_at: OffsetDateTime,
	/// Correlation id of the command that produced this result.
	pub correlation_id: Uuid,
}
impl AuthenticationResult {
	/// Returns true when the access token is still valid at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at
	}
}
impl Debug for AuthenticationResult {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticationResult")
			.field("access_token", &"<redacted>")
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("account", &self.account)
			.field("granted_scopes", &self.granted_scopes)
			.field("expires_at", &self.expires_at)
			.field("correlation_id", &self.correlation_id)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn debug_output_redacts_tokens() {
		let result = AuthenticationResult {
			access_token: TokenSecret::new("at-secret"),
			id_token: Some(TokenSecret::new("idt-secret")),
			account: Account::new("uid.tid", "user@contoso.com", "login.microsoftonline.com", "tid"),
			granted_scopes: ScopeSet::new(["user.read"])
				.expect("Scope fixture should be valid."),
			expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
			correlation_id: Uuid::new_v4(),
		};
		let rendered = format!("{result:?}");

		assert!(!rendered.contains("at-secret"));
		assert!(!rendered.contains("idt-secret"));
		assert!(rendered.contains("user@contoso.com"));
	}
}
