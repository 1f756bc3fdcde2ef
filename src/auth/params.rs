//! Operation parameter sets bound to commands at submission time.

// std
use std::collections::BTreeMap;
// self
use crate::{
	_prelude::*,
	auth::{Account, ScopeSet},
	claims::ClaimsRequest,
	error::ArgumentError,
};

/// UI behavior requested for an interactive flow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
	/// Always show the account picker.
	#[default]
	SelectAccount,
	/// Force fresh credential entry.
	Login,
	/// Force the consent dialog.
	Consent,
	/// Never show UI; fail if interaction would be needed.
	None,
}
impl Prompt {
	/// Returns the wire value sent on the authorization request.
	pub const fn as_str(self) -> &'static str {
		match self {
			Prompt::SelectAccount => "select_account",
			Prompt::Login => "login",
			Prompt::Consent => "consent",
			Prompt::None => "none",
		}
	}
}

/// Parameters for an interactive (user-facing) token acquisition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InteractiveParameters {
	/// Requested scope set.
	pub scopes: ScopeSet,
	/// Authority override; the engine default applies when absent.
	pub authority: Option<String>,
	/// Pre-fills the login field without pinning an account.
	pub login_hint: Option<String>,
	/// Pins the flow to an already-known account.
	pub account: Option<Account>,
	/// Additional claims to embed in issued tokens.
	pub claims: Option<ClaimsRequest>,
	/// UI behavior hint.
	pub prompt: Prompt,
	/// Extra query parameters appended to the authorization request.
	pub extra_query_parameters: BTreeMap<String, String>,
	/// Correlation id generated once per command and threaded through every call.
	pub correlation_id: Uuid,
}
impl InteractiveParameters {
	/// Creates interactive parameters for the provided scope set.
	pub fn new(scopes: ScopeSet) -> Self {
		Self {
			scopes,
			authority: None,
			login_hint: None,
			account: None,
			claims: None,
			prompt: Prompt::default(),
			extra_query_parameters: BTreeMap::new(),
			correlation_id: Uuid::new_v4(),
		}
	}

	/// Overrides the authority for this request.
	pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
		self.authority = Some(authority.into());

		self
	}

	/// Pre-fills the login field.
	pub fn with_login_hint(mut self, hint: impl Into<String>) -> Self {
		self.login_hint = Some(hint.into());

		self
	}

	/// Pins the flow to a known account.
	pub fn with_account(mut self, account: Account) -> Self {
		self.account = Some(account);

		self
	}

	/// Attaches a claims request.
	pub fn with_claims(mut self, claims: ClaimsRequest) -> Self {
		self.claims = Some(claims);

		self
	}

	/// Overrides the prompt behavior.
	pub fn with_prompt(mut self, prompt: Prompt) -> Self {
		self.prompt = prompt;

		self
	}

	/// Appends an extra query parameter to the authorization request.
	pub fn with_extra_query_parameter(
		mut self,
		key: impl Into<String>,
		value: impl Into<String>,
	) -> Self {
		self.extra_query_parameters.insert(key.into(), value.into());

		self
	}

	/// Overrides the generated correlation id.
	pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
		self.correlation_id = correlation_id;

		self
	}

	/// Validates the parameter set before any network call is issued.
	pub fn validate(&self) -> Result<(), ArgumentError> {
		if self.scopes.is_empty() {
			return Err(ArgumentError::EmptyScopes);
		}

		Ok(())
	}
}

/// Parameters for a silent (cache/refresh) token acquisition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SilentParameters {
	/// Requested scope set.
	pub scopes: ScopeSet,
	/// Account the tokens must belong to.
	pub account: Account,
	/// Authority override; the account's recorded authority applies when absent.
	pub authority: Option<String>,
	/// Additional claims to embed in issued tokens.
	pub claims: Option<ClaimsRequest>,
	/// Bypasses cached access tokens when true.
	pub force_refresh: bool,
	/// Correlation id generated once per command and threaded through every call.
	pub correlation_id: Uuid,
}
impl SilentParameters {
	/// Creates silent parameters for the provided scope set and account.
	pub fn new(scopes: ScopeSet, account: Account) -> Self {
		Self {
			scopes,
			account,
			authority: None,
			claims: None,
			force_refresh: false,
			correlation_id: Uuid::new_v4(),
		}
	}

	/// Overrides the authority for this request.
	pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
		self.authority = Some(authority.into());

		self
	}

	/// Attaches a claims request.
	pub fn with_claims(mut self, claims: ClaimsRequest) -> Self {
		self.claims = Some(claims);

		self
	}

	/// Forces a refresh even when a valid access token is cached.
	pub fn force_refresh(mut self) -> Self {
		self.force_refresh = true;

		self
	}

	/// Overrides the generated correlation id.
	pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
		self.correlation_id = correlation_id;

		self
	}

	/// Validates the parameter set before any network call is issued.
	pub fn validate(&self) -> Result<(), ArgumentError> {
		if self.scopes.is_empty() {
			return Err(ArgumentError::EmptyScopes);
		}
		if self.account.home_account_id.is_empty() {
			return Err(ArgumentError::MissingAccount);
		}

		Ok(())
	}
}

/// Parameters for removing an account from the owning store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoveAccountParameters {
	/// Account to remove.
	pub account: Account,
	/// Correlation id generated once per command.
	pub correlation_id: Uuid,
}
impl RemoveAccountParameters {
	/// Creates removal parameters for the provided account.
	pub fn new(account: Account) -> Self {
		Self { account, correlation_id: Uuid::new_v4() }
	}

	/// Validates the parameter set before any backend is consulted.
	pub fn validate(&self) -> Result<(), ArgumentError> {
		if self.account.home_account_id.is_empty() {
			return Err(ArgumentError::MissingAccount);
		}

		Ok(())
	}
}

/// Parameters for enumerating known accounts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoadAccountsParameters {
	/// Correlation id generated once per command.
	pub correlation_id: Uuid,
}
impl LoadAccountsParameters {
	/// Creates enumeration parameters with a fresh correlation id.
	pub fn new() -> Self {
		Self { correlation_id: Uuid::new_v4() }
	}
}
impl Default for LoadAccountsParameters {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn account() -> Account {
		Account::new("uid.tid", "user@contoso.com", "login.microsoftonline.com", "tid")
	}

	#[test]
	fn empty_scopes_fail_validation() {
		let params = InteractiveParameters::new(ScopeSet::default());

		assert_eq!(params.validate(), Err(ArgumentError::EmptyScopes));

		let silent = SilentParameters::new(ScopeSet::default(), account());

		assert_eq!(silent.validate(), Err(ArgumentError::EmptyScopes));
	}

	#[test]
	fn silent_requires_a_resolved_account() {
		let scopes = ScopeSet::new(["user.read"]).expect("Scope fixture should be valid.");
		let mut params = SilentParameters::new(scopes, account());

		params.account.home_account_id.clear();

		assert_eq!(params.validate(), Err(ArgumentError::MissingAccount));
	}

	#[test]
	fn remove_account_requires_a_resolved_account() {
		let mut params = RemoveAccountParameters::new(account());

		assert_eq!(params.validate(), Ok(()));

		params.account.home_account_id.clear();

		assert_eq!(params.validate(), Err(ArgumentError::MissingAccount));
	}

	#[test]
	fn correlation_id_is_generated_once_and_overridable() {
		let scopes = ScopeSet::new(["user.read"]).expect("Scope fixture should be valid.");
		let params = InteractiveParameters::new(scopes);
		let pinned = Uuid::new_v4();

		assert_ne!(params.correlation_id, Uuid::nil());

		let params = params.with_correlation_id(pinned);

		assert_eq!(params.correlation_id, pinned);
	}
}
