//! Signed-in account identity shared between controllers and the cache.

// self
use crate::_prelude::*;

/// Identity of a signed-in user as recorded by the cache or broker.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
	/// Stable cross-tenant identifier for the account.
	pub home_account_id: String,
	/// Displayable login name (UPN or email).
	pub username: String,
	/// Cloud host that issued the account (e.g. `login.microsoftonline.com`).
	pub environment: String,
	/// Tenant the account record belongs to.
	pub realm: String,
	/// Authority recorded at acquisition time, used to recover silent requests.
	pub authority_url: Option<String>,
}
impl Account {
	/// Creates an account for the provided identifier/login pair.
	pub fn new(
		home_account_id: impl Into<String>,
		username: impl Into<String>,
		environment: impl Into<String>,
		realm: impl Into<String>,
	) -> Self {
		Self {
			home_account_id: home_account_id.into(),
			username: username.into(),
			environment: environment.into(),
			realm: realm.into(),
			authority_url: None,
		}
	}

	/// Records the authority the account was acquired against.
	pub fn with_authority_url(mut self, authority_url: impl Into<String>) -> Self {
		self.authority_url = Some(authority_url.into());

		self
	}

	/// Returns true when both records describe the same home account.
	///
	/// Identity is (home account id, environment); username and realm may drift
	/// between acquisitions without changing the underlying account.
	pub fn same_account(&self, other: &Self) -> bool {
		self.home_account_id == other.home_account_id && self.environment == other.environment
	}
}
