//! Token-cache collaborator contract and built-in in-process implementation.
//!
//! The engine depends only on find/save/remove/accounts plus read-after-write
//! visibility within a process; encryption-at-rest and on-disk formats belong
//! to the embedding application's cache implementation.

pub mod memory;
pub mod record;

pub use memory::InMemoryTokenCache;
pub use record::*;

// self
use crate::{
	_prelude::*,
	auth::{Account, ScopeSet},
};

/// Boxed future returned by [`TokenCache`] operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + 'a + Send>>;

/// Credential store contract implemented by embedding applications.
///
/// Implementations must serialize concurrent writers while allowing concurrent
/// readers; each read observes a consistent snapshot.
pub trait TokenCache
where
	Self: Send + Sync,
{
	/// Returns every record matching the query.
	fn find<'a>(&'a self, query: &'a CacheQuery) -> CacheFuture<'a, Vec<CredentialRecord>>;

	/// Persists or replaces a credential record.
	fn save(&self, record: CredentialRecord) -> CacheFuture<'_, ()>;

	/// Removes every record belonging to the account.
	fn remove<'a>(&'a self, account: &'a Account) -> CacheFuture<'a, ()>;

	/// Enumerates the distinct accounts with at least one record.
	fn accounts(&self) -> CacheFuture<'_, Vec<Account>>;
}

/// Error type produced by [`TokenCache`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CacheError {
	/// Serialization failures surfaced by the backend.
	#[error("Cache serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Cache backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Lookup predicate for [`TokenCache::find`].
#[derive(Clone, Debug)]
pub struct CacheQuery {
	/// Application (client) id the record must belong to.
	pub client_id: String,
	/// Issuer the record must have been minted by, when pinned.
	pub authority_url: Option<String>,
	/// Account the record must belong to, when pinned.
	pub account: Option<Account>,
	/// Scopes the record must cover (subset match).
	pub scopes: ScopeSet,
}
impl CacheQuery {
	/// Creates a query scoped to the provided client id and scope set.
	pub fn new(client_id: impl Into<String>, scopes: ScopeSet) -> Self {
		Self { client_id: client_id.into(), authority_url: None, account: None, scopes }
	}

	/// Pins the query to an issuer.
	pub fn with_authority_url(mut self, authority_url: impl Into<String>) -> Self {
		self.authority_url = Some(authority_url.into());

		self
	}

	/// Pins the query to an account.
	pub fn with_account(mut self, account: Account) -> Self {
		self.account = Some(account);

		self
	}

	/// Returns true when the record satisfies every pinned predicate.
	pub fn matches(&self, record: &CredentialRecord) -> bool {
		if record.client_id != self.client_id {
			return false;
		}
		if let Some(authority_url) = &self.authority_url
			&& record.authority_url != *authority_url
		{
			return false;
		}
		if let Some(account) = &self.account
			&& !record.account.same_account(account)
		{
			return false;
		}

		self.scopes.is_subset_of(&record.scopes)
	}
}
