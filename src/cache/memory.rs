//! Thread-safe in-process [`TokenCache`] for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::Account,
	cache::{CacheFuture, CacheQuery, CredentialRecord, TokenCache},
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct RecordKey {
	client_id: String,
	home_account_id: String,
	environment: String,
	authority_url: String,
	scope_fingerprint: String,
}
impl RecordKey {
	// The key carries the issuer because `find` distinguishes records by
	// authority; tokens for the same account/client/scopes from different
	// issuers occupy separate slots.
	fn of(record: &CredentialRecord) -> Self {
		Self {
			client_id: record.client_id.clone(),
			home_account_id: record.account.home_account_id.clone(),
			environment: record.account.environment.clone(),
			authority_url: record.authority_url.clone(),
			scope_fingerprint: record.scopes.fingerprint(),
		}
	}
}

type RecordMap = Arc<RwLock<HashMap<RecordKey, CredentialRecord>>>;

/// Thread-safe cache keeping records in-process.
///
/// Writers go through the `RwLock` write half, so concurrent savers serialize
/// while readers observe a consistent snapshot, which is all the engine
/// requires of an embedding application's cache.
#[derive(Clone, Debug, Default)]
pub struct InMemoryTokenCache(RecordMap);
impl TokenCache for InMemoryTokenCache {
	fn find<'a>(&'a self, query: &'a CacheQuery) -> CacheFuture<'a, Vec<CredentialRecord>> {
		let map = self.0.clone();

		Box::pin(async move {
			Ok(map.read().values().filter(|record| query.matches(record)).cloned().collect())
		})
	}

	fn save(&self, record: CredentialRecord) -> CacheFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(RecordKey::of(&record), record);

			Ok(())
		})
	}

	fn remove<'a>(&'a self, account: &'a Account) -> CacheFuture<'a, ()> {
		let map = self.0.clone();
		let account = account.clone();

		Box::pin(async move {
			map.write().retain(|_, record| !record.account.same_account(&account));

			Ok(())
		})
	}

	fn accounts(&self) -> CacheFuture<'_, Vec<Account>> {
		let map = self.0.clone();

		Box::pin(async move {
			let mut accounts: Vec<Account> = Vec::new();

			for record in map.read().values() {
				if !accounts.iter().any(|known| known.same_account(&record.account)) {
					accounts.push(record.account.clone());
				}
			}

			Ok(accounts)
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::{ScopeSet, TokenSecret};

	fn record(account: &Account, scopes: &[&str], access: &str) -> CredentialRecord {
		CredentialRecord::builder(
			"client-1",
			account.clone(),
			"https://login.microsoftonline.com/common",
			ScopeSet::new(scopes.iter().copied()).expect("Scope fixture should be valid."),
		)
		.access_token(TokenSecret::new(access))
		.issued_at(OffsetDateTime::now_utc())
		.expires_in(Duration::hours(1))
		.build()
		.expect("Record fixture should build.")
	}

	fn account(id: &str) -> Account {
		Account::new(id, format!("{id}@contoso.com"), "login.microsoftonline.com", "tid")
	}

	#[tokio::test]
	async fn save_then_find_honors_read_after_write() {
		let cache = InMemoryTokenCache::default();
		let account = account("uid-1.tid");

		cache
			.save(record(&account, &["openid", "user.read"], "at-1"))
			.await
			.expect("Save should succeed.");

		let hits = cache
			.find(
				&CacheQuery::new(
					"client-1",
					ScopeSet::new(["user.read"]).expect("Scope fixture should be valid."),
				)
				.with_account(account),
			)
			.await
			.expect("Find should succeed.");

		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].access_token.expose(), "at-1");
	}

	#[tokio::test]
	async fn records_from_different_issuers_keep_separate_slots() {
		let cache = InMemoryTokenCache::default();
		let account = account("uid-1.tid");
		let home = "https://login.microsoftonline.com/tid";
		let guest = "https://login.microsoftonline.com/guest-tid";

		for (authority, access) in [(home, "at-home"), (guest, "at-guest")] {
			cache
				.save(
					CredentialRecord::builder(
						"client-1",
						account.clone(),
						authority,
						ScopeSet::new(["user.read"]).expect("Scope fixture should be valid."),
					)
					.access_token(TokenSecret::new(access))
					.issued_at(OffsetDateTime::now_utc())
					.expires_in(Duration::hours(1))
					.build()
					.expect("Record fixture should build."),
				)
				.await
				.expect("Save should succeed.");
		}

		let pinned = |authority: &str| {
			CacheQuery::new(
				"client-1",
				ScopeSet::new(["user.read"]).expect("Scope fixture should be valid."),
			)
			.with_account(account.clone())
			.with_authority_url(authority)
		};
		let hits = cache.find(&pinned(home)).await.expect("Find should succeed.");

		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].access_token.expose(), "at-home");

		let hits = cache.find(&pinned(guest)).await.expect("Find should succeed.");

		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].access_token.expose(), "at-guest");
	}

	#[tokio::test]
	async fn save_replaces_same_slot_and_remove_clears_the_account() {
		let cache = InMemoryTokenCache::default();
		let keep = account("uid-keep.tid");
		let drop = account("uid-drop.tid");

		cache.save(record(&drop, &["user.read"], "old")).await.expect("Save should succeed.");
		cache.save(record(&drop, &["user.read"], "new")).await.expect("Save should succeed.");
		cache.save(record(&keep, &["user.read"], "kept")).await.expect("Save should succeed.");

		let accounts = cache.accounts().await.expect("Account listing should succeed.");

		assert_eq!(accounts.len(), 2);

		cache.remove(&drop).await.expect("Remove should succeed.");

		let accounts = cache.accounts().await.expect("Account listing should succeed.");

		assert_eq!(accounts.len(), 1);
		assert!(accounts[0].same_account(&keep));
	}
}
