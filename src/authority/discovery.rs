//! Cloud-instance discovery and the known-authority trust check.
//!
//! The discovered-clouds table is explicit process state ([`CloudInstanceCache`])
//! handed to the [`AuthorityResolver`] at construction. Discovery for an unseen
//! cloud host runs at most once behind a single async guard; concurrent callers
//! block briefly, then observe the already-populated table.

// std
use std::collections::{BTreeSet, HashMap};
// self
use crate::{
	_prelude::*,
	authority::Authority,
	error::{ServiceError, ServiceErrorKind},
	http::{ExchangeClient, ExchangeRequest},
};

/// Discovery metadata recorded for one cloud instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudInstanceMetadata {
	/// Host the engine should prefer for network calls.
	pub preferred_network: String,
	/// Every alias host the instance answers on.
	pub aliases: Vec<String>,
}

/// Trust outcome recorded per cloud host.
#[derive(Clone, Debug)]
pub enum CloudLookup {
	/// Host belongs to a discovered cloud instance.
	Trusted(Arc<CloudInstanceMetadata>),
	/// Discovery answered definitively that the host is not a known cloud.
	Untrusted,
}

/// Process-wide discovered-clouds table with single-writer discipline.
///
/// Reads go through a `parking_lot::RwLock`; the async guard serializes the
/// one discovery fetch per unseen host. Network failures are deliberately not
/// recorded so a later request can re-attempt discovery.
#[derive(Debug, Default)]
pub struct CloudInstanceCache {
	entries: RwLock<HashMap<String, CloudLookup>>,
	guard: AsyncMutex<()>,
}
impl CloudInstanceCache {
	/// Returns the recorded outcome for a host, if discovery has run.
	pub fn lookup(&self, host: &str) -> Option<CloudLookup> {
		self.entries.read().get(&host.to_ascii_lowercase()).cloned()
	}

	/// Records a discovery document, indexing every alias of every instance.
	///
	/// When the requested host appears in no instance's alias list, it is
	/// recorded as untrusted so the question is never asked again.
	pub fn record_document(&self, requested_host: &str, document: InstanceDiscoveryDocument) {
		let mut entries = self.entries.write();

		for instance in document.metadata {
			let metadata = Arc::new(CloudInstanceMetadata {
				preferred_network: instance.preferred_network.to_ascii_lowercase(),
				aliases: instance.aliases.iter().map(|a| a.to_ascii_lowercase()).collect(),
			});

			entries
				.insert(metadata.preferred_network.clone(), CloudLookup::Trusted(metadata.clone()));

			for alias in &metadata.aliases {
				entries.insert(alias.clone(), CloudLookup::Trusted(metadata.clone()));
			}
		}

		entries
			.entry(requested_host.to_ascii_lowercase())
			.or_insert(CloudLookup::Untrusted);
	}

	/// Records a host that discovery rejected as not belonging to any cloud.
	pub fn record_untrusted(&self, host: &str) {
		self.entries.write().insert(host.to_ascii_lowercase(), CloudLookup::Untrusted);
	}
}

/// Instance discovery response shape returned by the cloud endpoint.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InstanceDiscoveryDocument {
	/// Per-instance metadata entries.
	#[serde(default)]
	pub metadata: Vec<InstanceEntry>,
}

/// One instance entry inside a discovery document.
#[derive(Clone, Debug, Deserialize)]
pub struct InstanceEntry {
	/// Host the instance prefers for network calls.
	pub preferred_network: String,
	/// Alias hosts the instance answers on.
	#[serde(default)]
	pub aliases: Vec<String>,
}

/// Outcome of the known-authority trust check.
#[derive(Debug)]
pub enum KnownAuthorityResult {
	/// Authority is developer-configured or cloud-discovered.
	Known,
	/// Authority is untrusted; carries the reason (unknown issuer or the
	/// discovery failure that prevented the check).
	Untrusted(Error),
}
impl KnownAuthorityResult {
	/// Returns true when the authority passed the trust check.
	pub fn is_known(&self) -> bool {
		matches!(self, KnownAuthorityResult::Known)
	}

	/// Returns the recorded failure for untrusted authorities.
	pub fn error(&self) -> Option<&Error> {
		match self {
			KnownAuthorityResult::Known => None,
			KnownAuthorityResult::Untrusted(error) => Some(error),
		}
	}

	/// Converts the check into a fail-fast result for token paths.
	pub fn into_result(self) -> Result<()> {
		match self {
			KnownAuthorityResult::Known => Ok(()),
			KnownAuthorityResult::Untrusted(error) => Err(error),
		}
	}
}

/// Resolves authorities and answers issuer-trust questions.
#[derive(Clone)]
pub struct AuthorityResolver {
	known_hosts: BTreeSet<String>,
	clouds: Arc<CloudInstanceCache>,
	exchange: ExchangeClient,
}
impl AuthorityResolver {
	/// Creates a resolver over the provided clouds table and transport.
	///
	/// `known_hosts` is the developer-configured allow list; hosts on it pass
	/// the trust check without any discovery fetch (required for B2C and ADFS,
	/// which cloud discovery does not cover).
	pub fn new(
		known_hosts: impl IntoIterator<Item = String>,
		clouds: Arc<CloudInstanceCache>,
		exchange: ExchangeClient,
	) -> Self {
		Self {
			known_hosts: known_hosts.into_iter().map(|h| h.to_ascii_lowercase()).collect(),
			clouds,
			exchange,
		}
	}

	/// Parses an authority string into a typed descriptor.
	pub fn resolve(&self, raw: &str) -> Result<Authority> {
		Ok(Authority::resolve(raw)?)
	}

	/// Runs the trust check, performing cloud discovery on first contact.
	///
	/// Discovery network failures surface as `Untrusted` carrying the error, so
	/// callers fail fast instead of proceeding to a token endpoint.
	pub async fn known_authority_result(&self, authority: &Authority) -> KnownAuthorityResult {
		if self.known_hosts.contains(&authority.host().to_ascii_lowercase()) {
			return KnownAuthorityResult::Known;
		}

		match authority {
			Authority::AzureAd { host, .. } => match self.ensure_discovered(host).await {
				Ok(CloudLookup::Trusted(_)) => KnownAuthorityResult::Known,
				Ok(CloudLookup::Untrusted) =>
					KnownAuthorityResult::Untrusted(self.unknown(authority)),
				Err(error) => KnownAuthorityResult::Untrusted(error),
			},
			// B2C/ADFS/unknown trust is developer-configured only.
			_ => KnownAuthorityResult::Untrusted(self.unknown(authority)),
		}
	}

	/// Canonical issuer URL with the discovered preferred host substituted.
	pub fn canonicalize(&self, authority: &Authority) -> Url {
		let canonical = authority.canonical_url();

		if let Authority::AzureAd { host, .. } = authority
			&& let Some(CloudLookup::Trusted(metadata)) = self.clouds.lookup(host)
			&& metadata.preferred_network != *host
			&& let Ok(preferred) =
				Url::parse(&format!("https://{}{}", metadata.preferred_network, canonical.path()))
		{
			return preferred;
		}

		canonical
	}

	async fn ensure_discovered(&self, host: &str) -> Result<CloudLookup> {
		if let Some(lookup) = self.clouds.lookup(host) {
			return Ok(lookup);
		}

		let _discovery = self.clouds.guard.lock().await;

		// A concurrent caller may have completed discovery while this one
		// waited on the guard.
		if let Some(lookup) = self.clouds.lookup(host) {
			return Ok(lookup);
		}

		let response = self.exchange.send(instance_discovery_request(host)?).await?;

		if response.is_success() {
			let mut deserializer = serde_json::Deserializer::from_str(&response.body);
			let document: InstanceDiscoveryDocument =
				serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
					ServiceError::new(
						ServiceErrorKind::Unknown,
						format!("Instance discovery returned malformed JSON: {source}"),
					)
					.with_status(response.status)
				})?;

			self.clouds.record_document(host, document);

			Ok(self.clouds.lookup(host).unwrap_or(CloudLookup::Untrusted))
		} else if response.status == 400 && response.body.contains("invalid_instance") {
			self.clouds.record_untrusted(host);

			Ok(CloudLookup::Untrusted)
		} else {
			Err(ServiceError::new(
				ServiceErrorKind::Unknown,
				"Instance discovery returned an unexpected response",
			)
			.with_status(response.status)
			.into())
		}
	}

	fn unknown(&self, authority: &Authority) -> Error {
		Error::UnknownAuthority { authority: authority.canonical_url().into() }
	}
}
impl Debug for AuthorityResolver {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorityResolver").field("known_hosts", &self.known_hosts).finish()
	}
}

fn instance_discovery_request(host: &str) -> Result<ExchangeRequest> {
	let mut url = Url::parse(&format!("https://{host}/common/discovery/instance"))
		.map_err(|source| crate::error::MalformedAuthorityError::InvalidUrl { source })?;

	url.query_pairs_mut()
		.append_pair("api-version", "1.1")
		.append_pair(
			"authorization_endpoint",
			&format!("https://{host}/common/oauth2/v2.0/authorize"),
		);

	Ok(ExchangeRequest::get(url))
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::BTreeMap;
	// self
	use super::*;
	use crate::{
		error::NetworkError,
		http::{ExchangeResponse, HttpTransport, TransportFailure, TransportFuture},
	};

	struct StaticTransport(Result<(u16, String), ()>);
	impl HttpTransport for StaticTransport {
		fn roundtrip(&self, _: crate::http::ExchangeRequest) -> TransportFuture<'_> {
			let step = self.0.clone();

			Box::pin(async move {
				match step {
					Ok((status, body)) =>
						Ok(ExchangeResponse { status, headers: BTreeMap::new(), body }),
					Err(()) => Err(TransportFailure::Timeout),
				}
			})
		}
	}

	fn resolver(known: &[&str], transport: StaticTransport) -> AuthorityResolver {
		AuthorityResolver::new(
			known.iter().map(|h| (*h).to_owned()),
			Arc::new(CloudInstanceCache::default()),
			ExchangeClient::new(Arc::new(transport))
				.with_backoff(std::time::Duration::from_millis(1)),
		)
	}

	fn aad(raw: &str) -> Authority {
		Authority::resolve(raw).expect("Authority fixture should resolve.")
	}

	const DISCOVERY_DOC: &str = r#"{
		"tenant_discovery_endpoint": "https://login.microsoftonline.com/common/.well-known/openid-configuration",
		"metadata": [{
			"preferred_network": "login.microsoftonline.com",
			"preferred_cache": "login.windows.net",
			"aliases": ["login.microsoftonline.com", "login.windows.net", "sts.windows.net"]
		}]
	}"#;

	#[tokio::test]
	async fn developer_configured_hosts_skip_discovery() {
		// A timing-out transport proves no network call happens.
		let resolver = resolver(&["contoso.b2clogin.com"], StaticTransport(Err(())));
		let authority = aad("https://contoso.b2clogin.com/b2c/tenant/policy");

		assert!(resolver.known_authority_result(&authority).await.is_known());
	}

	#[tokio::test]
	async fn discovery_populates_aliases_and_substitutes_preferred_host() {
		let resolver =
			resolver(&[], StaticTransport(Ok((200, DISCOVERY_DOC.to_owned()))));
		let authority = aad("https://sts.windows.net/common");

		assert!(resolver.known_authority_result(&authority).await.is_known());

		// The alias table now answers for sibling hosts without new fetches.
		let sibling = aad("https://login.windows.net/organizations");

		assert!(resolver.known_authority_result(&sibling).await.is_known());
		assert_eq!(
			resolver.canonicalize(&sibling).as_str(),
			"https://login.microsoftonline.com/organizations",
		);
	}

	#[tokio::test]
	async fn invalid_instance_is_untrusted_not_an_error() {
		let body = r#"{"error":"invalid_instance","error_description":"unknown cloud"}"#;
		let resolver = resolver(&[], StaticTransport(Ok((400, body.to_owned()))));
		let authority = aad("https://evil.example.com/common");
		let result = resolver.known_authority_result(&authority).await;

		assert!(!result.is_known());
		assert!(matches!(result.error(), Some(Error::UnknownAuthority { .. })));
	}

	#[tokio::test]
	async fn discovery_network_failure_surfaces_through_the_check() {
		let resolver = resolver(&[], StaticTransport(Err(())));
		let authority = aad("https://login.microsoftonline.de/common");
		let result = resolver.known_authority_result(&authority).await;

		assert!(!result.is_known());
		assert!(matches!(
			result.error(),
			Some(Error::Network(NetworkError::Timeout { .. })),
		));
		assert!(result.into_result().is_err());
	}

	#[tokio::test]
	async fn b2c_without_configuration_is_untrusted() {
		let resolver = resolver(&[], StaticTransport(Ok((200, DISCOVERY_DOC.to_owned()))));
		let authority = aad("https://unknown.b2clogin.com/b2c/tenant/policy");
		let result = resolver.known_authority_result(&authority).await;

		assert!(matches!(result.error(), Some(Error::UnknownAuthority { .. })));
	}
}
