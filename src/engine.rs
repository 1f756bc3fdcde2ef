//! Engine configuration and the public operation facade.
//!
//! [`TokenEngine`] wires the resolver, exchange client, cache, controllers, and
//! dispatcher together and exposes the four public operations. Every operation
//! validates its parameters first, selects candidates through the factory, and
//! resolves exactly once through the dispatcher.

// self
use crate::{
	_prelude::*,
	auth::{
		Account, AuthenticationResult, InteractiveParameters, LoadAccountsParameters,
		RemoveAccountParameters, SilentParameters,
	},
	authority::{AuthorityResolver, CloudInstanceCache},
	broker::{BrokerAvailability, BrokerTransport},
	cache::{InMemoryTokenCache, TokenCache},
	command::Command,
	controller::{
		BrokerController, BrokerPolicy, Capability, Controller, ControllerFactory, LocalController,
	},
	dispatch::{CommandDispatcher, CommandResolution, DispatchMetrics, RedirectRouter},
	error::UiRequiredError,
	http::{ExchangeClient, HttpTransport},
	ui::AuthorizationUi,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Worldwide Azure AD authority applied when the app configures none.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/common";

/// Static configuration an embedding application hands to the engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
	/// Application (client) id every request is issued for.
	pub client_id: String,
	/// Redirect URI registered for the interactive flow.
	pub redirect_uri: Url,
	/// Authority applied when a request carries no override.
	pub default_authority: String,
	/// Developer-configured hosts that pass the trust check without discovery.
	pub known_authority_hosts: Vec<String>,
	/// Host-app policy governing broker use.
	pub broker_policy: BrokerPolicy,
}
impl EngineConfig {
	/// Creates a configuration for the provided client id and redirect URI.
	pub fn new(client_id: impl Into<String>, redirect_uri: Url) -> Self {
		Self {
			client_id: client_id.into(),
			redirect_uri,
			default_authority: DEFAULT_AUTHORITY.into(),
			known_authority_hosts: Vec::new(),
			broker_policy: BrokerPolicy::default(),
		}
	}

	/// Overrides the default authority.
	pub fn with_default_authority(mut self, authority: impl Into<String>) -> Self {
		self.default_authority = authority.into();

		self
	}

	/// Adds a developer-configured known authority host.
	pub fn with_known_authority_host(mut self, host: impl Into<String>) -> Self {
		self.known_authority_hosts.push(host.into());

		self
	}

	/// Overrides the broker policy.
	pub fn with_broker_policy(mut self, policy: BrokerPolicy) -> Self {
		self.broker_policy = policy;

		self
	}
}

/// Staged collaborators for [`TokenEngine`] construction.
pub struct TokenEngineBuilder {
	config: EngineConfig,
	cache: Option<Arc<dyn TokenCache>>,
	ui: Option<Arc<dyn AuthorizationUi>>,
	exchange: Option<ExchangeClient>,
	clouds: Option<Arc<CloudInstanceCache>>,
	broker: Option<(Arc<dyn BrokerTransport>, BrokerAvailability)>,
}
impl TokenEngineBuilder {
	/// Installs a token cache; an in-process cache is the default.
	pub fn with_cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
		self.cache = Some(cache);

		self
	}

	/// Installs the authorization UI surface used by the local controller.
	pub fn with_ui(mut self, ui: Arc<dyn AuthorizationUi>) -> Self {
		self.ui = Some(ui);

		self
	}

	/// Installs a custom HTTP transport behind the engine retry policy.
	pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
		self.exchange = Some(ExchangeClient::new(transport));

		self
	}

	/// Installs a fully-configured exchange client (custom backoff included).
	pub fn with_exchange_client(mut self, exchange: ExchangeClient) -> Self {
		self.exchange = Some(exchange);

		self
	}

	/// Shares a process-wide discovered-clouds table across engines.
	pub fn with_cloud_cache(mut self, clouds: Arc<CloudInstanceCache>) -> Self {
		self.clouds = Some(clouds);

		self
	}

	/// Installs the broker IPC transport and its advertised capability.
	pub fn with_broker(
		mut self,
		transport: Arc<dyn BrokerTransport>,
		availability: BrokerAvailability,
	) -> Self {
		self.broker = Some((transport, availability));

		self
	}

	/// Wires the collaborators together into an engine.
	pub fn build(self) -> TokenEngine {
		let exchange = self.exchange.unwrap_or_else(default_exchange_client);
		let clouds = self.clouds.unwrap_or_default();
		let resolver = AuthorityResolver::new(
			self.config.known_authority_hosts.iter().cloned(),
			clouds,
			exchange.clone(),
		);
		let cache =
			self.cache.unwrap_or_else(|| Arc::new(InMemoryTokenCache::default()));
		let dispatcher = Arc::new(CommandDispatcher::new());
		let local: Arc<dyn Controller> = Arc::new(LocalController::new(
			&self.config.client_id,
			self.config.redirect_uri.clone(),
			&self.config.default_authority,
			resolver,
			exchange,
			cache,
			self.ui,
			dispatcher.router(),
		));
		let broker = self.broker.map(|(transport, availability)| {
			let controller: Arc<dyn Controller> = Arc::new(BrokerController::new(transport));

			(controller, availability)
		});
		let factory = ControllerFactory::new(self.config.broker_policy, local, broker);

		TokenEngine { config: self.config, factory, dispatcher }
	}
}
impl Debug for TokenEngineBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenEngineBuilder").field("config", &self.config).finish()
	}
}

#[cfg(feature = "reqwest")]
fn default_exchange_client() -> ExchangeClient {
	ExchangeClient::new(Arc::new(ReqwestTransport::default()))
}
#[cfg(not(feature = "reqwest"))]
fn default_exchange_client() -> ExchangeClient {
	// Without a bundled transport every exchange fails with a typed IO error
	// until the builder installs one.
	struct UnconfiguredTransport;
	impl HttpTransport for UnconfiguredTransport {
		fn roundtrip(
			&self,
			_: crate::http::ExchangeRequest,
		) -> crate::http::TransportFuture<'_> {
			Box::pin(async {
				Err(crate::http::TransportFailure::io(std::io::Error::other(
					"No HTTP transport is configured",
				)))
			})
		}
	}

	ExchangeClient::new(Arc::new(UnconfiguredTransport))
}

/// Client-side token-acquisition engine facade.
pub struct TokenEngine {
	config: EngineConfig,
	factory: ControllerFactory,
	dispatcher: Arc<CommandDispatcher>,
}
impl TokenEngine {
	/// Starts building an engine for the provided configuration.
	pub fn builder(config: EngineConfig) -> TokenEngineBuilder {
		TokenEngineBuilder { config, cache: None, ui: None, exchange: None, clouds: None, broker: None }
	}

	/// Configuration the engine was built with.
	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	/// Controller selection for the current app/device/policy.
	pub fn controller_factory(&self) -> &ControllerFactory {
		&self.factory
	}

	/// Router the UI collaborator reports authorization completions through.
	pub fn redirect_router(&self) -> Arc<RedirectRouter> {
		self.dispatcher.router()
	}

	/// In-process dispatch counters.
	pub fn dispatch_metrics(&self) -> Arc<DispatchMetrics> {
		self.dispatcher.metrics()
	}

	/// Acquires tokens through a user-facing authorization flow.
	///
	/// Interactive commands are single-flight: a second submission queues
	/// strictly behind the one running. Cancellation of the UI surface resolves
	/// as [`CommandResolution::Cancelled`], not an error.
	pub async fn acquire_token_interactive(
		&self,
		parameters: InteractiveParameters,
	) -> Result<CommandResolution<AuthenticationResult>> {
		parameters.validate()?;

		let controllers = self.factory.all_controllers(Capability::AcquireTokenInteractive)?;
		let command = Command::interactive(&parameters, controllers);

		self.dispatcher
			.dispatch(command, move |controller| {
				let parameters = parameters.clone();

				Box::pin(async move { controller.acquire_token_interactive(&parameters).await })
			})
			.await
	}

	/// Satisfies a token request from cache or a refresh grant, without UI.
	pub async fn acquire_token_silent(
		&self,
		parameters: SilentParameters,
	) -> Result<AuthenticationResult> {
		parameters.validate()?;

		let controllers = self.factory.all_controllers(Capability::AcquireTokenSilent)?;
		let command = Command::silent(&parameters, controllers);
		let resolution = self
			.dispatcher
			.dispatch(command, move |controller| {
				let parameters = parameters.clone();

				Box::pin(async move { controller.acquire_token_silent(&parameters).await })
			})
			.await?;

		match resolution {
			CommandResolution::Completed(result) => Ok(result),
			// Silent commands have no UI surface; controllers on this lane only
			// report cancellation erroneously, so degrade it to the escalation
			// signal instead of fabricating a result.
			CommandResolution::Cancelled => Err(UiRequiredError::NoTokensFound.into()),
		}
	}

	/// Removes the account from whichever backend owns it.
	pub async fn remove_account(&self, parameters: RemoveAccountParameters) -> Result<()> {
		parameters.validate()?;

		let controllers = self.factory.all_controllers(Capability::RemoveAccount)?;
		let command = Command::remove_account(&parameters, controllers);
		let resolution = self
			.dispatcher
			.dispatch(command, move |controller| {
				let parameters = parameters.clone();

				Box::pin(async move { controller.remove_account(&parameters).await })
			})
			.await?;

		let _ = resolution.into_completed();

		Ok(())
	}

	/// Enumerates the accounts known to the preferred backend.
	pub async fn load_accounts(&self) -> Result<Vec<Account>> {
		let parameters = LoadAccountsParameters::new();
		let controllers = self.factory.all_controllers(Capability::LoadAccounts)?;
		let command = Command::load_accounts(&parameters, controllers);
		let resolution = self
			.dispatcher
			.dispatch(command, move |controller| {
				let parameters = parameters.clone();

				Box::pin(async move { controller.load_accounts(&parameters).await })
			})
			.await?;

		Ok(resolution.into_completed().unwrap_or_default())
	}

	/// Returns the device's current account in shared-device mode.
	pub async fn current_account(&self) -> Result<Option<Account>> {
		let parameters = LoadAccountsParameters::new();
		let controllers = self.factory.all_controllers(Capability::GetCurrentAccount)?;
		let command = Command::current_account(&parameters, controllers);
		let resolution = self
			.dispatcher
			.dispatch(command, move |controller| {
				let parameters = parameters.clone();

				Box::pin(async move { controller.current_account(&parameters).await })
			})
			.await?;

		Ok(resolution.into_completed().flatten())
	}
}
impl Debug for TokenEngine {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenEngine")
			.field("config", &self.config)
			.field("factory", &self.factory)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU64, Ordering};
	// self
	use super::*;
	use crate::{
		auth::ScopeSet,
		error::ArgumentError,
		http::{ExchangeRequest, TransportFailure, TransportFuture},
	};

	struct CountingTransport(AtomicU64);
	impl HttpTransport for CountingTransport {
		fn roundtrip(&self, _: ExchangeRequest) -> TransportFuture<'_> {
			self.0.fetch_add(1, Ordering::SeqCst);

			Box::pin(async { Err(TransportFailure::Timeout) })
		}
	}

	fn engine(transport: &Arc<CountingTransport>) -> TokenEngine {
		let config = EngineConfig::new(
			"client-1",
			Url::parse("https://app.example/redirect").expect("Redirect fixture should parse."),
		);

		TokenEngine::builder(config).with_transport(transport.clone()).build()
	}

	#[tokio::test]
	async fn empty_scopes_fail_before_any_network_call() {
		let transport = Arc::new(CountingTransport(AtomicU64::new(0)));
		let engine = engine(&transport);
		let err = engine
			.acquire_token_interactive(InteractiveParameters::new(ScopeSet::default()))
			.await
			.expect_err("Empty scopes must fail validation.");

		assert!(matches!(err, Error::Argument(ArgumentError::EmptyScopes)));

		let silent = SilentParameters::new(
			ScopeSet::default(),
			Account::new("uid.tid", "user@contoso.com", "login.microsoftonline.com", "tid"),
		);
		let err =
			engine.acquire_token_silent(silent).await.expect_err("Empty scopes must fail validation.");

		assert!(matches!(err, Error::Argument(ArgumentError::EmptyScopes)));
		assert_eq!(transport.0.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn load_accounts_uses_the_default_in_memory_cache() {
		let transport = Arc::new(CountingTransport(AtomicU64::new(0)));
		let accounts = engine(&transport)
			.load_accounts()
			.await
			.expect("Account enumeration should succeed.");

		assert!(accounts.is_empty());
	}

	#[tokio::test]
	async fn current_account_requires_a_broker() {
		let transport = Arc::new(CountingTransport(AtomicU64::new(0)));
		let err = engine(&transport)
			.current_account()
			.await
			.expect_err("Shared-device lookup needs a broker.");

		assert!(matches!(
			err,
			Error::NotSupported { operation: "get_current_account" },
		));
	}
}
