//! Broker controller: delegates whole operations across the IPC boundary.
//!
//! Every operation serializes its parameters, sends one request to the trusted
//! broker process, and translates the tagged reply into the engine taxonomy. A
//! broker-owned account never touches the local cache.

// crates.io
use serde_json::Value as JsonValue;
// self
use crate::{
	_prelude::*,
	auth::{
		Account, AuthenticationResult, InteractiveParameters, LoadAccountsParameters,
		RemoveAccountParameters, SilentParameters,
	},
	broker::{
		ACCOUNT_NOT_OWNED, BrokerOperation, BrokerReply, BrokerRequest, BrokerTokenPayload,
		BrokerTransport, map_broker_error,
	},
	controller::{Capability, Controller, ControllerFuture, ControllerOutcome},
};

const CAPABILITIES: &[Capability] = &[
	Capability::AcquireTokenInteractive,
	Capability::AcquireTokenSilent,
	Capability::RemoveAccount,
	Capability::LoadAccounts,
	Capability::GetCurrentAccount,
];

/// Backend that forwards operations to the device's trusted broker process.
pub struct BrokerController {
	transport: Arc<dyn BrokerTransport>,
}
impl BrokerController {
	/// Creates a broker controller over the injected IPC transport.
	pub fn new(transport: Arc<dyn BrokerTransport>) -> Self {
		Self { transport }
	}

	/// Runs one request/reply exchange and classifies the reply.
	async fn call(
		&self,
		operation: BrokerOperation,
		correlation_id: Uuid,
		payload: JsonValue,
	) -> ControllerOutcome<JsonValue> {
		let request = BrokerRequest { operation, correlation_id, payload };

		match self.transport.exchange(request).await {
			Ok(BrokerReply::Ok { payload }) => ControllerOutcome::Resolved(Ok(payload)),
			Ok(BrokerReply::Error { code, .. }) if code == ACCOUNT_NOT_OWNED =>
				ControllerOutcome::NotOwned,
			Ok(BrokerReply::Error { code, message }) =>
				ControllerOutcome::Resolved(Err(map_broker_error(&code, message, correlation_id))),
			Err(e) => ControllerOutcome::err(e),
		}
	}

	/// Serializes parameters, delegates, and decodes the reply payload.
	async fn delegate<P, T, D>(
		&self,
		operation: BrokerOperation,
		correlation_id: Uuid,
		parameters: &P,
		decode: D,
	) -> ControllerOutcome<T>
	where
		P: Serialize,
		D: FnOnce(JsonValue) -> Result<T>,
	{
		let payload = match serde_json::to_value(parameters) {
			Ok(payload) => payload,
			Err(source) =>
				return ControllerOutcome::err(Error::BrokerCommunication {
					message: format!("Broker request serialization failed: {source}"),
				}),
		};

		match self.call(operation, correlation_id, payload).await {
			ControllerOutcome::Resolved(Ok(reply)) => ControllerOutcome::Resolved(decode(reply)),
			ControllerOutcome::Resolved(Err(e)) => ControllerOutcome::Resolved(Err(e)),
			ControllerOutcome::Cancelled => ControllerOutcome::Cancelled,
			ControllerOutcome::NotOwned => ControllerOutcome::NotOwned,
		}
	}
}
impl Controller for BrokerController {
	fn name(&self) -> &'static str {
		"broker"
	}

	fn capabilities(&self) -> &'static [Capability] {
		CAPABILITIES
	}

	fn acquire_token_interactive<'a>(
		&'a self,
		parameters: &'a InteractiveParameters,
	) -> ControllerFuture<'a, AuthenticationResult> {
		let correlation_id = parameters.correlation_id;

		Box::pin(self.delegate(
			BrokerOperation::AcquireTokenInteractive,
			correlation_id,
			parameters,
			move |payload| decode_token_payload(payload, correlation_id),
		))
	}

	fn acquire_token_silent<'a>(
		&'a self,
		parameters: &'a SilentParameters,
	) -> ControllerFuture<'a, AuthenticationResult> {
		let correlation_id = parameters.correlation_id;

		Box::pin(self.delegate(
			BrokerOperation::AcquireTokenSilent,
			correlation_id,
			parameters,
			move |payload| decode_token_payload(payload, correlation_id),
		))
	}

	fn remove_account<'a>(
		&'a self,
		parameters: &'a RemoveAccountParameters,
	) -> ControllerFuture<'a, ()> {
		Box::pin(self.delegate(
			BrokerOperation::RemoveAccount,
			parameters.correlation_id,
			parameters,
			|_| Ok(()),
		))
	}

	fn load_accounts<'a>(
		&'a self,
		parameters: &'a LoadAccountsParameters,
	) -> ControllerFuture<'a, Vec<Account>> {
		Box::pin(self.delegate(
			BrokerOperation::LoadAccounts,
			parameters.correlation_id,
			parameters,
			|payload| decode_reply(payload, "account list"),
		))
	}

	fn current_account<'a>(
		&'a self,
		parameters: &'a LoadAccountsParameters,
	) -> ControllerFuture<'a, Option<Account>> {
		Box::pin(self.delegate(
			BrokerOperation::GetCurrentAccount,
			parameters.correlation_id,
			parameters,
			|payload| decode_reply(payload, "current account"),
		))
	}
}
impl Debug for BrokerController {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("BrokerController(..)")
	}
}

fn decode_token_payload(payload: JsonValue, correlation_id: Uuid) -> Result<AuthenticationResult> {
	let payload: BrokerTokenPayload = serde_json::from_value(payload).map_err(|source| {
		Error::BrokerCommunication {
			message: format!("Broker returned a malformed token payload: {source}"),
		}
	})?;

	Ok(payload.into_result(correlation_id))
}

fn decode_reply<T>(payload: JsonValue, what: &str) -> Result<T>
where
	T: for<'de> Deserialize<'de>,
{
	serde_json::from_value(payload).map_err(|source| Error::BrokerCommunication {
		message: format!("Broker returned a malformed {what} payload: {source}"),
	})
}
