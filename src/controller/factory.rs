//! Controller selection for the current app/device/policy.

// self
use crate::{
	_prelude::*,
	broker::BrokerAvailability,
	controller::{Capability, Controller},
};

/// Host-app policy governing broker use.
///
/// Presence and capability of the broker are injected values; the factory only
/// decides eligibility, never discovery mechanics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerPolicy {
	/// App policy forbids delegating to a broker.
	Disallowed,
	/// Broker is offered after the local controller when present and
	/// protocol-compatible.
	Allowed {
		/// Minimum broker protocol version the app accepts.
		minimum_protocol_version: u32,
	},
	/// App may not hold its own cache; the broker is the only backend.
	Required {
		/// Minimum broker protocol version the app accepts.
		minimum_protocol_version: u32,
	},
}
impl Default for BrokerPolicy {
	fn default() -> Self {
		Self::Allowed { minimum_protocol_version: 1 }
	}
}

/// Selects eligible controllers, local-first then broker.
#[derive(Clone)]
pub struct ControllerFactory {
	policy: BrokerPolicy,
	local: Arc<dyn Controller>,
	broker: Option<(Arc<dyn Controller>, BrokerAvailability)>,
}
impl ControllerFactory {
	/// Creates a factory over the installed backends and the app's policy.
	pub fn new(
		policy: BrokerPolicy,
		local: Arc<dyn Controller>,
		broker: Option<(Arc<dyn Controller>, BrokerAvailability)>,
	) -> Self {
		Self { policy, local, broker }
	}

	/// Ordered candidate list for one operation.
	///
	/// Local-first then broker, or broker-only under
	/// [`BrokerPolicy::Required`]; only controllers supporting the capability
	/// are offered. An empty list is an error, not an empty chain.
	pub fn all_controllers(&self, capability: Capability) -> Result<Vec<Arc<dyn Controller>>> {
		let broker = self.eligible_broker()?;
		let mut candidates = Vec::with_capacity(2);

		if !matches!(self.policy, BrokerPolicy::Required { .. }) {
			candidates.push(self.local.clone());
		}
		if let Some(broker) = broker {
			candidates.push(broker);
		}

		candidates.retain(|controller| controller.supports(capability));

		if candidates.is_empty() {
			return Err(Error::NotSupported { operation: capability.as_str() });
		}

		Ok(candidates)
	}

	/// Preferred controller for one operation (head of the candidate list).
	pub fn default_controller(&self, capability: Capability) -> Result<Arc<dyn Controller>> {
		let mut candidates = self.all_controllers(capability)?;

		// all_controllers never returns an empty list.
		Ok(candidates.remove(0))
	}

	fn eligible_broker(&self) -> Result<Option<Arc<dyn Controller>>> {
		let (minimum, required) = match self.policy {
			BrokerPolicy::Disallowed => return Ok(None),
			BrokerPolicy::Allowed { minimum_protocol_version } =>
				(minimum_protocol_version, false),
			BrokerPolicy::Required { minimum_protocol_version } =>
				(minimum_protocol_version, true),
		};
		let Some((controller, availability)) = &self.broker else {
			if required {
				return Err(Error::BrokerCommunication {
					message: "No broker transport is installed".into(),
				});
			}

			return Ok(None);
		};

		if availability.satisfies(minimum) {
			Ok(Some(controller.clone()))
		} else if required {
			Err(Error::UnsupportedBroker {
				required: minimum,
				advertised: availability.protocol_version,
			})
		} else {
			// An incompatible broker quietly leaves the local controller alone.
			Ok(None)
		}
	}
}
impl Debug for ControllerFactory {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ControllerFactory")
			.field("policy", &self.policy)
			.field("broker_installed", &self.broker.is_some())
			.finish()
	}
}
