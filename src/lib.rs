//! Client-side OAuth 2.0/OIDC token-acquisition engine - silent and interactive flows, broker
//! delegation, cloud-instance discovery, and a single-flight command dispatcher in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod authority;
pub mod broker;
pub mod cache;
pub mod claims;
pub mod command;
pub mod controller;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod http;
pub mod obs;
pub mod ui;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use crate::http::{ExchangeClient, ReqwestTransport};

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// Exchange client over the test transport with a short retry backoff.
	pub fn test_exchange_client() -> ExchangeClient {
		ExchangeClient::new(Arc::new(test_reqwest_transport()))
			.with_backoff(std::time::Duration::from_millis(25))
	}

	/// Encodes a claims JSON object as an unsigned JWT usable as a test id token.
	pub fn encode_test_id_token(claims_json: &str) -> String {
		format!(
			"{}.{}.test-signature",
			URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
			URL_SAFE_NO_PAD.encode(claims_json),
		)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;
	pub use uuid::Uuid;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
