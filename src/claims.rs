//! Claims-request payloads and the WWW-Authenticate challenge transform.
//!
//! A claims request names additional claims an application wants embedded in
//! issued tokens, grouped under three targets (`userinfo`, `id_token`,
//! `access_token`). Payloads arrive either as raw JSON or inside the `claims=`
//! directive of a WWW-Authenticate challenge, which providers emit with double
//! quotes, single quotes, or no quotes at all.

// std
use std::collections::BTreeMap;
// crates.io
use serde_json::Value as JsonValue;
// self
use crate::_prelude::*;

/// Mapping from claim name to optional request detail; a `null` detail asks for
/// the claim with default semantics.
pub type ClaimsTarget = BTreeMap<String, Option<ClaimDetail>>;

/// Errors produced while parsing claims payloads.
#[derive(Debug, ThisError)]
pub enum ClaimsParseError {
	/// Payload is not a valid claims JSON object.
	#[error("Claims payload is malformed JSON.")]
	Json {
		/// Structured parsing failure with the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The `claims=` directive carries an empty value.
	#[error("Claims directive is empty.")]
	EmptyDirective,
}

/// Request detail for a single claim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimDetail {
	/// Marks the claim as essential for the calling application.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub essential: Option<bool>,
	/// Requests the claim with a specific value.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<JsonValue>,
	/// Requests the claim with one of several values.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub values: Option<Vec<JsonValue>>,
}
impl ClaimDetail {
	/// Marks the claim as essential.
	pub fn essential() -> Self {
		Self { essential: Some(true), value: None, values: None }
	}

	/// Requests the claim with a specific value.
	pub fn with_value(value: impl Into<JsonValue>) -> Self {
		Self { essential: None, value: Some(value.into()), values: None }
	}
}

/// Claims payload split across the three standard targets.
///
/// Serialization omits empty targets; deserialization tolerates any subset of
/// targets being absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsRequest {
	/// Claims requested on the userinfo endpoint response.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub userinfo: ClaimsTarget,
	/// Claims requested inside the id token.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub id_token: ClaimsTarget,
	/// Claims requested inside the access token.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub access_token: ClaimsTarget,
}
impl ClaimsRequest {
	/// Parses a claims request from a raw JSON object.
	pub fn from_json(payload: &str) -> Result<Self, ClaimsParseError> {
		let mut deserializer = serde_json::Deserializer::from_str(payload);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ClaimsParseError::Json { source })
	}

	/// Extracts and parses the `claims=` directive from a WWW-Authenticate value.
	///
	/// Returns `Ok(None)` when the header carries no claims directive. The
	/// directive value may be double-quoted, single-quoted, or unquoted up to
	/// the next comma or space.
	pub fn from_challenge_header(header: &str) -> Result<Option<Self>, ClaimsParseError> {
		let Some(raw) = extract_claims_directive(header) else {
			return Ok(None);
		};

		if raw.is_empty() {
			return Err(ClaimsParseError::EmptyDirective);
		}

		Self::from_json(raw).map(Some)
	}

	/// Returns true when no target requests any claim.
	pub fn is_empty(&self) -> bool {
		self.userinfo.is_empty() && self.id_token.is_empty() && self.access_token.is_empty()
	}

	/// Serializes back to the three-target JSON shape, omitting empty targets.
	pub fn to_json(&self) -> String {
		// Targets are plain maps of optional details; serialization cannot fail.
		serde_json::to_string(self).unwrap_or_default()
	}
}

fn extract_claims_directive(header: &str) -> Option<&str> {
	let start = header.find("claims=")? + "claims=".len();
	let rest = &header[start..];

	match rest.chars().next() {
		Some(quote @ ('"' | '\'')) => {
			let inner = &rest[1..];

			// A raw JSON object carries the quote character itself, so the value
			// ends at its balancing close brace rather than the next quote.
			if inner.starts_with('{') {
				let mut depth = 0_usize;

				for (idx, c) in inner.char_indices() {
					match c {
						'{' => depth += 1,
						'}' => {
							depth -= 1;

							if depth == 0 {
								return Some(&inner[..=idx]);
							}
						},
						_ => {},
					}
				}

				return None;
			}

			inner.find(quote).map(|end| &inner[..end])
		},
		Some(_) => {
			let end = rest.find([',', ' ']).unwrap_or(rest.len());

			Some(&rest[..end])
		},
		None => Some(""),
	}
}
