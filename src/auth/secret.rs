//! Redacting wrapper for token material.

// self
use crate::_prelude::*;

/// Token secret wrapper keeping sensitive material out of logs and spans.
///
/// Access, refresh, and id tokens are all carried as [`TokenSecret`] so that
/// `Debug`/`Display` output from controllers and the dispatcher never leaks
/// credential material.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl From<String> for TokenSecret {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = TokenSecret::new("ey.super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
		assert_eq!(secret.expose(), "ey.super-secret");
	}

	#[test]
	fn serde_is_transparent() {
		let secret = TokenSecret::new("value");
		let payload = serde_json::to_string(&secret).expect("Secret should serialize to JSON.");

		assert_eq!(payload, "\"value\"");
	}
}
