//! Typed authority descriptors and issuer-trust resolution.
//!
//! `Authority` is the closed set of issuer shapes the engine understands; the
//! [`discovery`] module adds the process-wide cloud-instance table and the
//! [`AuthorityResolver`] that answers trust questions before any token call.

pub mod discovery;

pub use discovery::*;

// std
use std::mem;
// self
use crate::{_prelude::*, error::MalformedAuthorityError};

/// Account audiences an Azure AD authority can target.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AadAudience {
	/// Work or school accounts from any tenant (`organizations`).
	AnyOrganizationalAccount,
	/// Personal accounts only (`consumers`).
	AnyPersonalAccount,
	/// Both account classes (`common`).
	AllAccounts,
	/// A single tenant, addressed by id or domain.
	SingleOrganization {
		/// Tenant identifier or verified domain.
		tenant_id: String,
	},
}
impl AadAudience {
	/// Returns the path segment the audience occupies on the authority URL.
	pub fn path_segment(&self) -> &str {
		match self {
			AadAudience::AnyOrganizationalAccount => "organizations",
			AadAudience::AnyPersonalAccount => "consumers",
			AadAudience::AllAccounts => "common",
			AadAudience::SingleOrganization { tenant_id } => tenant_id,
		}
	}
}

/// Closed set of issuer shapes targeted by token requests.
///
/// Every variant produces a canonical issuer URL; equality and hashing are
/// based on (variant, canonical URL). Instances are immutable once built;
/// cloud-discovery metadata attaches to the shared [`CloudInstanceCache`], not
/// to the authority value itself.
#[derive(Clone, Debug)]
pub enum Authority {
	/// Azure AD authority addressed by cloud host + audience.
	AzureAd {
		/// Cloud login host, lowercased.
		host: String,
		/// Targeted account audience.
		audience: AadAudience,
		/// Optional test-slice hint carried from the `slice` query parameter.
		slice: Option<String>,
	},
	/// Azure AD B2C authority carrying a user-flow policy.
	B2c {
		/// Policy (user-flow) name read from the path.
		policy: String,
		/// Case-normalized input URL, preserved verbatim as the issuer.
		url: Url,
	},
	/// On-premises ADFS authority.
	Adfs {
		/// Canonical `https://host/adfs` URL.
		url: Url,
	},
	/// Parsed but unrecognized issuer shape; always fails the trust check.
	Unknown {
		/// Case-normalized input URL.
		url: Url,
	},
}
impl Authority {
	/// Parses an authority string into a typed descriptor.
	///
	/// The first path segment discriminates: `adfs` and `b2c` select their
	/// dedicated variants; anything else is an Azure AD audience discriminator
	/// (`organizations`/`consumers`/`common`, or a tenant id). A URL with no
	/// path resolves to [`Authority::Unknown`] rather than failing, so the
	/// trust check can report it instead of the parser.
	pub fn resolve(raw: &str) -> Result<Self, MalformedAuthorityError> {
		let url = Url::parse(raw.trim())
			.map_err(|source| MalformedAuthorityError::InvalidUrl { source })?;

		if url.scheme() != "https" {
			return Err(MalformedAuthorityError::InsecureScheme { scheme: url.scheme().into() });
		}

		let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
			return Err(MalformedAuthorityError::MissingHost);
		};
		// Non-default ports stay part of the host so canonical URLs keep
		// addressing the issuer that was actually configured.
		let host = match url.port() {
			Some(port) => format!("{host}:{port}"),
			None => host,
		};
		let segments = url
			.path_segments()
			.map(|segments| segments.filter(|s| !s.is_empty()).collect::<Vec<_>>())
			.unwrap_or_default();
		let Some(first) = segments.first() else {
			return Ok(Authority::Unknown { url });
		};

		match first.to_ascii_lowercase().as_str() {
			"adfs" => {
				let canonical = Url::parse(&format!("https://{host}/adfs"))
					.map_err(|source| MalformedAuthorityError::InvalidUrl { source })?;

				Ok(Authority::Adfs { url: canonical })
			},
			"b2c" | "tfp" => {
				// Shape is /{b2c|tfp}/{tenant}/{policy}; the policy is the last
				// of the two following segments.
				if segments.len() < 3 {
					return Err(MalformedAuthorityError::MissingPolicy);
				}

				Ok(Authority::B2c { policy: segments[2].to_owned(), url })
			},
			discriminator => {
				let audience = match discriminator {
					"organizations" => AadAudience::AnyOrganizationalAccount,
					"consumers" => AadAudience::AnyPersonalAccount,
					"common" => AadAudience::AllAccounts,
					tenant => AadAudience::SingleOrganization { tenant_id: tenant.to_owned() },
				};
				let slice = url
					.query_pairs()
					.find(|(key, _)| key == "slice" || key == "dc")
					.map(|(_, value)| value.into_owned());

				Ok(Authority::AzureAd { host, audience, slice })
			},
		}
	}

	/// Canonical issuer URL for this authority.
	pub fn canonical_url(&self) -> Url {
		match self {
			Authority::AzureAd { host, audience, .. } => {
				// Host and audience segment both came out of a successfully
				// parsed HTTPS URL, so recomposition cannot fail.
				Url::parse(&format!("https://{host}/{}", audience.path_segment()))
					.expect("Recomposed authority URL is always valid.")
			},
			Authority::B2c { url, .. }
			| Authority::Adfs { url }
			| Authority::Unknown { url } => url.clone(),
		}
	}

	/// Cloud login host the authority lives on, including any non-default port.
	pub fn host(&self) -> String {
		match self {
			Authority::AzureAd { host, .. } => host.clone(),
			Authority::B2c { url, .. }
			| Authority::Adfs { url }
			| Authority::Unknown { url } => match (url.host_str(), url.port()) {
				(Some(host), Some(port)) => format!("{host}:{port}"),
				(Some(host), None) => host.to_owned(),
				(None, _) => String::new(),
			},
		}
	}

	/// Stable variant label for spans and cache partitioning.
	pub const fn kind(&self) -> &'static str {
		match self {
			Authority::AzureAd { .. } => "aad",
			Authority::B2c { .. } => "b2c",
			Authority::Adfs { .. } => "adfs",
			Authority::Unknown { .. } => "unknown",
		}
	}
}
impl PartialEq for Authority {
	fn eq(&self, other: &Self) -> bool {
		mem::discriminant(self) == mem::discriminant(other)
			&& self.canonical_url() == other.canonical_url()
	}
}
impl Eq for Authority {}
impl Hash for Authority {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.kind().hash(state);
		self.canonical_url().as_str().hash(state);
	}
}
impl Display for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.canonical_url().as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn audience_discriminators_map_to_variants() {
		let consumers = Authority::resolve("https://login.microsoftonline.com/consumers")
			.expect("Consumers authority should resolve.");

		assert!(matches!(
			consumers,
			Authority::AzureAd { audience: AadAudience::AnyPersonalAccount, .. }
		));

		let organizations = Authority::resolve("https://login.microsoftonline.com/organizations")
			.expect("Organizations authority should resolve.");

		assert!(matches!(
			organizations,
			Authority::AzureAd { audience: AadAudience::AnyOrganizationalAccount, .. }
		));

		let common = Authority::resolve("https://login.microsoftonline.com/common")
			.expect("Common authority should resolve.");

		assert!(matches!(common, Authority::AzureAd { audience: AadAudience::AllAccounts, .. }));

		let tenant = Authority::resolve("https://login.microsoftonline.com/contoso.onmicrosoft.com")
			.expect("Tenant authority should resolve.");

		assert!(matches!(
			tenant,
			Authority::AzureAd { audience: AadAudience::SingleOrganization { .. }, .. }
		));
	}

	#[test]
	fn b2c_authorities_read_the_policy_and_keep_the_url() {
		let authority = Authority::resolve("https://Login.Microsoftonline.com/b2c/tenant/policy")
			.expect("B2C authority should resolve.");

		let Authority::B2c { policy, url } = &authority else {
			panic!("Expected a B2C authority.");
		};

		assert_eq!(policy, "policy");
		// Scheme and host are case-normalized; the path is preserved.
		assert_eq!(url.as_str(), "https://login.microsoftonline.com/b2c/tenant/policy");
		assert_eq!(authority.canonical_url().as_str(), url.as_str());
	}

	#[test]
	fn b2c_without_policy_segments_is_malformed() {
		assert!(matches!(
			Authority::resolve("https://login.microsoftonline.com/b2c/tenant"),
			Err(MalformedAuthorityError::MissingPolicy),
		));
	}

	#[test]
	fn adfs_and_unknown_shapes_resolve() {
		let adfs = Authority::resolve("https://adfs.contoso.com/adfs")
			.expect("ADFS authority should resolve.");

		assert_eq!(adfs.canonical_url().as_str(), "https://adfs.contoso.com/adfs");

		let unknown = Authority::resolve("https://login.microsoftonline.com")
			.expect("Pathless authority should resolve to Unknown.");

		assert!(matches!(unknown, Authority::Unknown { .. }));
	}

	#[test]
	fn malformed_inputs_are_rejected() {
		assert!(matches!(
			Authority::resolve("not a url"),
			Err(MalformedAuthorityError::InvalidUrl { .. }),
		));
		assert!(matches!(
			Authority::resolve("http://login.microsoftonline.com/common"),
			Err(MalformedAuthorityError::InsecureScheme { .. }),
		));
	}

	#[test]
	fn equality_is_variant_plus_canonical_url() {
		let a = Authority::resolve("https://login.microsoftonline.com/common")
			.expect("First authority should resolve.");
		let b = Authority::resolve("https://LOGIN.MICROSOFTONLINE.COM/common?slice=testslice")
			.expect("Second authority should resolve.");

		// The slice hint does not participate in identity.
		assert_eq!(a, b);

		let c = Authority::resolve("https://login.microsoftonline.com/consumers")
			.expect("Third authority should resolve.");

		assert_ne!(a, c);
	}

	#[test]
	fn non_default_ports_survive_canonicalization() {
		let authority = Authority::resolve("https://127.0.0.1:8443/common")
			.expect("Ported authority should resolve.");

		assert_eq!(authority.host(), "127.0.0.1:8443");
		assert_eq!(authority.canonical_url().as_str(), "https://127.0.0.1:8443/common");
	}

	#[test]
	fn slice_hint_is_captured() {
		let authority = Authority::resolve("https://login.microsoftonline.com/common?slice=dc1")
			.expect("Sliced authority should resolve.");
		let Authority::AzureAd { slice, .. } = authority else {
			panic!("Expected an AAD authority.");
		};

		assert_eq!(slice.as_deref(), Some("dc1"));
	}
}
