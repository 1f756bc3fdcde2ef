//! Auth-domain accounts, scope sets, operation parameters, and results.

pub mod account;
pub mod params;
pub mod result;
pub mod scope;
pub mod secret;

pub use account::*;
pub use params::*;
pub use result::*;
pub use scope::*;
pub use secret::*;
