//! Auth-domain identifiers, token secrets, and cached credentials.

pub mod credential;
pub mod id;
pub mod secret;

pub use credential::*;
pub use id::*;
pub use secret::*;
