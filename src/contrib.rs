//! Optional integrations built on top of [`ServiceClient`](crate::client::ServiceClient).

pub mod permissions;
