//! Shared client state: node connection settings persisted under the user's config directory.

pub mod node;
