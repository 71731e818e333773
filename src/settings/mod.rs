//! Saved UI configurations.

pub mod store;

pub use store::SavedConfigStore;
