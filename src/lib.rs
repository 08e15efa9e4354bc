/// Utilities for reading the game's big-endian data files and archives
pub mod data;
/// Error definitions
pub mod error;
/// Text dumps of parsed formats
pub mod export;
/// Model, texture, collision and scene formats
pub mod models;
/// Generic wrapper for values that may or may not match a known variant.
pub mod recognized;

#[cfg(feature = "arc")]
pub type Rc<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub type Rc<T> = std::rc::Rc<T>;
