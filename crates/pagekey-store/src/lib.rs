//! # pagekey-store
//!
//! Where pages live.
//!
//! This crate provides:
//! - [`PageStore`], the storage seam the rest of pagekey talks to
//! - [`FilesystemStore`], one `<key>.md` file per page with atomic writes
//!   and a timestamped holding area for soft-deleted pages
//! - [`PageRepository`], the normal read path that runs rolling content
//!   migrations and writes the result back
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pagekey_store::{FilesystemStore, PageRepository, StoreConfig};
//!
//! let store = Arc::new(FilesystemStore::from_config(&StoreConfig::from_env()));
//! store.validate().await?;
//!
//! let pages = PageRepository::new(store);
//! let content = pages.read_page("MyPage").await?;
//! ```

pub mod backend;
pub mod filesystem;
pub mod repository;

pub use backend::PageStore;
pub use filesystem::{FilesystemStore, StoreConfig};
pub use repository::PageRepository;
