//! Centralized default constants for pagekey.
//!
//! Every crate references these constants instead of defining its own
//! magic numbers.

// =============================================================================
// JOB QUEUES
// =============================================================================

/// Fixed dispatch capacity of each named queue. Submissions beyond this
/// are rejected at enqueue time instead of blocking the caller.
pub const QUEUE_CAPACITY: usize = 1024;

/// Capacity of the coordinator's completion-event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// CONTENT
// =============================================================================

/// Number of leading bytes inspected when sniffing a frontmatter format.
pub const FORMAT_SNIFF_LEN: usize = 3;

// =============================================================================
// STORAGE
// =============================================================================

/// Default data directory of the file-backed page store.
pub const DATA_DIR: &str = "./data";

/// Name of the recoverable holding area for soft-deleted pages.
pub const DELETED_DIR: &str = "__deleted__";

/// File extension of stored pages.
pub const PAGE_EXTENSION: &str = "md";

// =============================================================================
// SWEEP
// =============================================================================

/// Queue name the identifier scanner runs under.
pub const SCAN_JOB_NAME: &str = "identifier_migration_scan";

/// Whether the sweep is dispatched at startup.
pub const SWEEP_ON_STARTUP: bool = false;
