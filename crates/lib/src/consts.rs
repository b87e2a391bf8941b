//! Well-known metadata keys and defaults shared across modules.

/// Metadata key holding the discriminant value of a group document.
pub const GROUP_KEY: &str = "GroupKey";

/// Metadata key holding the ordered member documents of a group document.
pub const GROUP_DOCUMENTS: &str = "GroupDocuments";

/// Character repeated by the default front matter delimiter.
pub const DEFAULT_DELIMITER_CHAR: char = '-';

/// Minimum repetitions for the default front matter delimiter (`---`).
pub const DEFAULT_DELIMITER_MIN: usize = 3;

/// Parallelism used when the platform cannot report it.
pub const FALLBACK_PARALLELISM: usize = 4;
