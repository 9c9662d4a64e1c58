pub mod apply;
pub mod normalize;
pub mod order;
pub mod report;

pub use apply::{apply_mutations, FailurePolicy, ImportError};
pub use normalize::{normalize_batch, NormalizedBatch, PendingMutation};
pub use order::sort_mutations;
pub use report::ImportResult;
