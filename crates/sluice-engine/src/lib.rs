//! Transfer engine for the sluice gateway: destination naming and conflict
//! resolution, the cross-provider copy/move orchestrator, and folder ZIP
//! assembly. Everything here operates on `dyn StorageProvider` values the
//! pipeline constructs per request.

pub mod naming;
pub mod transfer;
pub mod zipper;

pub use naming::ConflictPolicy;
pub use transfer::{copy_or_move, TransferOptions, TransferOutcome, TransferRequest};
pub use zipper::zip_folder;
