pub mod document;
pub mod extract;
pub mod reconcile;

pub use document::Document;
pub use extract::{extract_units, Extraction, TranslatableUnit, UnitKind};
pub use reconcile::{reconcile, resolve_replacement, BlockContext, ReconcileOutcome, Resolution};
