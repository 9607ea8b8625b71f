mod consolidate;
mod entity;
mod error;
mod mapping;
mod placeholder;
mod reverse;
mod session;
mod substitute;

pub use consolidate::{ProcessingPlan, VariationConsolidator};
pub use entity::{normalize_kind, Entity};
pub use error::{MappingError, Result};
pub use mapping::{Mapping, PlaceholderMap};
pub use placeholder::{is_placeholder, Placeholder, PlaceholderAllocator};
pub use reverse::{reverse, DeanonymizationStats};
pub use session::{AnonymizationSession, AnonymizedText, PAGE_BREAK};
pub use substitute::substitute;
