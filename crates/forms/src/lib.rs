//! Server-side form state for interactive cards.
//!
//! A form card renders a list of [`FormField`]s. Every interaction comes
//! back as a callback; [`FormSync`] folds it into the stored field list and
//! answers with the private data the viewer should see next.

pub mod field;
pub mod messages;
pub mod sync;

pub use field::{CheckboxItem, FieldKind, FieldType, FormField, SelectOption};
pub use messages::{FormMessages, Locale};
pub use sync::{FieldUpdate, FormState, FormStatus, FormSync, SyncOutcome};
