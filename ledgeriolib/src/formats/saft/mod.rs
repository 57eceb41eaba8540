//! Норвежский SAF-T Financial.

pub(crate) mod counting;
pub mod reader;
pub mod tags;
pub mod text;
pub mod writer;

pub use reader::{SaftReader, UNASSIGNED_ACCOUNT};
pub use writer::{SaftWriter, SyntheticLedger, SyntheticLine, SyntheticTransaction};
