//! Codeloom Storage - file-backed persistence for plans, tasks and schedules.
//!
//! Documents live under a project-local hidden directory (`.codeloom/`).
//! Every write is atomic (temp file + rename) so concurrent readers never
//! observe a partially written document.

mod document_store;
mod json;
pub mod paths;

pub use document_store::{FileDocumentStore, write_atomic};
pub use json::{read_json_or_default, write_json};
