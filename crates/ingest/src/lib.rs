//! Access-log ingestion: turning appended log lines into routed events.
//!
//! This crate provides:
//! - `CompiledPattern`: log-format template → anchored named-capture regex
//! - `LineParser`: one raw line → normalized `Event` or a `Rejection`
//! - `EnrichmentStage`: best-effort geo/bot decoration after parsing
//! - `TailSource`: rotation-tolerant follower of a growing file
//! - `router`: bounded fan-in of every project's events into one stream

pub mod enrich;
pub mod parser;
pub mod pattern;
pub mod router;
pub mod tail;

pub use enrich::{BotClassifier, EnrichError, Enricher, EnrichmentStage, GeoTable};
pub use parser::{LineParser, Rejection};
pub use pattern::{CompiledPattern, PatternError};
pub use router::{EventSender, EventStream};
pub use tail::{TailError, TailSource};
