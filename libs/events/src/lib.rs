//! # rems-events
//!
//! Event notification payloads emitted by REMS and the extraction of the
//! (user, resource) pair each one concerns.
//!
//! ## Event Shape
//!
//! REMS delivers one event per request as a flat JSON object with
//! namespaced keys:
//! - `event/id` identifies the event and is used for log correlation
//! - `event/type` selects the handler (e.g. `blacklist.event/add`)
//! - a type-specific nested body (`event/blacklist`, `event/application`)
//!
//! ## Supported Event Types
//!
//! - `blacklist.event/add`: a user was added to a resource's deny list
//! - `application.event/revoked`: an application was revoked by a handler
//!
//! Each type maps to an extractor through [`EventKind`], which is the only
//! place that knows the nesting of a given event body.

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::EventError;
pub use types::*;
