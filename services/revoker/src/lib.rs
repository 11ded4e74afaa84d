//! REMS entitlement revoker library.
//!
//! The agent listens for REMS event notifications. When a user is added to a
//! resource's deny list, or one of their applications is revoked, it revokes
//! every other application still granting that user an active entitlement to
//! the same resource.
//!
//! ## Modules
//!
//! - `client`: REMS API client (entitlement listing, application revocation)
//! - `resolver`: discovery of applications behind active entitlements
//! - `driver`: per-policy revocation with partial-failure tolerance
//! - `router`: event validation and workflow orchestration
//! - `api`: HTTP surface (`PUT /event`, health probes)

pub mod api;
pub mod client;
pub mod config;
pub mod driver;
pub mod resolver;
pub mod router;

pub use client::{ApplicationId, MockRemsApi, RemsApi, RemsClient, UpstreamError};
pub use config::{Config, RevocationPolicy};
pub use router::{EventRouter, RouteError, RouteOutcome};
