//! Vigil: Service Liveness Registry
//!
//! Independent service instances publish liveness into a replicated,
//! strongly consistent key-value substrate; consumers query or watch that
//! state. The substrate's transactions are the only coordination
//! mechanism: every mutation lands atomically across the primary record
//! and three derived index families, and liveness is expressed as a
//! TTL lease on the UP marker rather than a stored boolean.
//!
//! Key layout (root configurable per deployment):
//!
//! ```text
//! /<ns>/services/by-uuid/<uuid>                  serialized record
//! /<ns>/services/by-status/<UP|DOWN>/<uuid>      marker (UP lease-bound)
//! /<ns>/services/by-type-host/<type>/<host>      value = uuid
//! /<ns>/services/by-region/<region>/<uuid>       marker
//! ```
//!
//! Entry point is [`registry::Registry`], generic over any
//! [`substrate::Substrate`]: `etcd` in production, `memory` for tests and
//! embedding.

pub mod cli;
pub mod config;
pub mod error;
pub mod keys;
pub mod logging;
pub mod record;
pub mod registry;
pub mod substrate;
