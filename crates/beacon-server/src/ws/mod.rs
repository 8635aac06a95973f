//! WebSocket gateway: session lifecycle, identity registry, message
//! dispatch, and peer fan-out.
//!
//! `dispatcher` runs one loop per connection; it decodes frames with the
//! `beacon-core` codec and routes them. `registry` owns the id→session
//! map and mints identities. `broadcast` delivers to peers with the
//! sender excluded.

pub mod broadcast;
pub mod dispatcher;
pub mod registry;
pub mod session;
