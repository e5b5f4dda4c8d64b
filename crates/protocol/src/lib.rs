//! Beacon Protocol - Core types for the route emitter
//!
//! This crate provides the value types that flow between the routing table,
//! the syncer, and the emitters:
//! - `RoutingKey` - identity of a routable target (process + container port)
//! - `ModificationTag` - epoch/index version stamp for monotonic updates
//! - `Route` / `Endpoint` - the two sides of a routing-table entry
//! - `RegistryMessage` - the register/unregister payload published to routers
//! - `RouterGreeting` - the handshake payload exchanged on the bus
//! - `DesiredLrp` / `ActualLrp` / `Event` - the cluster workload model
//!
//! # Design Principles
//!
//! - Plain owned data: everything here is `Clone` and cheap to move between
//!   tasks; nothing borrows from transport buffers.
//! - Wire formats live next to the types that produce them; field names on
//!   the bus are part of the router contract and must not drift.

mod domains;
mod endpoint;
mod key;
mod messages;
mod modification_tag;
mod route;
mod workload;

pub use domains::DomainSet;
pub use endpoint::{Address, Endpoint, EndpointKey};
pub use key::RoutingKey;
pub use messages::{
    subjects, RegistrationIdentity, RegistryMessage, RouterGreeting, TcpRouteMapping,
};
pub use modification_tag::ModificationTag;
pub use route::{Route, TcpRouteSpec};
pub use workload::{ActualLrp, DesiredLrp, DesiredRoutes, Event, InstanceState, PortMapping};
