//! Service layer: object store client, asset lifecycle services, ingress
//! guard, capability minting, reconciliation sweeper, and the client-side
//! upload orchestrator.

pub mod asset_service;
pub mod capability;
pub mod ingress;
pub mod object_store;
pub mod orchestrator;
pub mod sweeper;
