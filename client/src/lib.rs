//! # Arena Client Library
//!
//! Client-side implementation of the vehicle combat arena: vehicle dynamics,
//! locally-simulated projectiles, remote player mirrors, and the UDP loop
//! that keeps them synchronized with the authoritative server.
//!
//! ## Architecture Overview
//!
//! The client owns its vehicle completely. Movement is simulated locally
//! against the rigid-body capability and reported to the server, which
//! rebroadcasts it verbatim; the server only arbitrates combat (health,
//! score, bullet lifetimes). Projectiles exist on every peer, but only their
//! firing client detects hits and raises claims, speculatively hiding the
//! bullet until the server's removal ack confirms the hit or a reconcile
//! window rolls it back.
//!
//! ## Module Organization
//!
//! - [`physics`]: the `RigidBodyWorld` capability trait plus a kinematic
//!   reference implementation used headless and in tests
//! - [`vehicle`]: keyboard booleans to impulses, stabilization, drift,
//!   debounced collision penalties
//! - [`bullets`]: local projectile simulation with speculative hit claims
//! - [`game`]: the client world applying the full server message set
//! - [`input`]: key state collection with fire edge detection
//! - [`scene`]: the rendering boundary; backends implement `Scene`
//! - [`network`]: socket, handshake, and the `select!`-driven main loop

pub mod bullets;
pub mod game;
pub mod input;
pub mod network;
pub mod physics;
pub mod scene;
pub mod vehicle;
