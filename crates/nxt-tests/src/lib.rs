//! Integration tests for the brick gateway
//!
//! These tests run the full stack in-process: a [`MockBus`] stands in
//! for real hardware, the gateway listens on an ephemeral loopback
//! port, and `nxt-client` talks to it over real TCP.
//!
//! - `session_protocol.rs` - password gate, unknown commands, malformed
//!   packets
//! - `gateway_e2e.rs` - discovery, LIST/SEND/RECV, eviction on
//!   transport failure
//!
//! No hardware or system services are required; run with plain
//! `cargo test -p nxt-tests`.
//!
//! [`MockBus`]: nxt_transport::mock::MockBus

// This crate only contains tests, no library code
