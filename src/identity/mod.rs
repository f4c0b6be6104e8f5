//! Identity provider integration: the gateway trait, the Firebase Auth
//! REST implementation, and an in-memory gateway for tests.

pub mod firebase;
pub mod gateway;
pub mod memory;
