//! # Tengwar Emotion Engine
//!
//! Seven bounded affect dimensions shared by the thought daemon and the
//! dialogue handler.
//!
//! ## Update model
//!
//! Every mutation is one critical section: read the current state, decay it
//! by the time elapsed since its last update, apply the event rules, clamp,
//! then publish and journal the result. Concurrent callers queue on the same
//! lock, so one update always completes before the next begins.
//!
//! Decay strength follows the time engine: a silence measured in hours or
//! days pulls harder toward baseline than one measured in moments.

mod engine;

pub use engine::EmotionEngine;
