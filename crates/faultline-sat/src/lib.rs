//! Incremental SAT solving context for symbolic circuit unrolling.
//!
//! Wraps the varisat solver behind a [`SatCtx`] that offers exactly what the
//! verification procedures need: fresh variables, Tseitin gate constructors
//! with constant folding, totalizer-based cardinality indicators, permanent
//! clauses, one-shot assumptions, and model readback after a satisfiable
//! check. The context is passed explicitly by `&mut`; one context is created
//! per procedure run and dropped afterwards, bounding solver memory.

pub mod cardinality;
mod ctx;

pub use ctx::{SatCtx, SatResult};
pub use varisat::Lit;
