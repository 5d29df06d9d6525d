//! fitplan - retrieval-grounded training plan generation
//!
//! Build flow: [`document`] → [`chunking`] → [`embeddings`] → [`index`].
//! Query flow: [`retrieval`] → [`plan`]. [`pipeline::Pipeline`] wires the
//! pieces together from a validated [`config::Config`].

pub mod chunking;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod plan;
pub mod retrieval;
pub mod retry;

pub use error::{PipelineError, Result};
pub use pipeline::Pipeline;
