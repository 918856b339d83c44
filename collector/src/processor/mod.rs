//! Built-in processor factories.
//!
//! Processors sit between receivers and exporters, transforming, holding,
//! or dropping batches. Every processor is itself a consumer for its
//! signal and forwards to the consumer it was created with, so chains
//! compose by construction order alone.
//!
//! Batches are immutable by convention: a processor that modifies data
//! builds a new batch and forwards that one.

pub mod attributes;
pub mod batch;
pub mod probabilistic_sampler;
pub mod queued_retry;
pub mod tail_sampling;

pub use attributes::AttributesProcessorFactory;
pub use batch::BatchProcessorFactory;
pub use probabilistic_sampler::ProbabilisticSamplerFactory;
pub use queued_retry::QueuedRetryProcessorFactory;
pub use tail_sampling::TailSamplingProcessorFactory;
