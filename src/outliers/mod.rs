//! Error filtering of raw (speed, acceleration) samples
//!
//! Two stages run in order: [`MisuseFilter`] removes athlete-days dominated
//! by physiologically implausible readings, then [`ClusterFilter`] removes
//! readings isolated from the athlete's trajectory cloud. Each stage flags
//! from a snapshot of the store before anything is removed.

pub mod cluster;
pub mod dbscan;
pub mod misuse;

pub use cluster::ClusterFilter;
pub use dbscan::{ClusterLabel, Dbscan};
pub use misuse::{MisuseFilter, PlausibilityEnvelope};
