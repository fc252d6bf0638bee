//! Datalink: data-pipeline health for monitoring collect configurations
//!
//! Surfaces where a collect configuration's data stands across the three
//! pipeline stages (collecting, transfer, storage) and provisions the default
//! alert strategies that watch the collecting stage.
//!
//! # Features
//!
//! - **Alert density**: open alerts per host rebuilt from sparse open/close counts
//! - **Stage status**: alert histograms and strategy summaries per stage
//! - **Transfer metrics**: data-point counts and latest values per collect configuration
//! - **Default strategies**: typed strategy bodies, created once per label
//!
//! # Example
//!
//! ```
//! use datalink::histogram::{reconstruct, SparseCounts};
//! use std::collections::BTreeSet;
//!
//! let targets: BTreeSet<String> = ["h1".to_string()].into_iter().collect();
//! let mut counts = SparseCounts::new();
//! counts.add_init("h1", 3);
//! counts.add_begin("h1", 0, 2);
//! counts.add_end("h1", 0, 1);
//!
//! let histogram = reconstruct(&targets, 0, 3599, 3600, &counts).unwrap();
//! assert_eq!(histogram.aggregate[0].count(), 4);
//! ```

pub mod api;
pub mod datalink;
pub mod events;
pub mod histogram;
pub mod metrics;
pub mod remote;
pub mod strategy;

// Re-export commonly used types
pub use datalink::{DataLinkError, DataLinkService, DataLinkStage};
pub use histogram::{reconstruct, DensityHistogram, HistogramError, SparseCounts};
