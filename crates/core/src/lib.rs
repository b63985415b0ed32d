// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! immap-core: shared types for the image-map placement engine.
//!
//! Holds the durable data model (`ImageMap`, `ImageSpec`), the identifiers
//! instances and images are addressed by, the `Clock` abstraction, the
//! engine-wide error taxonomy, and runtime configuration.

pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod image_map;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{Config, PolicyName};
pub use error::EngineError;
pub use ids::{GlobalId, InstanceId};
pub use image_map::{ImageMap, ImageMapState, ImageSpec};
