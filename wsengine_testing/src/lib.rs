//! Utilities for exercising a [`ConnectionDriver`](wsengine::ConnectionDriver)
//! over real loopback sockets during tests.
//!
//! [`upgraded_pair`] yields the server half of a connected TCP pair as an
//! [`UpgradedConnection`](wsengine::UpgradedConnection) together with a
//! [`TestClient`] that speaks masked client frames and decodes whatever the
//! server sends back.
//!
//! ```rust,no_run
//! use wsengine_testing::upgraded_pair;
//!
//! # async fn example() -> std::io::Result<()> {
//! let (upgraded, mut client) = upgraded_pair().await?;
//! let transport = upgraded
//!     .takeover()
//!     .map_err(|failure| std::io::Error::other(failure.error))?;
//! client.send_text("hello").await?;
//! # drop(transport);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod logging;
pub mod socket;

pub use client::{TEST_MASK, TestClient, encode_client_frame};
pub use logging::{LoggerHandle, logger};
pub use socket::{upgraded_pair, upgraded_pair_with};
