#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (temporary source/destination trees and tool availability checks).

pub mod fixtures;
