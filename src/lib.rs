// sift: fingerprint-addressed content moderation
//
// This is the library root. Each module corresponds to a major subsystem
// of the moderation pipeline.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod jobs;
pub mod output;
pub mod pipeline;
pub mod signals;
pub mod status;
pub mod verdict;

#[cfg(feature = "web")]
pub mod web;
