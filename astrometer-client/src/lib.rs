//! Client for the thumbnail service that turns a frame id into a viewable
//! image URL.
//!
//! Works in both native Rust (reqwest) and WASM (gloo-net) builds.

mod thumbnail_client;

pub use thumbnail_client::{
    parse_response, ThumbnailClient, ThumbnailError, ThumbnailOptions, DEFAULT_THUMBNAIL_URL,
};
