//! Client for the Baidu Zhangmen music box service.
//!
//! The service exposes its catalog through numbered operations on a single
//! HTTP endpoint that answer with XML. This crate provides:
//!
//! * [`client::Client`] to list playlists per category, songs per playlist
//!   and download sources per song, with responses cached for a day
//! * [`downloader::Downloader`] to fetch audio with bounded retries across
//!   sources
//! * [`catalog::scan`] to walk all categories until the catalog runs dry
//! * [`store::Store`] to keep the response cache on disk between runs
//!
//! All operations run sequentially on one client; none of them are meant
//! to be awaited concurrently.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

#[macro_use]
extern crate log;

pub mod cache;
pub mod catalog;
pub mod client;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod protocol;
pub mod proxy;
pub mod query;
pub mod store;
pub mod text;
