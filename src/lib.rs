/// Upload Watch Bot Library
/// 
/// This library provides the core functionality for the YouTube upload
/// announcement bot: API key rotation, fetching, new upload detection,
/// duplicate suppression, history persistence and the Telegram plumbing.

pub mod announcer;
pub mod bot;
pub mod config;
pub mod detector;
pub mod fetcher;
pub mod gate;
pub mod handlers;
pub mod history;
pub mod http_server;
pub mod keys;
pub mod poller;
pub mod scheduler;
pub mod youtube;
