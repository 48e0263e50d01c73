//! # Inbox Harvest
//!
//! Imports video posts from a Telegram bot's inbox into a local media
//! catalog, either by polling (pull) or by webhook delivery (push).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Bot API     │──▶│  Classify  │──▶│ Entry builder│──▶│  SQLite  │
//! │ pull / push │   │ chat+media │   │ download/ref │   │ catalog  │
//! └─────────────┘   └────────────┘   └──────────────┘   │ + cursor │
//!                                                       └────┬─────┘
//!                      ┌─────────────────────────────────────┤
//!                      ▼                                     ▼
//!                 ┌──────────┐                         ┌──────────┐
//!                 │   CLI    │                         │   HTTP   │
//!                 │(harvest) │                         │ webhook  │
//!                 └──────────┘                         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest init
//! harvest configure --bot-token 123:abc --chat-id -1001234567890
//! harvest inspect                  # which chats is the bot seeing?
//! harvest sync                     # import pending videos
//! harvest serve                    # accept webhook deliveries
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Sync error taxonomy |
//! | [`traits`] | Inbox client and media storage seams |
//! | [`inbox_telegram`] | Bot API client |
//! | [`classify`] | Chat filter and media classification |
//! | [`builder`] | Catalog entry construction |
//! | [`media_store`] | Local media files |
//! | [`store`] | Catalog and sync state persistence |
//! | [`cursor`] | Update offset tracking |
//! | [`sync`] | Pull passes, push handling, inbox inspection |
//! | [`push`] | Background push worker |
//! | [`admin`] | Settings and webhook management |
//! | [`status`] | Status and catalog listing |
//! | [`progress`] | Sync progress reporting |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod admin;
pub mod builder;
pub mod classify;
pub mod config;
pub mod cursor;
pub mod db;
pub mod error;
pub mod inbox_telegram;
pub mod media_store;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod push;
pub mod server;
pub mod status;
pub mod store;
pub mod sync;
pub mod traits;
