//! Slack Integration - RTM bot interface
//!
//! This crate provides the Slack interface for courier:
//! - **Web API** (`api`) - `users.list`, `chat.postMessage`, `conversations.history`
//! - **Events** (`events`) - classification of raw RTM events into a closed enum
//! - **Commands** (`commands`) - `.help`, `.echo`, `.fortune` dispatch
//! - **History** (`history`) - cursor-paginated transcript backfill
//! - **Session** (`rtm`) - connect → read → classify → dispatch loop
//!
//! # Architecture
//!
//! ```text
//! RTM stream → classify() → RtmRunner → CommandDispatcher
//!                                ↓              ↓
//!                          UserDirectory   OutboundSender
//! ```
//!
//! # Key Types
//!
//! - `RtmRunner` - session loop with reconnection logic
//! - `ClassifiedEvent` - exhaustive variant over the loosely-typed stream
//! - `CommandDispatcher` - fixed command table with private replies
//! - `HistoryPaginator` - full-transcript retrieval with partial-result semantics

pub mod api;
pub mod commands;
pub mod events;
pub mod history;
pub mod rtm;
