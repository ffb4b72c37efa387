//! # scoreengine — Attack/Defense Exercise Scoring Engine
//!
//! Periodically probes every enabled team's services, records pass/fail per
//! round and drives an optional bank webhook.
//!
//! A dispatch cycle flows through the modules in this order:
//!
//! ```text
//! scheduler ─▶ builder (credentials) ─▶ dispatch ─▶ invoker (checks) ─▶ recorder ─▶ bank
//! ```
//!
//! Persistence goes through the [`store::ScoreStore`] trait, implemented by
//! PostgreSQL ([`db::Database`]) and an in-memory store for tests.

pub mod bank;
pub mod builder;
pub mod checks;
pub mod config;
pub mod credentials;
pub mod cycles;
pub mod db;
pub mod dispatch;
pub mod invoker;
pub mod recorder;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod task;
pub mod worker;
