//! Cached, coalescing sync layer for affiliate and bonus reward data.
//!
//! Each feature domain gets a [`manager::DomainManager`] that owns a set of
//! slices (rates, referrals, dashboard summary, member detail), decides when a
//! cached copy is fresh enough to serve, and funnels concurrent refreshes
//! through a shared [`coalesce::RequestCoalescer`].

pub mod api;
pub mod app;
pub mod cache;
pub mod claim;
pub mod clock;
pub mod coalesce;
pub mod config;
pub mod domain;
pub mod manager;
pub mod notify;
pub mod referrals;
pub mod session;
pub mod slice;

#[cfg(test)]
mod testing;
