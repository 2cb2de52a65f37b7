// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::runtime::*;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace to watch; all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Number of reconcile workers draining the queue
    pub workers: usize,
    /// Interval between full relists of the parent kind
    pub resync_interval: Duration,
    /// Attempts per create-or-patch before giving up on conflicts
    pub max_conflict_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// How long in-flight reconciliations may run after shutdown starts
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            watch_namespace: None,
            workers: DEFAULT_WORKERS,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_SECS),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MILLIS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let watch_namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());
        let workers = parse_or("WORKER_COUNT", &lookup, defaults.workers)?;
        if workers == 0 {
            anyhow::bail!("WORKER_COUNT must be at least 1");
        }
        let max_conflict_retries =
            parse_or("MAX_CONFLICT_RETRIES", &lookup, defaults.max_conflict_retries)?;
        if max_conflict_retries == 0 {
            anyhow::bail!("MAX_CONFLICT_RETRIES must be at least 1");
        }

        let resync_secs = parse_or("RESYNC_INTERVAL_SECS", &lookup, DEFAULT_RESYNC_SECS)?;
        if resync_secs == 0 {
            anyhow::bail!("RESYNC_INTERVAL_SECS must be at least 1");
        }

        let backoff_base = Duration::from_millis(parse_or(
            "BACKOFF_BASE_MILLIS",
            &lookup,
            DEFAULT_BACKOFF_BASE_MILLIS,
        )?);
        let backoff_max = Duration::from_secs(parse_or(
            "BACKOFF_MAX_SECS",
            &lookup,
            DEFAULT_BACKOFF_MAX_SECS,
        )?);
        if backoff_base.is_zero() {
            anyhow::bail!("BACKOFF_BASE_MILLIS must be at least 1");
        }
        if backoff_max < backoff_base {
            anyhow::bail!(
                "BACKOFF_MAX_SECS ({:?}) must not be below BACKOFF_BASE_MILLIS ({:?})",
                backoff_max,
                backoff_base
            );
        }

        Ok(Config {
            watch_namespace,
            workers,
            resync_interval: Duration::from_secs(resync_secs),
            max_conflict_retries,
            backoff_base,
            backoff_max,
            shutdown_grace: Duration::from_secs(parse_or(
                "SHUTDOWN_GRACE_SECS",
                &lookup,
                DEFAULT_SHUTDOWN_GRACE_SECS,
            )?),
        })
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}
