//! Batch run orchestration.
//!
//! One account at a time, one query at a time:
//! - expand and dedupe the raw queries
//! - walk the account pool, pairing each account with a proxy by ordinal
//! - connect with bounded backoff, dead-letter on exhaustion or auth failure
//! - search every query until the quota is spent, writing classified records
//! - always disconnect before moving to the next account

use crate::{
    accounts::AccountPool,
    backoff::{retry, BackoffPolicy, Disposition, RetryBudget, RetryError, Sleeper},
    config::Config,
    deep_search::{expand_all, DeepSearchConfig},
    domain::{Account, CredentialDefaults, Entity, ResultRecord, SearchType, NO_LINK},
    errors::{ClientError, ErrorClass},
    ports::{DirectoryConnector, DirectorySession, ResultSink, SessionSpec},
    proxy::ProxyAssigner,
    report::RunSummary,
};

pub const CONNECT_ATTEMPTS: u32 = 5;
pub const SEARCH_ATTEMPTS: u32 = 6;
/// Largest page requested from a single search call.
pub const MAX_PAGE: usize = 20;

#[derive(Clone, Debug)]
pub struct RunSettings {
    pub search_type: SearchType,
    pub quota: usize,
    pub deep_search: DeepSearchConfig,
    pub backoff: BackoffPolicy,
    pub credentials: CredentialDefaults,
    pub connect_attempts: u32,
    pub search_attempts: u32,
    pub rate_limit_max_waits: u32,
}

impl RunSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            search_type: cfg.search_type,
            quota: cfg.limit,
            deep_search: cfg.deep_search,
            backoff: cfg.backoff(),
            credentials: cfg.credential_defaults(),
            connect_attempts: CONNECT_ATTEMPTS,
            search_attempts: SEARCH_ATTEMPTS,
            rate_limit_max_waits: cfg.rate_limit_max_waits,
        }
    }
}

/// Mutable state of one run. Only the orchestrator loop touches it.
#[derive(Debug)]
struct RunState {
    remaining: usize,
    /// Accounts attempted so far; drives proxy assignment.
    ordinal: usize,
}

/// Why processing of a connected account stopped early.
#[derive(Debug)]
enum AccountStop {
    /// Authentication is permanently broken: dead-letter.
    Fatal(ClientError),
    /// Unknown failure: leave the account alone and move on.
    Unexpected(String),
}

pub struct Orchestrator<'a> {
    settings: RunSettings,
    connector: &'a dyn DirectoryConnector,
    sink: &'a dyn ResultSink,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        settings: RunSettings,
        connector: &'a dyn DirectoryConnector,
        sink: &'a dyn ResultSink,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            settings,
            connector,
            sink,
            sleeper,
        }
    }

    /// Execute the whole run. Failures are absorbed; they only show up as
    /// fewer records and in the returned summary.
    pub async fn run(
        &self,
        queries: &[String],
        pool: &mut AccountPool,
        proxies: &ProxyAssigner,
    ) -> RunSummary {
        let expanded = expand_all(queries, &self.settings.deep_search);
        let mut summary =
            RunSummary::new(self.settings.search_type, self.settings.quota, pool.len());
        summary.expanded_queries = expanded.len();
        tracing::info!(
            raw = queries.len(),
            expanded = expanded.len(),
            quota = self.settings.quota,
            "starting run"
        );

        let mut state = RunState {
            remaining: self.settings.quota,
            ordinal: 0,
        };

        while !expanded.is_empty() && state.remaining > 0 {
            let Some(account) = pool.next_account() else {
                break;
            };
            let ordinal = state.ordinal;
            state.ordinal += 1;
            let proxy = proxies.pick(ordinal).cloned();

            let Some(credentials) = account.credentials(&self.settings.credentials) else {
                tracing::error!(account = %account.label(), "missing api_id/api_hash, skipping");
                summary.accounts_skipped += 1;
                continue;
            };

            let spec = SessionSpec {
                session_path: account.session_path.clone(),
                credentials,
                proxy,
            };
            let mut session = match self.connect(&account, &spec).await {
                Ok(s) => s,
                Err(reason) => {
                    tracing::error!(account = %account.label(), "could not start account: {reason}");
                    pool.mark_dead(&account, &reason);
                    continue;
                }
            };
            summary.accounts_connected += 1;

            let outcome = self
                .search_all(session.as_ref(), &expanded, &mut state, &mut summary)
                .await;
            session.disconnect().await;

            match outcome {
                Ok(()) => {}
                Err(AccountStop::Fatal(e)) => {
                    tracing::error!(account = %account.label(), "critical account error: {e}");
                    pool.mark_dead(&account, &e.to_string());
                }
                Err(AccountStop::Unexpected(msg)) => {
                    tracing::error!(account = %account.label(), "abandoning account: {msg}");
                    summary.accounts_abandoned += 1;
                }
            }
        }

        summary.finish(state.remaining, pool.dead_letters());
        tracing::info!(
            channels = summary.channel_records,
            chats = summary.chat_records,
            remaining = summary.remaining,
            dead = summary.dead_letters.len(),
            "run finished"
        );
        summary
    }

    /// Open a session, retrying with backoff. Every attempt uses a fresh
    /// session object. `Err` carries the dead-letter reason.
    async fn connect(
        &self,
        account: &Account,
        spec: &SessionSpec,
    ) -> Result<Box<dyn DirectorySession>, String> {
        let budget = RetryBudget {
            attempts: self.settings.connect_attempts,
            max_waits: self.settings.rate_limit_max_waits,
        };
        let classify = |e: &ClientError| match e.class() {
            ErrorClass::AccountFatal => Disposition::Fatal,
            ErrorClass::RateLimited(wait) => Disposition::Wait(wait),
            ErrorClass::Transient | ErrorClass::Unexpected => Disposition::Retry,
        };

        let result = retry(&self.settings.backoff, self.sleeper, budget, classify, |attempt| {
            let mut session = self.connector.session(spec.clone());
            let label = account.label();
            async move {
                tracing::debug!(account = %label, attempt, "connecting");
                match session.connect().await {
                    Ok(()) => Ok(session),
                    Err(e) => {
                        tracing::warn!(account = %label, attempt, "start failed: {e}");
                        Err(e)
                    }
                }
            }
        })
        .await;

        match result {
            Ok(session) => {
                let proxy = spec.proxy.as_ref().map(|p| p.to_string());
                tracing::info!(account = %account.label(), proxy = ?proxy, "client started");
                Ok(session)
            }
            Err(RetryError::Fatal(e)) => Err(e.to_string()),
            Err(RetryError::Exhausted(e)) | Err(RetryError::TooManyWaits(e)) => {
                Err(format!("connect attempts exhausted: {e}"))
            }
        }
    }

    async fn search_all(
        &self,
        session: &dyn DirectorySession,
        queries: &[String],
        state: &mut RunState,
        summary: &mut RunSummary,
    ) -> Result<(), AccountStop> {
        for query in queries {
            if state.remaining == 0 {
                break;
            }

            let limit = MAX_PAGE.min(state.remaining);
            tracing::info!(query = %query, limit, "searching");
            let entities = self.search_one(session, query, limit).await?;
            self.ingest(session, entities, state, summary).await?;

            self.settings.backoff.sleep(self.sleeper, 0).await;
        }
        Ok(())
    }

    /// One query with its own retry budget. Exhaustion degrades to an empty
    /// page; auth and unclassified failures stop the account.
    async fn search_one(
        &self,
        session: &dyn DirectorySession,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Entity>, AccountStop> {
        let budget = RetryBudget {
            attempts: self.settings.search_attempts,
            max_waits: self.settings.rate_limit_max_waits,
        };
        let classify = |e: &ClientError| match e.class() {
            ErrorClass::Transient => Disposition::Retry,
            ErrorClass::RateLimited(wait) => Disposition::Wait(wait),
            ErrorClass::AccountFatal | ErrorClass::Unexpected => Disposition::Fatal,
        };

        match retry(&self.settings.backoff, self.sleeper, budget, classify, |_| {
            session.search(query, limit)
        })
        .await
        {
            Ok(entities) => Ok(entities),
            Err(RetryError::Fatal(e)) if e.is_account_fatal() => Err(AccountStop::Fatal(e)),
            Err(RetryError::Fatal(e)) => Err(AccountStop::Unexpected(e.to_string())),
            Err(RetryError::Exhausted(e)) | Err(RetryError::TooManyWaits(e)) => {
                tracing::warn!(query, "search gave up, treating as empty: {e}");
                Ok(Vec::new())
            }
        }
    }

    async fn ingest(
        &self,
        session: &dyn DirectorySession,
        entities: Vec<Entity>,
        state: &mut RunState,
        summary: &mut RunSummary,
    ) -> Result<(), AccountStop> {
        for entity in entities {
            if state.remaining == 0 {
                break;
            }
            if !self.settings.search_type.admits(entity.kind) {
                tracing::debug!(kind = ?entity.kind, "filtered out");
                continue;
            }

            let participants = session
                .participant_count(&entity)
                .await
                .or(entity.participants_hint)
                .unwrap_or(0);
            let link = session.link(&entity).unwrap_or_else(|| NO_LINK.to_string());
            let record = ResultRecord {
                title: entity.display_title().to_string(),
                participants,
                link,
            };

            let partition = entity.kind.partition();
            self.sink
                .append(partition, &record)
                .map_err(|e| AccountStop::Unexpected(format!("result sink: {e}")))?;
            state.remaining -= 1;
            summary.record(partition);
        }
        Ok(())
    }
}
