//! In-memory store with optional JSON snapshot persistence.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::models::*;
use super::{Store, StoreResult};

/// Default number of access log entries kept in memory.
pub const DEFAULT_LOG_RETENTION: usize = 10_000;

/// What survives a restart. Access logs and rate-limit counters do not.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    services: Vec<Service>,
    users: Vec<User>,
    policies: Vec<UserServicePolicy>,
}

/// A thread-safe store backed by concurrent maps.
pub struct MemoryStore {
    /// host -> service
    services: DashMap<String, Service>,
    /// user id -> user
    users: DashMap<String, User>,
    /// (user id, service id) -> policy
    policies: DashMap<(String, String), UserServicePolicy>,
    /// Oldest first; bounded by `log_retention`.
    logs: Mutex<VecDeque<AccessLogEntry>>,
    log_retention: usize,
    snapshot_path: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_RETENTION, None)
    }
}

impl MemoryStore {
    pub fn new(log_retention: usize, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            services: DashMap::new(),
            users: DashMap::new(),
            policies: DashMap::new(),
            logs: Mutex::new(VecDeque::new()),
            log_retention: log_retention.max(1),
            snapshot_path,
        }
    }

    /// Create a store, seeding it from `path` if the snapshot exists.
    pub fn load_from_file(path: &Path, log_retention: usize) -> StoreResult<Self> {
        let store = Self::new(log_retention, Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let snapshot: Snapshot = serde_json::from_reader(reader)?;

            for service in snapshot.services {
                store.services.insert(service.host.clone(), service);
            }
            for user in snapshot.users {
                store.users.insert(user.id.clone(), user);
            }
            for policy in snapshot.policies {
                store
                    .policies
                    .insert((policy.user_id.clone(), policy.service_id.clone()), policy);
            }
            tracing::info!(
                path = %path.display(),
                services = store.services.len(),
                users = store.users.len(),
                policies = store.policies.len(),
                "Loaded store snapshot"
            );
        }
        Ok(store)
    }

    /// Write services, users and policies to the snapshot path, if one is set.
    pub fn save_to_file(&self) -> StoreResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let snapshot = Snapshot {
            services: self.services.iter().map(|r| r.value().clone()).collect(),
            users: self.users.iter().map(|r| r.value().clone()).collect(),
            policies: self.policies.iter().map(|r| r.value().clone()).collect(),
        };
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &snapshot)?;

        tracing::info!(
            path = %path.display(),
            services = snapshot.services.len(),
            users = snapshot.users.len(),
            policies = snapshot.policies.len(),
            "Saved store snapshot"
        );
        Ok(())
    }

    fn logs(&self) -> std::sync::MutexGuard<'_, VecDeque<AccessLogEntry>> {
        self.logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_services(&self) -> StoreResult<Vec<Service>> {
        let mut services: Vec<Service> = self.services.iter().map(|r| r.value().clone()).collect();
        services.sort_by(|a, b| a.host.cmp(&b.host));
        Ok(services)
    }

    async fn find_service(&self, id: &str) -> StoreResult<Option<Service>> {
        Ok(self
            .services
            .iter()
            .find(|r| r.value().id == id)
            .map(|r| r.value().clone()))
    }

    async fn find_service_by_host(&self, host: &str) -> StoreResult<Option<Service>> {
        Ok(self.services.get(host).map(|r| r.value().clone()))
    }

    async fn upsert_service(&self, host: &str, upstream: &str) -> StoreResult<Service> {
        // The entry guard holds the shard lock, so racing reconciliations
        // cannot create two rows for one host.
        let entry = self
            .services
            .entry(host.to_string())
            .and_modify(|service| {
                if service.upstream != upstream {
                    service.upstream = upstream.to_string();
                }
            })
            .or_insert_with(|| Service::discovered(host, upstream));
        Ok(entry.value().clone())
    }

    async fn retain_services(&self, hosts: &[String]) -> StoreResult<usize> {
        let keep: HashSet<&str> = hosts.iter().map(String::as_str).collect();
        let before = self.services.len();
        self.services.retain(|host, _| keep.contains(host.as_str()));
        Ok(before.saturating_sub(self.services.len()))
    }

    async fn update_service(&self, id: &str, patch: &ServicePatch) -> StoreResult<Option<Service>> {
        let Some(mut entry) = self.services.iter_mut().find(|r| r.value().id == id) else {
            return Ok(None);
        };
        let service = entry.value_mut();
        if let Some(name) = &patch.name {
            service.name = name.clone();
        }
        if let Some(allow) = patch.default_allow {
            service.default_allow = allow;
        }
        if let Some(window) = patch.default_rate_limit_window_sec {
            service.default_rate_limit_window_sec = window;
        }
        if let Some(max) = patch.default_rate_limit_max {
            service.default_rate_limit_max = max;
        }
        Ok(Some(service.clone()))
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.get(id).map(|r| r.value().clone()))
    }

    async fn insert_user_if_absent(&self, user: User) -> StoreResult<bool> {
        let mut inserted = false;
        self.users.entry(user.id.clone()).or_insert_with(|| {
            inserted = true;
            user
        });
        Ok(inserted)
    }

    async fn list_users(&self, query: &UserQuery) -> StoreResult<Page<User>> {
        let needle = query
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let mut users: Vec<User> = self
            .users
            .iter()
            .map(|r| r.value().clone())
            .filter(|u| match &needle {
                Some(n) => u.email.to_lowercase().contains(n) || u.name.to_lowercase().contains(n),
                None => true,
            })
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        let total = users.len();
        let items = users.into_iter().skip(query.offset).take(query.limit).collect();
        Ok(Page { items, total })
    }

    async fn set_user_role(&self, id: &str, role: Option<String>) -> StoreResult<Option<User>> {
        Ok(self.users.get_mut(id).map(|mut r| {
            r.value_mut().role = role;
            r.value().clone()
        }))
    }

    async fn find_policy(
        &self,
        user_id: &str,
        service_id: &str,
    ) -> StoreResult<Option<UserServicePolicy>> {
        Ok(self
            .policies
            .get(&(user_id.to_string(), service_id.to_string()))
            .map(|r| r.value().clone()))
    }

    async fn list_policies_for_user(&self, user_id: &str) -> StoreResult<Vec<UserServicePolicy>> {
        Ok(self
            .policies
            .iter()
            .filter(|r| r.key().0 == user_id)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn upsert_policy(
        &self,
        user_id: &str,
        service_id: &str,
        patch: &PolicyPatch,
    ) -> StoreResult<UserServicePolicy> {
        let mut entry = self
            .policies
            .entry((user_id.to_string(), service_id.to_string()))
            .or_insert_with(|| UserServicePolicy {
                user_id: user_id.to_string(),
                service_id: service_id.to_string(),
                allow: None,
                rate_limit_window_sec: None,
                rate_limit_max: None,
                updated_at: Utc::now(),
            });
        let policy = entry.value_mut();
        if let Some(allow) = patch.allow {
            policy.allow = allow;
        }
        if let Some(window) = patch.rate_limit_window_sec {
            policy.rate_limit_window_sec = window;
        }
        if let Some(max) = patch.rate_limit_max {
            policy.rate_limit_max = max;
        }
        policy.updated_at = Utc::now();
        Ok(policy.clone())
    }

    async fn insert_access_log(&self, entry: AccessLogEntry) -> StoreResult<()> {
        let mut logs = self.logs();
        while logs.len() >= self.log_retention {
            logs.pop_front();
        }
        logs.push_back(entry);
        Ok(())
    }

    async fn query_access_logs(&self, query: &LogQuery) -> StoreResult<Page<AccessLogEntry>> {
        let logs = self.logs();
        let matching: Vec<&AccessLogEntry> = logs.iter().rev().filter(|e| query.matches(e)).collect();
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();
        Ok(Page { items, total })
    }
}
