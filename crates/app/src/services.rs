use std::{sync::Arc, time::Duration, time::Instant};

use chrono::{DateTime, NaiveDate, Utc};
use metrics::{counter, histogram};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use hr_insights_core::aggregate::{MonthlyRoleStats, MonthlySalaryStats, RoleGrowth, SalaryIncrease};
use hr_insights_core::stats::{
    self, CompanyOverview, DepartmentStats, GroupCount, RecentHires, RoleChangeRecord,
    StaleEmployee, SystemOverview, UserSummary, DASHBOARD_RECENT_USERS_LIMIT,
};
use hr_insights_core::query::stale_cutoff;
use hr_insights_core::{
    AccessError, Dataset, RoleHistoryQuery, SalaryHistoryQuery, ValidationError,
};
use hr_insights_storage::{Database, StorageError};
use hr_insights_util::CacheTtls;

use crate::cache::{CacheKey, Clock, StatsCache};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("failed to load records: {0}")]
    Storage(#[from] StorageError),
}

/// Cached façade over the stats computations.
///
/// Each method checks the cache, and on a miss loads a fresh snapshot,
/// computes the result and stores it under the method's TTL band. Cache
/// failures never fail a request.
#[derive(Clone)]
pub struct StatsServices {
    storage: Database,
    cache: Arc<dyn StatsCache>,
    ttls: CacheTtls,
    recent_activity_days: u32,
    clock: Clock,
}

impl StatsServices {
    pub fn new(
        storage: Database,
        cache: Arc<dyn StatsCache>,
        ttls: CacheTtls,
        recent_activity_days: u32,
        clock: Clock,
    ) -> Self {
        Self {
            storage,
            cache,
            ttls,
            recent_activity_days,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    pub fn recent_activity_days(&self) -> u32 {
        self.recent_activity_days
    }

    /// Loads an uncached snapshot for identity-dependent views.
    pub async fn snapshot(&self) -> Result<Dataset, ServiceError> {
        Ok(self.storage.snapshots().load().await?)
    }

    pub async fn department_overview(&self) -> Result<Vec<DepartmentStats>, ServiceError> {
        let as_of = self.today();
        let key = CacheKey::new("department_stats_overview").param("as_of", as_of);
        self.cached("department_overview", key, self.ttls.department, |dataset| {
            Ok(stats::department_overview(dataset, as_of))
        })
        .await
    }

    pub async fn company_overview(&self) -> Result<CompanyOverview, ServiceError> {
        let as_of = self.today();
        let days = self.recent_activity_days;
        let key = CacheKey::new("company_stats_overview")
            .param("as_of", as_of)
            .param("days", days);
        self.cached("company_overview", key, self.ttls.general, |dataset| {
            Ok(stats::company_overview(dataset, as_of, days)?)
        })
        .await
    }

    pub async fn recent_hires(&self, days: u32) -> Result<RecentHires, ServiceError> {
        if days == 0 {
            return Err(ValidationError::InvalidActivityDays(0).into());
        }
        let as_of = self.today();
        let key = CacheKey::new("recent_hires")
            .param("as_of", as_of)
            .param("days", days);
        self.cached("recent_hires", key, self.ttls.general, |dataset| {
            Ok(stats::recent_hires(dataset, as_of, days)?)
        })
        .await
    }

    pub async fn system_overview(&self) -> Result<SystemOverview, ServiceError> {
        let as_of = self.today();
        let key = CacheKey::new("system_overview").param("as_of", as_of);
        self.cached("system_overview", key, self.ttls.user_management, |dataset| {
            Ok(stats::system_overview(dataset, as_of))
        })
        .await
    }

    pub async fn users_without_profile(&self) -> Result<Vec<UserSummary>, ServiceError> {
        let key = CacheKey::new("users_without_profile");
        self.cached(
            "users_without_profile",
            key,
            self.ttls.user_management,
            |dataset| Ok(stats::users_without_profile(dataset)),
        )
        .await
    }

    pub async fn group_distribution(&self) -> Result<Vec<GroupCount>, ServiceError> {
        let key = CacheKey::new("group_distribution");
        self.cached("group_distribution", key, self.ttls.user_management, |dataset| {
            Ok(stats::group_distribution(dataset))
        })
        .await
    }

    pub async fn recent_users(&self, limit: usize) -> Result<Vec<UserSummary>, ServiceError> {
        if limit == 0 {
            return Err(ValidationError::InvalidLimit(0).into());
        }
        let now = self.now();
        let days = self.recent_activity_days;
        let key = CacheKey::new("recent_users")
            .param("as_of", now.date_naive())
            .param("days", days)
            .param("limit", limit);
        self.cached("recent_users", key, self.ttls.user_management, |dataset| {
            Ok(stats::recent_users(dataset, now, days, limit)?)
        })
        .await
    }

    pub async fn dashboard_recent_users(&self) -> Result<Vec<UserSummary>, ServiceError> {
        self.recent_users(DASHBOARD_RECENT_USERS_LIMIT).await
    }

    pub async fn top_increases(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<SalaryIncrease>, ServiceError> {
        let query = SalaryHistoryQuery::new().by_date_range(start, end);
        query.span()?;
        if limit == 0 {
            return Err(ValidationError::InvalidLimit(0).into());
        }
        let key = CacheKey::new("salary_top_increases")
            .opt_param("start", start)
            .opt_param("end", end)
            .param("n", limit);
        self.cached("top_increases", key, self.ttls.general, |dataset| {
            Ok(query.top_increases(dataset, limit)?)
        })
        .await
    }

    pub async fn salary_monthly_stats(
        &self,
        year: i32,
    ) -> Result<Vec<MonthlySalaryStats>, ServiceError> {
        SalaryHistoryQuery::new().by_year(year).span()?;
        let key = CacheKey::new("salary_monthly_stats").param("year", year);
        self.cached("salary_monthly_stats", key, self.ttls.general, |dataset| {
            Ok(SalaryHistoryQuery::new().monthly_stats(dataset, year)?)
        })
        .await
    }

    pub async fn growth_by_role(&self) -> Result<Vec<RoleGrowth>, ServiceError> {
        let key = CacheKey::new("salary_growth_by_role");
        self.cached("growth_by_role", key, self.ttls.general, |dataset| {
            Ok(SalaryHistoryQuery::new().avg_growth_by_role(dataset)?)
        })
        .await
    }

    pub async fn role_monthly_stats(&self, year: i32) -> Result<Vec<MonthlyRoleStats>, ServiceError> {
        RoleHistoryQuery::new().by_year(year).span()?;
        let key = CacheKey::new("role_monthly_stats").param("year", year);
        self.cached("role_monthly_stats", key, self.ttls.general, |dataset| {
            Ok(RoleHistoryQuery::new().monthly_stats(dataset, year)?)
        })
        .await
    }

    pub async fn promotions(&self, year: Option<i32>) -> Result<Vec<RoleChangeRecord>, ServiceError> {
        let query = match year {
            Some(year) => RoleHistoryQuery::new().promotions_only().by_year(year),
            None => RoleHistoryQuery::new().promotions_only(),
        };
        query.span()?;
        let key = CacheKey::new("promotions").opt_param("year", year);
        self.cached("promotions", key, self.ttls.general, |dataset| {
            let rows = query.materialize(dataset)?;
            Ok(stats::role_change_records(dataset, &rows))
        })
        .await
    }

    pub async fn stale_employees(&self, months: u32) -> Result<Vec<StaleEmployee>, ServiceError> {
        let as_of = self.today();
        stale_cutoff(months, as_of)?;
        let key = CacheKey::new("stale_employees")
            .param("as_of", as_of)
            .param("months", months);
        self.cached("stale_employees", key, self.ttls.general, |dataset| {
            Ok(stats::stale_employees(dataset, months, as_of)?)
        })
        .await
    }

    async fn cached<T, F>(
        &self,
        service: &'static str,
        key: CacheKey,
        ttl: Duration,
        compute: F,
    ) -> Result<T, ServiceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&Dataset) -> Result<T, ServiceError>,
    {
        match self.cache.get(&key) {
            Ok(Some(value)) => match serde_json::from_value::<T>(value) {
                Ok(hit) => {
                    counter!("stats_cache_hits_total", "service" => service).increment(1);
                    debug!(stage = "cache", service, key = %key, "cache hit");
                    return Ok(hit);
                }
                Err(err) => {
                    warn!(stage = "cache", service, key = %key, error = %err, "discarding undecodable cache entry");
                }
            },
            Ok(None) => {}
            Err(err) => {
                counter!("stats_cache_errors_total", "service" => service, "op" => "get")
                    .increment(1);
                warn!(stage = "cache", service, key = %key, error = %err, "cache read failed; computing live");
            }
        }
        counter!("stats_cache_misses_total", "service" => service).increment(1);

        let started = Instant::now();
        let dataset = self.storage.snapshots().load().await?;
        let value = compute(&dataset)?;
        histogram!("stats_compute_seconds", "service" => service)
            .record(started.elapsed().as_secs_f64());
        debug!(stage = "stats", service, key = %key, elapsed_ms = started.elapsed().as_millis() as u64, "computed stats");

        match serde_json::to_value(&value) {
            Ok(encoded) => {
                if let Err(err) = self.cache.set(&key, encoded, ttl) {
                    counter!("stats_cache_errors_total", "service" => service, "op" => "set")
                        .increment(1);
                    warn!(stage = "cache", service, key = %key, error = %err, "cache write failed");
                }
            }
            Err(err) => {
                warn!(stage = "cache", service, key = %key, error = %err, "stats result not cacheable");
            }
        }
        Ok(value)
    }
}
