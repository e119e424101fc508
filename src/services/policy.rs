//! Policy store — admin configuration (cached singleton) and per-user
//! configuration overrides.

use std::time::{Duration, Instant};

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::PgPool;
use crate::error::{Error, Result};
use crate::models::configuration::{
    AdminConfiguration, AdminConfigurationRow, ContainerLimits, NewAdminConfigurationRow,
    NewUserConfigurationRow, UserConfiguration, UserConfigurationRow,
};
use crate::schema::{admin_configurations, user_configurations};

const ADMIN_CONFIG_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct CachedAdminConfig {
    config: AdminConfiguration,
    fetched_at: Instant,
}

impl CachedAdminConfig {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

pub struct PolicyStore {
    pool: PgPool,
    cache: RwLock<Option<CachedAdminConfig>>,
    ttl: Duration,
}

impl PolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: RwLock::new(None),
            ttl: ADMIN_CONFIG_CACHE_TTL,
        }
    }

    /// Return the admin configuration, from cache when fresh. When no row
    /// exists yet, persist the default document and return it.
    pub async fn get_admin_configuration(&self, use_cache: bool) -> Result<AdminConfiguration> {
        if use_cache {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_fresh(self.ttl) {
                    return Ok(cached.config.clone());
                }
            }
        }

        let mut conn = self.pool.get().await?;
        let row: Option<AdminConfigurationRow> = admin_configurations::table
            .order(admin_configurations::created_at.desc())
            .first(&mut conn)
            .await
            .optional()?;

        let config = match row {
            Some(row) => {
                let mut config: AdminConfiguration = serde_yaml::from_str(&row.config_yaml)
                    .map_err(|e| {
                        Error::Internal(anyhow::anyhow!("admin configuration YAML: {e}"))
                    })?;
                config.id = Some(row.id);
                config
            }
            None => {
                tracing::info!("No admin configuration found, seeding the default");
                self.insert_default(&mut conn).await?
            }
        };

        let mut cache = self.cache.write().await;
        *cache = Some(CachedAdminConfig {
            config: config.clone(),
            fetched_at: Instant::now(),
        });

        Ok(config)
    }

    async fn insert_default(&self, conn: &mut AsyncPgConnection) -> Result<AdminConfiguration> {
        let mut config = AdminConfiguration::default();
        let id = Uuid::new_v4();
        config.id = Some(id);

        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| Error::Internal(anyhow::anyhow!("serialize default config: {e}")))?;
        let now = Utc::now();
        let row = NewAdminConfigurationRow {
            id,
            name: "default".to_string(),
            config_yaml: yaml,
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(admin_configurations::table)
            .values(&row)
            .execute(conn)
            .await?;

        Ok(config)
    }

    /// Persist an admin configuration and invalidate the cache.
    pub async fn save_admin_configuration(
        &self,
        mut config: AdminConfiguration,
    ) -> Result<AdminConfiguration> {
        let id = config.id.unwrap_or_else(Uuid::new_v4);
        config.id = Some(id);

        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| Error::invalid(format!("configuration not serializable: {e}")))?;
        let now = Utc::now();

        let mut conn = self.pool.get().await?;
        diesel::insert_into(admin_configurations::table)
            .values(&NewAdminConfigurationRow {
                id,
                name: "default".to_string(),
                config_yaml: yaml.clone(),
                created_at: now,
                updated_at: now,
            })
            .on_conflict(admin_configurations::id)
            .do_update()
            .set((
                admin_configurations::config_yaml.eq(&yaml),
                admin_configurations::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await?;

        let mut cache = self.cache.write().await;
        *cache = None;

        tracing::info!("Admin configuration saved");
        Ok(config)
    }

    // ── User configurations ──

    /// Parse, validate against admin caps, and persist a user configuration.
    /// Identity columns are server-assigned; the YAML body cannot forge them.
    pub async fn create_user_configuration_from_yaml(
        &self,
        lob_id: &str,
        team_id: &str,
        user_id: &str,
        yaml: &str,
    ) -> Result<UserConfigurationRow> {
        let config = parse_user_configuration(yaml)?;
        let admin = self.get_admin_configuration(true).await?;
        validate_user_configuration(&config, &admin)?;

        let now = Utc::now();
        let row = NewUserConfigurationRow {
            id: Uuid::new_v4(),
            name: config.name.clone(),
            lob_id: lob_id.to_string(),
            team_id: team_id.to_string(),
            user_id: user_id.to_string(),
            config_yaml: yaml.to_string(),
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.pool.get().await?;
        let saved: UserConfigurationRow = diesel::insert_into(user_configurations::table)
            .values(&row)
            .get_result(&mut conn)
            .await?;

        tracing::info!(config_id = %saved.id, lob = lob_id, "User configuration created");
        Ok(saved)
    }

    pub async fn update_user_configuration(
        &self,
        id: Uuid,
        lob_id: &str,
        team_id: &str,
        yaml: &str,
    ) -> Result<UserConfigurationRow> {
        let config = parse_user_configuration(yaml)?;
        let admin = self.get_admin_configuration(true).await?;
        validate_user_configuration(&config, &admin)?;

        let mut conn = self.pool.get().await?;
        let existing = self.load_owned(&mut conn, id, lob_id, team_id).await?;

        let updated: UserConfigurationRow = diesel::update(
            user_configurations::table.find(existing.id),
        )
        .set((
            user_configurations::name.eq(&config.name),
            user_configurations::config_yaml.eq(yaml),
            user_configurations::updated_at.eq(Utc::now()),
        ))
        .get_result(&mut conn)
        .await?;

        Ok(updated)
    }

    pub async fn get_user_configuration(
        &self,
        id: Uuid,
        lob_id: &str,
        team_id: &str,
    ) -> Result<UserConfigurationRow> {
        let mut conn = self.pool.get().await?;
        self.load_owned(&mut conn, id, lob_id, team_id).await
    }

    pub async fn list_user_configurations(
        &self,
        lob_id: &str,
        team_id: &str,
        user_id: &str,
    ) -> Result<Vec<UserConfigurationRow>> {
        let mut conn = self.pool.get().await?;
        let rows = user_configurations::table
            .filter(user_configurations::lob_id.eq(lob_id))
            .filter(user_configurations::team_id.eq(team_id))
            .filter(user_configurations::user_id.eq(user_id))
            .order(user_configurations::created_at.desc())
            .load(&mut conn)
            .await?;
        Ok(rows)
    }

    pub async fn delete_user_configuration(
        &self,
        id: Uuid,
        lob_id: &str,
        team_id: &str,
    ) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let existing = self.load_owned(&mut conn, id, lob_id, team_id).await?;
        diesel::delete(user_configurations::table.find(existing.id))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn load_owned(
        &self,
        conn: &mut AsyncPgConnection,
        id: Uuid,
        lob_id: &str,
        team_id: &str,
    ) -> Result<UserConfigurationRow> {
        let row: Option<UserConfigurationRow> = user_configurations::table
            .find(id)
            .first(conn)
            .await
            .optional()?;

        match row {
            None => Err(Error::ConfigNotFound(id)),
            Some(row) if row.lob_id != lob_id || row.team_id != team_id => Err(Error::Forbidden),
            Some(row) => Ok(row),
        }
    }
}

/// Parse a user configuration document, rejecting malformed YAML.
pub fn parse_user_configuration(yaml: &str) -> Result<UserConfiguration> {
    let config: UserConfiguration =
        serde_yaml::from_str(yaml).map_err(|e| Error::invalid(format!("invalid YAML: {e}")))?;
    if config.name.trim().is_empty() {
        return Err(Error::invalid("name must not be empty"));
    }
    Ok(config)
}

/// Enforce that user overrides never exceed the admin caps.
pub fn validate_user_configuration(
    config: &UserConfiguration,
    admin: &AdminConfiguration,
) -> Result<()> {
    let Some(resources) = &config.resources else {
        return Ok(());
    };
    let caps = &admin.resource_management.default_container_limits;
    validate_limits(resources, caps)
}

fn validate_limits(resources: &ContainerLimits, caps: &ContainerLimits) -> Result<()> {
    let user_cpu = parse_cpu_quantity(&resources.cpu_limit)?;
    let admin_cpu = parse_cpu_quantity(&caps.cpu_limit)?;
    if user_cpu > admin_cpu {
        return Err(Error::invalid(format!(
            "CPU limit ({}) exceeds maximum allowed ({})",
            resources.cpu_limit, caps.cpu_limit
        )));
    }

    let user_mem = parse_memory_quantity(&resources.memory_limit)?;
    let admin_mem = parse_memory_quantity(&caps.memory_limit)?;
    if user_mem > admin_mem {
        return Err(Error::invalid(format!(
            "Memory limit ({}) exceeds maximum allowed ({})",
            resources.memory_limit, caps.memory_limit
        )));
    }

    Ok(())
}

/// Parse a CPU quantity: integer cores or millicores with an `m` suffix.
pub fn parse_cpu_quantity(s: &str) -> Result<f64> {
    let s = s.trim();
    if let Some(millis) = s.strip_suffix('m') {
        let m: u64 = millis
            .parse()
            .map_err(|_| Error::invalid(format!("invalid CPU quantity: {s:?}")))?;
        return Ok(m as f64 / 1000.0);
    }
    let cores: u64 = s
        .parse()
        .map_err(|_| Error::invalid(format!("invalid CPU quantity: {s:?}")))?;
    Ok(cores as f64)
}

/// Parse a memory quantity: `Ki`/`Mi`/`Gi` (powers of 1024) or raw bytes.
pub fn parse_memory_quantity(s: &str) -> Result<u64> {
    let s = s.trim();
    let (digits, multiplier) = if let Some(d) = s.strip_suffix("Ki") {
        (d, 1024u64)
    } else if let Some(d) = s.strip_suffix("Mi") {
        (d, 1024 * 1024)
    } else if let Some(d) = s.strip_suffix("Gi") {
        (d, 1024 * 1024 * 1024)
    } else {
        (s, 1)
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| Error::invalid(format!("invalid memory quantity: {s:?}")))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::invalid(format!("memory quantity overflows: {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_parser_boundary_values() {
        assert_eq!(parse_cpu_quantity("500m").unwrap(), 0.5);
        assert_eq!(parse_cpu_quantity("1").unwrap(), 1.0);
        assert_eq!(parse_cpu_quantity("2000m").unwrap(), 2.0);
        assert!(parse_cpu_quantity("half").is_err());
        assert!(parse_cpu_quantity("1.5").is_err());
        assert!(parse_cpu_quantity("m").is_err());
    }

    #[test]
    fn memory_parser_boundary_values() {
        assert_eq!(parse_memory_quantity("1Gi").unwrap(), 1_073_741_824);
        assert_eq!(parse_memory_quantity("1Mi").unwrap(), 1_048_576);
        assert_eq!(parse_memory_quantity("512Ki").unwrap(), 524_288);
        assert_eq!(parse_memory_quantity("1024").unwrap(), 1024);
        assert!(parse_memory_quantity("1G").is_err());
        assert!(parse_memory_quantity("lots").is_err());
    }

    #[test]
    fn user_limits_above_admin_caps_are_rejected() {
        let admin = AdminConfiguration::default();
        let mut config = UserConfiguration {
            name: "mine".to_string(),
            ..Default::default()
        };
        config.resources = Some(ContainerLimits {
            cpu_limit: "4".to_string(),
            memory_limit: "1Gi".to_string(),
            cpu_request: "500m".to_string(),
            memory_request: "512Mi".to_string(),
        });

        let err = validate_user_configuration(&config, &admin).unwrap_err();
        assert_eq!(
            err.to_string(),
            "CPU limit (4) exceeds maximum allowed (1)"
        );
    }

    #[test]
    fn user_memory_above_cap_is_rejected() {
        let admin = AdminConfiguration::default();
        let config = UserConfiguration {
            name: "mine".to_string(),
            resources: Some(ContainerLimits {
                cpu_limit: "1".to_string(),
                memory_limit: "4Gi".to_string(),
                cpu_request: "500m".to_string(),
                memory_request: "512Mi".to_string(),
            }),
            ..Default::default()
        };

        let err = validate_user_configuration(&config, &admin).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Memory limit (4Gi) exceeds maximum allowed (2Gi)"
        );
    }

    #[test]
    fn config_without_resources_passes_validation() {
        let admin = AdminConfiguration::default();
        let config = UserConfiguration {
            name: "mine".to_string(),
            ..Default::default()
        };
        assert!(validate_user_configuration(&config, &admin).is_ok());
    }

    #[test]
    fn malformed_yaml_is_an_invalid_request() {
        let err = parse_user_configuration(": not yaml :").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
