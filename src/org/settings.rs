//! Per-organization structural settings
//!
//! One [`organization_settings::Model`] row per organization decides which
//! structural concepts are enabled. Changes apply to future writes only;
//! records committed under an earlier configuration are left untouched.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{begin_serializable, now};
use crate::entity::organization_settings;
use crate::error::{AppError, AppResult, OptionExt};

/// The closed set of structural flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsFlags {
    pub use_divisions: bool,
    pub use_departments: bool,
    pub departments_under_divisions: bool,
    pub positions_are_org_wide: bool,
    pub allow_multiple_positions: bool,
    pub use_position_levels: bool,
}

impl Default for SettingsFlags {
    /// Defaults applied when an organization is provisioned
    fn default() -> Self {
        Self {
            use_divisions: false,
            use_departments: true,
            departments_under_divisions: false,
            positions_are_org_wide: true,
            allow_multiple_positions: false,
            use_position_levels: true,
        }
    }
}

impl SettingsFlags {
    /// `departments_under_divisions` only binds when both units are in use
    pub fn departments_require_division(&self) -> bool {
        self.use_divisions && self.use_departments && self.departments_under_divisions
    }

    /// Every one of the 64 flag combinations
    pub fn all_combinations() -> impl Iterator<Item = SettingsFlags> {
        (0u8..64).map(|bits| SettingsFlags {
            use_divisions: bits & 1 != 0,
            use_departments: bits & 2 != 0,
            departments_under_divisions: bits & 4 != 0,
            positions_are_org_wide: bits & 8 != 0,
            allow_multiple_positions: bits & 16 != 0,
            use_position_levels: bits & 32 != 0,
        })
    }

    /// Apply a patch, leaving absent flags as they are
    pub fn apply(mut self, patch: &SettingsPatch) -> Self {
        if let Some(v) = patch.use_divisions {
            self.use_divisions = v;
        }
        if let Some(v) = patch.use_departments {
            self.use_departments = v;
        }
        if let Some(v) = patch.departments_under_divisions {
            self.departments_under_divisions = v;
        }
        if let Some(v) = patch.positions_are_org_wide {
            self.positions_are_org_wide = v;
        }
        if let Some(v) = patch.allow_multiple_positions {
            self.allow_multiple_positions = v;
        }
        if let Some(v) = patch.use_position_levels {
            self.use_position_levels = v;
        }
        self
    }
}

/// Partial settings update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsPatch {
    #[serde(default)]
    pub use_divisions: Option<bool>,
    #[serde(default)]
    pub use_departments: Option<bool>,
    #[serde(default)]
    pub departments_under_divisions: Option<bool>,
    #[serde(default)]
    pub positions_are_org_wide: Option<bool>,
    #[serde(default)]
    pub allow_multiple_positions: Option<bool>,
    #[serde(default)]
    pub use_position_levels: Option<bool>,
    /// Optimistic concurrency token: the `updated_at` the caller last saw
    #[serde(default)]
    pub expected_updated_at: Option<DateTime<Utc>>,
}

impl SettingsPatch {
    /// Reject patches that contradict themselves
    pub fn check_conflicts(&self) -> AppResult<()> {
        if self.departments_under_divisions == Some(true)
            && (self.use_divisions == Some(false) || self.use_departments == Some(false))
        {
            return Err(AppError::ConfigConflict(
                "departments_under_divisions cannot be enabled while disabling divisions or departments"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Load the settings row inside any connection or transaction
pub(crate) async fn load<C: ConnectionTrait>(
    conn: &C,
    org_id: Uuid,
) -> AppResult<organization_settings::Model> {
    organization_settings::Entity::find()
        .filter(organization_settings::Column::OrganizationId.eq(org_id))
        .one(conn)
        .await?
        .ok_or_not_found(format!("Settings for organization {} not found", org_id))
}

/// Settings access for one organization at a time
pub struct SettingsStore<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> SettingsStore<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get(&self, org_id: Uuid) -> AppResult<organization_settings::Model> {
        load(self.db, org_id).await
    }

    /// Create the settings row with product defaults; returns the existing row if present
    pub async fn provision(&self, org_id: Uuid) -> AppResult<organization_settings::Model> {
        let txn = begin_serializable(self.db).await?;

        let existing = organization_settings::Entity::find()
            .filter(organization_settings::Column::OrganizationId.eq(org_id))
            .one(&txn)
            .await?;
        if let Some(settings) = existing {
            txn.commit().await?;
            return Ok(settings);
        }

        let flags = SettingsFlags::default();
        let ts = now();
        let settings = organization_settings::ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(org_id),
            use_divisions: Set(flags.use_divisions),
            use_departments: Set(flags.use_departments),
            departments_under_divisions: Set(flags.departments_under_divisions),
            positions_are_org_wide: Set(flags.positions_are_org_wide),
            allow_multiple_positions: Set(flags.allow_multiple_positions),
            use_position_levels: Set(flags.use_position_levels),
            created_at: Set(ts),
            updated_at: Set(ts),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        tracing::info!(organization_id = %org_id, "Organization settings provisioned");
        Ok(settings)
    }

    pub async fn update(
        &self,
        org_id: Uuid,
        patch: SettingsPatch,
    ) -> AppResult<organization_settings::Model> {
        patch.check_conflicts()?;

        let txn = begin_serializable(self.db).await?;
        let current = load(&txn, org_id).await?;

        if let Some(expected) = patch.expected_updated_at {
            if expected != current.updated_at {
                return Err(AppError::Conflict(
                    "Settings were modified by another request".to_string(),
                ));
            }
        }

        let flags = current.flags().apply(&patch);
        if flags == current.flags() {
            txn.commit().await?;
            return Ok(current);
        }

        let mut active = current.into_active_model();
        active.use_divisions = Set(flags.use_divisions);
        active.use_departments = Set(flags.use_departments);
        active.departments_under_divisions = Set(flags.departments_under_divisions);
        active.positions_are_org_wide = Set(flags.positions_are_org_wide);
        active.allow_multiple_positions = Set(flags.allow_multiple_positions);
        active.use_position_levels = Set(flags.use_position_levels);
        active.updated_at = Set(now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        tracing::info!(organization_id = %org_id, flags = ?flags, "Organization settings updated");
        Ok(updated)
    }
}
