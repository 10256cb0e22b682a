//! OrganizationSettings entity
//!
//! 表名: organization_settings (one row per organization)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::org::settings::SettingsFlags;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "organization_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub organization_id: Uuid,

    pub use_divisions: bool,
    pub use_departments: bool,
    /// Only enforced while both `use_divisions` and `use_departments` are on
    pub departments_under_divisions: bool,
    pub positions_are_org_wide: bool,
    pub allow_multiple_positions: bool,
    pub use_position_levels: bool,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Snapshot of the structural flags
    pub fn flags(&self) -> SettingsFlags {
        SettingsFlags {
            use_divisions: self.use_divisions,
            use_departments: self.use_departments,
            departments_under_divisions: self.departments_under_divisions,
            positions_are_org_wide: self.positions_are_org_wide,
            allow_multiple_positions: self.allow_multiple_positions,
            use_position_levels: self.use_position_levels,
        }
    }
}
