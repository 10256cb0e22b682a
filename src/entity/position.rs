//! Position entity
//!
//! 表名: positions

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::position_level;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "positions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub organization_id: Uuid,

    pub division_id: Option<Uuid>,

    pub department_id: Option<Uuid>,

    #[sea_orm(column_type = "String(Some(255))")]
    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub is_active: bool,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Position with its ordered levels (used for API responses)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionWithLevels {
    #[serde(flatten)]
    pub position: Model,
    pub levels: Vec<position_level::Model>,
}
