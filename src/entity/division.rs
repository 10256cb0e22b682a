//! Division entity
//!
//! 表名: divisions. Self-referential tree via `parent_division_id`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "divisions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub organization_id: Uuid,

    #[sea_orm(column_type = "String(Some(255))")]
    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Managing employee (external entity)
    pub manager_id: Option<Uuid>,

    /// Parent division (None for a root)
    pub parent_division_id: Option<Uuid>,

    pub is_active: bool,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// 自引用关系通过手动查询处理

impl ActiveModelBehavior for ActiveModel {}

/// Division tree node (used for API responses)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DivisionTree {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub manager_id: Option<Uuid>,
    pub parent_division_id: Option<Uuid>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<DivisionTree>,
}

impl From<Model> for DivisionTree {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            manager_id: model.manager_id,
            parent_division_id: model.parent_division_id,
            is_active: model.is_active,
            children: Vec::new(),
        }
    }
}
