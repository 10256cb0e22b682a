//! EmployeeAssignment entity
//!
//! 表名: employee_assignments. Rows are closed via `end_date`, never deleted.

use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "employee_assignments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Employee (external entity)
    pub employee_id: Uuid,

    pub organization_id: Uuid,

    pub division_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub position_id: Option<Uuid>,
    pub position_level_id: Option<Uuid>,

    pub is_primary: bool,

    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Open at `as_of`: no end date, or an end date still ahead
    pub fn is_open(&self, as_of: NaiveDate) -> bool {
        self.end_date.map_or(true, |end| end > as_of)
    }
}
