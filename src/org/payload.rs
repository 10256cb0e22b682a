//! Inbound payload shapes
//!
//! Every write request is deserialized into one of these types (unknown
//! fields rejected) and checked with `validate()` before any topology rule
//! runs. Patch types use `Option<Option<T>>` for nullable columns so that an
//! absent field leaves the column alone while an explicit `null` clears it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 2000;

/// Distinguish an explicit `null` from an absent field
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn default_true() -> bool {
    true
}

fn validate_name(field: &str, name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::validation(field, format!("{} cannot be empty", field)));
    }
    if name.trim().chars().count() > MAX_NAME_LEN {
        return Err(AppError::validation(
            field,
            format!("{} cannot exceed {} characters", field, MAX_NAME_LEN),
        ));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> AppResult<()> {
    match description {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LEN => Err(AppError::validation(
            "description",
            format!("description cannot exceed {} characters", MAX_DESCRIPTION_LEN),
        )),
        _ => Ok(()),
    }
}

fn validate_level_order(order: i32) -> AppResult<()> {
    if order < 1 {
        return Err(AppError::validation("level_order", "level_order must be at least 1"));
    }
    Ok(())
}

/// Trimmed name as stored
pub(crate) fn clean_name(name: &str) -> String {
    name.trim().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewDivision {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub manager_id: Option<Uuid>,
    #[serde(default)]
    pub parent_division_id: Option<Uuid>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewDivision {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            manager_id: None,
            parent_division_id: None,
            is_active: true,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        validate_name("name", &self.name)?;
        validate_description(self.description.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DivisionPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub manager_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_division_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub expected_updated_at: Option<DateTime<Utc>>,
}

impl DivisionPatch {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = &self.name {
            validate_name("name", name)?;
        }
        validate_description(self.description.as_ref().and_then(|d| d.as_deref()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewDepartment {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub manager_id: Option<Uuid>,
    #[serde(default)]
    pub division_id: Option<Uuid>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewDepartment {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            manager_id: None,
            division_id: None,
            is_active: true,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        validate_name("name", &self.name)?;
        validate_description(self.description.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepartmentPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub manager_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub division_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub expected_updated_at: Option<DateTime<Utc>>,
}

impl DepartmentPatch {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = &self.name {
            validate_name("name", name)?;
        }
        validate_description(self.description.as_ref().and_then(|d| d.as_deref()))
    }
}

/// A level declared by value, either inline with a new position or on its own
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelSpec {
    pub level_name: String,
    pub level_order: i32,
    #[serde(default)]
    pub description: Option<String>,
}

impl LevelSpec {
    pub fn new(level_name: impl Into<String>, level_order: i32) -> Self {
        Self {
            level_name: level_name.into(),
            level_order,
            description: None,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        validate_name("level_name", &self.level_name)?;
        validate_level_order(self.level_order)?;
        validate_description(self.description.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewPosition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub division_id: Option<Uuid>,
    #[serde(default)]
    pub department_id: Option<Uuid>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Levels created together with the position
    #[serde(default)]
    pub levels: Vec<LevelSpec>,
}

impl NewPosition {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            division_id: None,
            department_id: None,
            is_active: true,
            levels: Vec::new(),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        validate_name("name", &self.name)?;
        validate_description(self.description.as_deref())?;
        for level in &self.levels {
            level.validate()?;
        }
        let mut orders: Vec<i32> = self.levels.iter().map(|l| l.level_order).collect();
        orders.sort_unstable();
        if orders.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(AppError::validation(
                "levels",
                "level_order must be unique within a position",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PositionPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub division_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub department_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub expected_updated_at: Option<DateTime<Utc>>,
}

impl PositionPatch {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = &self.name {
            validate_name("name", name)?;
        }
        validate_description(self.description.as_ref().and_then(|d| d.as_deref()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelPatch {
    #[serde(default)]
    pub level_name: Option<String>,
    #[serde(default)]
    pub level_order: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub expected_updated_at: Option<DateTime<Utc>>,
}

impl LevelPatch {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = &self.level_name {
            validate_name("level_name", name)?;
        }
        if let Some(order) = self.level_order {
            validate_level_order(order)?;
        }
        validate_description(self.description.as_ref().and_then(|d| d.as_deref()))
    }
}

/// Delete behaviour when dependents exist
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeleteOptions {
    #[serde(default)]
    pub cascade: bool,
}

impl DeleteOptions {
    pub fn cascade() -> Self {
        Self { cascade: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignRequest {
    pub employee_id: Uuid,
    #[serde(default)]
    pub division_id: Option<Uuid>,
    #[serde(default)]
    pub department_id: Option<Uuid>,
    #[serde(default)]
    pub position_id: Option<Uuid>,
    #[serde(default)]
    pub position_level_id: Option<Uuid>,
    #[serde(default)]
    pub is_primary: bool,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Close conflicting open assignments in the same transaction
    #[serde(default)]
    pub supersede: bool,
}

impl AssignRequest {
    /// Primary assignment of `employee_id` to a position
    pub fn to_position(employee_id: Uuid, position_id: Uuid, start_date: NaiveDate) -> Self {
        Self {
            employee_id,
            division_id: None,
            department_id: None,
            position_id: Some(position_id),
            position_level_id: None,
            is_primary: true,
            start_date,
            end_date: None,
            supersede: false,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.division_id.is_none()
            && self.department_id.is_none()
            && self.position_id.is_none()
            && self.position_level_id.is_none()
        {
            return Err(AppError::validation(
                "position_id",
                "an assignment must reference at least one division, department or position",
            ));
        }
        if self.position_level_id.is_some() && self.position_id.is_none() {
            return Err(AppError::validation(
                "position_id",
                "a position level requires its position",
            ));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(AppError::validation(
                    "end_date",
                    "end_date cannot be before start_date",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndAssignment {
    pub end_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_name_rejected() {
        let err = NewDivision::named("   ").validate().unwrap_err();
        assert_eq!(err.field(), Some("name"));
    }

    #[test]
    fn test_long_name_rejected() {
        let name = "x".repeat(MAX_NAME_LEN + 1);
        assert!(NewDepartment::named(name).validate().is_err());
    }

    #[test]
    fn test_patch_distinguishes_null_from_absent() {
        let patch: DivisionPatch = serde_json::from_str(r#"{"parent_division_id": null}"#).unwrap();
        assert_eq!(patch.parent_division_id, Some(None));

        let patch: DivisionPatch = serde_json::from_str(r#"{"name": "Ops"}"#).unwrap();
        assert_eq!(patch.parent_division_id, None);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let parsed: Result<NewDepartment, _> =
            serde_json::from_str(r#"{"name": "Sales", "organization_id": "x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_inline_levels_must_be_unique() {
        let mut position = NewPosition::named("Engineer");
        position.levels = vec![LevelSpec::new("Junior", 1), LevelSpec::new("Senior", 1)];
        let err = position.validate().unwrap_err();
        assert_eq!(err.field(), Some("levels"));
    }

    #[test]
    fn test_level_order_must_be_positive() {
        let err = LevelSpec::new("Intern", 0).validate().unwrap_err();
        assert_eq!(err.field(), Some("level_order"));
    }

    #[test]
    fn test_assignment_needs_a_target() {
        let mut req = AssignRequest::to_position(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        req.position_id = None;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_assignment_end_before_start() {
        let mut req = AssignRequest::to_position(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        );
        req.end_date = NaiveDate::from_ymd_opt(2024, 4, 30);
        let err = req.validate().unwrap_err();
        assert_eq!(err.field(), Some("end_date"));
    }
}
