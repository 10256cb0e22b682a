//! Employee assignments
//!
//! An assignment binds an employee to any of division, department, position
//! and level for a date range. Rows are closed by setting `end_date` and are
//! never deleted. Writes lock the employee's assignment rows for the rest of
//! the transaction.

use chrono::NaiveDate;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use super::payload::{AssignRequest, EndAssignment};
use super::settings::{self, SettingsFlags};
use super::{begin_serializable, now, today};
use crate::entity::{department, division, employee_assignment, position, position_level};
use crate::error::{AppError, AppResult, OptionExt};

/// Rows open at `as_of`
pub(crate) fn open_condition(as_of: NaiveDate) -> Condition {
    Condition::any()
        .add(employee_assignment::Column::EndDate.is_null())
        .add(employee_assignment::Column::EndDate.gt(as_of))
}

/// Close each assignment at `date`, or at its start date if that is later
pub(crate) async fn close_assignments<C: ConnectionTrait>(
    conn: &C,
    assignments: Vec<employee_assignment::Model>,
    date: NaiveDate,
) -> AppResult<usize> {
    let ts = now();
    let count = assignments.len();
    for model in assignments {
        let end = date.max(model.start_date);
        let mut active = model.into_active_model();
        active.end_date = Set(Some(end));
        active.updated_at = Set(ts);
        active.update(conn).await?;
    }
    Ok(count)
}

/// Assignments of one employee that a new or extended assignment would collide with.
///
/// A row collides when it is still open at `start` and begins before `end`.
/// In exclusive mode every such row collides; otherwise only primaries, and
/// only against a primary candidate.
fn collisions<'m>(
    flags: &SettingsFlags,
    is_primary: bool,
    start: NaiveDate,
    end: Option<NaiveDate>,
    existing: impl IntoIterator<Item = &'m employee_assignment::Model>,
) -> Vec<&'m employee_assignment::Model> {
    existing
        .into_iter()
        .filter(|a| a.is_open(start) && end.map_or(true, |e| a.start_date < e))
        .filter(|a| !flags.allow_multiple_positions || (is_primary && a.is_primary))
        .collect()
}

async fn lock_employee_rows<C: ConnectionTrait>(
    conn: &C,
    org_id: Uuid,
    employee_id: Uuid,
) -> AppResult<Vec<employee_assignment::Model>> {
    let rows = employee_assignment::Entity::find()
        .filter(employee_assignment::Column::OrganizationId.eq(org_id))
        .filter(employee_assignment::Column::EmployeeId.eq(employee_id))
        .order_by_asc(employee_assignment::Column::StartDate)
        .lock_exclusive()
        .all(conn)
        .await?;
    Ok(rows)
}

/// Validate the assignment's targets against the organization
async fn check_targets<C: ConnectionTrait>(
    conn: &C,
    org_id: Uuid,
    flags: &SettingsFlags,
    request: &AssignRequest,
) -> AppResult<()> {
    let missing = |field: &str, id: Uuid| {
        AppError::reference(
            field,
            format!("{} {} does not exist in this organization", field, id),
        )
    };

    if let Some(id) = request.division_id {
        division::Entity::find_by_id(id)
            .filter(division::Column::OrganizationId.eq(org_id))
            .one(conn)
            .await?
            .ok_or_else(|| missing("division_id", id))?;
    }

    if let Some(id) = request.department_id {
        let department = department::Entity::find_by_id(id)
            .filter(department::Column::OrganizationId.eq(org_id))
            .one(conn)
            .await?
            .ok_or_else(|| missing("department_id", id))?;
        if let Some(division_id) = request.division_id {
            if department.division_id != Some(division_id) {
                return Err(AppError::scope(
                    "department_id",
                    format!("department {} does not belong to division {}", id, division_id),
                ));
            }
        }
    }

    if let Some(id) = request.position_id {
        position::Entity::find_by_id(id)
            .filter(position::Column::OrganizationId.eq(org_id))
            .one(conn)
            .await?
            .ok_or_else(|| missing("position_id", id))?;
    }

    if let Some(id) = request.position_level_id {
        if !flags.use_position_levels {
            return Err(AppError::scope(
                "position_level_id",
                "position levels are disabled for this organization",
            ));
        }
        let level = position_level::Entity::find_by_id(id)
            .filter(position_level::Column::OrganizationId.eq(org_id))
            .one(conn)
            .await?
            .ok_or_else(|| missing("position_level_id", id))?;
        if Some(level.position_id) != request.position_id {
            return Err(AppError::reference(
                "position_level_id",
                format!("level {} does not belong to the assigned position", id),
            ));
        }
    }

    Ok(())
}

pub struct AssignmentEngine<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> AssignmentEngine<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create an assignment.
    ///
    /// In exclusive mode colliding assignments are closed only when `supersede`
    /// is set. Otherwise a primary assignment closes the employee's open
    /// primary at `start_date`.
    pub async fn assign(
        &self,
        org_id: Uuid,
        request: AssignRequest,
    ) -> AppResult<employee_assignment::Model> {
        request.validate()?;

        let txn = begin_serializable(self.db).await?;
        let flags = settings::load(&txn, org_id).await?.flags();
        check_targets(&txn, org_id, &flags, &request).await?;

        let existing = lock_employee_rows(&txn, org_id, request.employee_id).await?;
        let colliding = collisions(
            &flags,
            request.is_primary,
            request.start_date,
            request.end_date,
            &existing,
        );

        if !colliding.is_empty() {
            // With concurrent positions allowed, a new primary replaces the open one
            if !flags.allow_multiple_positions && !request.supersede {
                tracing::debug!(
                    organization_id = %org_id,
                    employee_id = %request.employee_id,
                    conflicts = colliding.len(),
                    "Assignment rejected"
                );
                return Err(AppError::ExclusivityViolation(format!(
                    "employee {} already has {} open assignment(s) on {}",
                    request.employee_id,
                    colliding.len(),
                    request.start_date
                )));
            }
            if let Some(later) = colliding.iter().find(|a| a.start_date > request.start_date) {
                return Err(AppError::ExclusivityViolation(format!(
                    "assignment {} starts on {}, after the new start date {}",
                    later.id, later.start_date, request.start_date
                )));
            }
            let superseded: Vec<_> = colliding.into_iter().cloned().collect();
            let closed = close_assignments(&txn, superseded, request.start_date).await?;
            tracing::info!(
                organization_id = %org_id,
                employee_id = %request.employee_id,
                closed,
                "Closed open assignments"
            );
        }

        let ts = now();
        let model = employee_assignment::ActiveModel {
            id: Set(Uuid::new_v4()),
            employee_id: Set(request.employee_id),
            organization_id: Set(org_id),
            division_id: Set(request.division_id),
            department_id: Set(request.department_id),
            position_id: Set(request.position_id),
            position_level_id: Set(request.position_level_id),
            is_primary: Set(request.is_primary),
            start_date: Set(request.start_date),
            end_date: Set(request.end_date),
            created_at: Set(ts),
            updated_at: Set(ts),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        tracing::info!(
            organization_id = %org_id,
            employee_id = %model.employee_id,
            assignment_id = %model.id,
            primary = model.is_primary,
            "Assignment created"
        );
        Ok(model)
    }

    /// Set or move the end date of an assignment
    pub async fn end(
        &self,
        org_id: Uuid,
        id: Uuid,
        request: EndAssignment,
    ) -> AppResult<employee_assignment::Model> {
        let txn = begin_serializable(self.db).await?;
        let current = employee_assignment::Entity::find_by_id(id)
            .filter(employee_assignment::Column::OrganizationId.eq(org_id))
            .one(&txn)
            .await?
            .ok_or_not_found(format!("Assignment {} not found", id))?;

        if request.end_date < current.start_date {
            return Err(AppError::validation(
                "end_date",
                "end_date cannot be before start_date",
            ));
        }

        if let Some(previous_end) = current.end_date {
            if request.end_date > previous_end {
                if !current.is_open(today()) {
                    return Err(AppError::validation(
                        "end_date",
                        "a closed assignment cannot be extended",
                    ));
                }
                // Pushing a future end date out must not overlap a later assignment
                let flags = settings::load(&txn, org_id).await?.flags();
                let existing = lock_employee_rows(&txn, org_id, current.employee_id).await?;
                let others = existing.iter().filter(|a| a.id != current.id);
                let colliding = collisions(
                    &flags,
                    current.is_primary,
                    previous_end,
                    Some(request.end_date),
                    others,
                );
                if !colliding.is_empty() {
                    return Err(AppError::ExclusivityViolation(format!(
                        "extending assignment {} to {} overlaps {} other assignment(s)",
                        id,
                        request.end_date,
                        colliding.len()
                    )));
                }
            }
        } else {
            lock_employee_rows(&txn, org_id, current.employee_id).await?;
        }

        let mut active = current.into_active_model();
        active.end_date = Set(Some(request.end_date));
        active.updated_at = Set(now());
        let model = active.update(&txn).await?;

        txn.commit().await?;
        tracing::info!(
            organization_id = %org_id,
            assignment_id = %id,
            end_date = %request.end_date,
            "Assignment ended"
        );
        Ok(model)
    }

    /// Assignment history of an employee, oldest first; only rows open at `open_at` if given
    pub async fn list_for_employee(
        &self,
        org_id: Uuid,
        employee_id: Uuid,
        open_at: Option<NaiveDate>,
    ) -> AppResult<Vec<employee_assignment::Model>> {
        let mut query = employee_assignment::Entity::find()
            .filter(employee_assignment::Column::OrganizationId.eq(org_id))
            .filter(employee_assignment::Column::EmployeeId.eq(employee_id));
        if let Some(as_of) = open_at {
            query = query.filter(open_condition(as_of));
        }
        let rows = query
            .order_by_asc(employee_assignment::Column::StartDate)
            .order_by_asc(employee_assignment::Column::CreatedAt)
            .all(self.db)
            .await?;
        Ok(rows)
    }

    /// The primary assignment in effect on `as_of`
    pub async fn primary_assignment(
        &self,
        org_id: Uuid,
        employee_id: Uuid,
        as_of: NaiveDate,
    ) -> AppResult<Option<employee_assignment::Model>> {
        let row = employee_assignment::Entity::find()
            .filter(employee_assignment::Column::OrganizationId.eq(org_id))
            .filter(employee_assignment::Column::EmployeeId.eq(employee_id))
            .filter(employee_assignment::Column::IsPrimary.eq(true))
            .filter(employee_assignment::Column::StartDate.lte(as_of))
            .filter(open_condition(as_of))
            .order_by_desc(employee_assignment::Column::StartDate)
            .one(self.db)
            .await?;
        Ok(row)
    }
}
