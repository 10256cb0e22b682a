//! Divisions, departments, positions and position levels
//!
//! Writes load the settings and the minimal part of the tree they touch,
//! run [`topology::validate`], and commit, all inside one serializable
//! transaction. Reads are plain tenant-filtered queries.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use uuid::Uuid;

use super::assignment::{close_assignments, open_condition};
use super::payload::{
    clean_name, DeleteOptions, DepartmentPatch, DivisionPatch, LevelPatch, LevelSpec,
    NewDepartment, NewDivision, NewPosition, PositionPatch,
};
use super::topology::{self, DepartmentNode, DivisionNode, Mutation, Rejection, TreeSnapshot};
use super::{begin_serializable, now, settings, today};
use crate::entity::division::DivisionTree;
use crate::entity::position::PositionWithLevels;
use crate::entity::{department, division, employee_assignment, position, position_level};
use crate::error::{AppError, AppResult, OptionExt};

/// What a delete removed or closed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    pub deleted_divisions: usize,
    pub deleted_departments: usize,
    pub deleted_positions: usize,
    pub deleted_levels: usize,
    pub deactivated_positions: usize,
    pub closed_assignments: usize,
}

fn check_version(expected: Option<DateTime<Utc>>, actual: DateTime<Utc>, what: &str) -> AppResult<()> {
    match expected {
        Some(expected) if expected != actual => Err(AppError::Conflict(format!(
            "{} was modified by another request",
            what
        ))),
        _ => Ok(()),
    }
}

fn reject(org_id: Uuid, what: &str, rejection: Rejection) -> AppError {
    tracing::debug!(organization_id = %org_id, ?rejection, "{} write rejected", what);
    rejection.into()
}

async fn find_division<C: ConnectionTrait>(conn: &C, org_id: Uuid, id: Uuid) -> AppResult<division::Model> {
    division::Entity::find_by_id(id)
        .filter(division::Column::OrganizationId.eq(org_id))
        .one(conn)
        .await?
        .ok_or_not_found(format!("Division {} not found", id))
}

async fn find_department<C: ConnectionTrait>(
    conn: &C,
    org_id: Uuid,
    id: Uuid,
) -> AppResult<department::Model> {
    department::Entity::find_by_id(id)
        .filter(department::Column::OrganizationId.eq(org_id))
        .one(conn)
        .await?
        .ok_or_not_found(format!("Department {} not found", id))
}

async fn find_position<C: ConnectionTrait>(conn: &C, org_id: Uuid, id: Uuid) -> AppResult<position::Model> {
    position::Entity::find_by_id(id)
        .filter(position::Column::OrganizationId.eq(org_id))
        .one(conn)
        .await?
        .ok_or_not_found(format!("Position {} not found", id))
}

async fn find_level<C: ConnectionTrait>(
    conn: &C,
    org_id: Uuid,
    id: Uuid,
) -> AppResult<position_level::Model> {
    position_level::Entity::find_by_id(id)
        .filter(position_level::Column::OrganizationId.eq(org_id))
        .one(conn)
        .await?
        .ok_or_not_found(format!("Position level {} not found", id))
}

/// Load `start` and its ancestors into the snapshot.
///
/// Ids are looked up without a tenant filter so the validator can tell a
/// foreign reference from a missing one; the walk stops at the first
/// foreign, missing or already loaded division.
async fn load_division_chain<C: ConnectionTrait>(
    conn: &C,
    org_id: Uuid,
    tree: &mut TreeSnapshot,
    start: Option<Uuid>,
) -> AppResult<()> {
    let mut cursor = start;
    while let Some(id) = cursor {
        if tree.division(id).is_some() {
            break;
        }
        let Some(model) = division::Entity::find_by_id(id).one(conn).await? else {
            break;
        };
        tree.insert_division(DivisionNode::from(&model));
        if model.organization_id != org_id {
            break;
        }
        cursor = model.parent_division_id;
    }
    Ok(())
}

async fn load_department<C: ConnectionTrait>(
    conn: &C,
    tree: &mut TreeSnapshot,
    id: Option<Uuid>,
) -> AppResult<()> {
    if let Some(id) = id {
        if let Some(model) = department::Entity::find_by_id(id).one(conn).await? {
            tree.insert_department(DepartmentNode::from(&model));
        }
    }
    Ok(())
}

/// Deactivate positions and drop their references to removed units
async fn detach_positions<C: ConnectionTrait>(
    conn: &C,
    positions: Vec<position::Model>,
    removed_divisions: &HashSet<Uuid>,
    removed_departments: &HashSet<Uuid>,
) -> AppResult<usize> {
    let ts = now();
    let count = positions.len();
    for model in positions {
        let division_id = model.division_id.filter(|id| !removed_divisions.contains(id));
        let department_id = model.department_id.filter(|id| !removed_departments.contains(id));
        let mut active = model.into_active_model();
        active.division_id = Set(division_id);
        active.department_id = Set(department_id);
        active.is_active = Set(false);
        active.updated_at = Set(ts);
        active.update(conn).await?;
    }
    Ok(count)
}

/// Nest divisions under their parents; divisions whose parent is not in the
/// list are treated as roots
fn build_tree(divisions: Vec<division::Model>) -> Vec<DivisionTree> {
    let ids: HashSet<Uuid> = divisions.iter().map(|d| d.id).collect();
    let mut children: HashMap<Option<Uuid>, Vec<division::Model>> = HashMap::new();
    for model in divisions {
        let parent = model.parent_division_id.filter(|p| ids.contains(p));
        children.entry(parent).or_default().push(model);
    }

    fn attach(
        parent: Option<Uuid>,
        children: &mut HashMap<Option<Uuid>, Vec<division::Model>>,
    ) -> Vec<DivisionTree> {
        children
            .remove(&parent)
            .unwrap_or_default()
            .into_iter()
            .map(|model| {
                let id = model.id;
                let mut node = DivisionTree::from(model);
                node.children = attach(Some(id), children);
                node
            })
            .collect()
    }

    attach(None, &mut children)
}

/// CRUD surface for the organizational hierarchy
pub struct HierarchyStore<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> HierarchyStore<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    // ---------------------------------------------------------------
    // Divisions
    // ---------------------------------------------------------------

    pub async fn list_divisions(&self, org_id: Uuid) -> AppResult<Vec<division::Model>> {
        let divisions = division::Entity::find()
            .filter(division::Column::OrganizationId.eq(org_id))
            .order_by_asc(division::Column::Name)
            .all(self.db)
            .await?;
        Ok(divisions)
    }

    pub async fn get_division(&self, org_id: Uuid, id: Uuid) -> AppResult<division::Model> {
        find_division(self.db, org_id, id).await
    }

    pub async fn division_tree(&self, org_id: Uuid) -> AppResult<Vec<DivisionTree>> {
        Ok(build_tree(self.list_divisions(org_id).await?))
    }

    pub async fn create_division(&self, org_id: Uuid, payload: NewDivision) -> AppResult<division::Model> {
        payload.validate()?;

        let txn = begin_serializable(self.db).await?;
        let flags = settings::load(&txn, org_id).await?.flags();

        let id = Uuid::new_v4();
        let mut tree = TreeSnapshot::new();
        load_division_chain(&txn, org_id, &mut tree, payload.parent_division_id).await?;
        let mutation = Mutation::Division {
            id,
            organization_id: org_id,
            parent_division_id: payload.parent_division_id,
        };
        topology::validate(&flags, &mutation, &tree).map_err(|r| reject(org_id, "Division", r))?;

        let ts = now();
        let model = division::ActiveModel {
            id: Set(id),
            organization_id: Set(org_id),
            name: Set(clean_name(&payload.name)),
            description: Set(payload.description),
            manager_id: Set(payload.manager_id),
            parent_division_id: Set(payload.parent_division_id),
            is_active: Set(payload.is_active),
            created_at: Set(ts),
            updated_at: Set(ts),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        tracing::info!(organization_id = %org_id, division_id = %model.id, "Division created: {}", model.name);
        Ok(model)
    }

    pub async fn update_division(
        &self,
        org_id: Uuid,
        id: Uuid,
        patch: DivisionPatch,
    ) -> AppResult<division::Model> {
        patch.validate()?;

        let txn = begin_serializable(self.db).await?;
        let current = find_division(&txn, org_id, id).await?;
        check_version(patch.expected_updated_at, current.updated_at, "Division")?;
        let flags = settings::load(&txn, org_id).await?.flags();

        let parent = patch.parent_division_id.unwrap_or(current.parent_division_id);
        let mut tree = TreeSnapshot::new();
        load_division_chain(&txn, org_id, &mut tree, parent).await?;
        let mutation = Mutation::Division {
            id,
            organization_id: org_id,
            parent_division_id: parent,
        };
        topology::validate(&flags, &mutation, &tree).map_err(|r| reject(org_id, "Division", r))?;

        let mut active = current.into_active_model();
        if let Some(name) = &patch.name {
            active.name = Set(clean_name(name));
        }
        if let Some(description) = patch.description {
            active.description = Set(description);
        }
        if let Some(manager_id) = patch.manager_id {
            active.manager_id = Set(manager_id);
        }
        if let Some(is_active) = patch.is_active {
            active.is_active = Set(is_active);
        }
        active.parent_division_id = Set(parent);
        active.updated_at = Set(now());
        let model = active.update(&txn).await?;

        txn.commit().await?;
        tracing::info!(organization_id = %org_id, division_id = %id, "Division updated");
        Ok(model)
    }

    /// Delete a division; with `cascade` the whole subtree goes with it
    pub async fn delete_division(
        &self,
        org_id: Uuid,
        id: Uuid,
        options: DeleteOptions,
    ) -> AppResult<DeleteSummary> {
        let txn = begin_serializable(self.db).await?;
        let target = find_division(&txn, org_id, id).await?;

        // Breadth-first walk of the subtree; `seen` also guards against corrupt loops
        let mut subtree = vec![target.id];
        let mut seen: HashSet<Uuid> = subtree.iter().copied().collect();
        let mut frontier = subtree.clone();
        while !frontier.is_empty() {
            let children = division::Entity::find()
                .filter(division::Column::OrganizationId.eq(org_id))
                .filter(division::Column::ParentDivisionId.is_in(frontier))
                .all(&txn)
                .await?;
            frontier = children
                .into_iter()
                .map(|c| c.id)
                .filter(|c| seen.insert(*c))
                .collect();
            subtree.extend(frontier.iter().copied());
        }

        let departments = department::Entity::find()
            .filter(department::Column::OrganizationId.eq(org_id))
            .filter(department::Column::DivisionId.is_in(subtree.clone()))
            .all(&txn)
            .await?;
        let department_ids: Vec<Uuid> = departments.iter().map(|d| d.id).collect();

        let positions = position::Entity::find()
            .filter(position::Column::OrganizationId.eq(org_id))
            .filter(
                Condition::any()
                    .add(position::Column::DivisionId.is_in(subtree.clone()))
                    .add(position::Column::DepartmentId.is_in(department_ids.clone())),
            )
            .all(&txn)
            .await?;

        let as_of = today();
        let open_assignments = employee_assignment::Entity::find()
            .filter(employee_assignment::Column::OrganizationId.eq(org_id))
            .filter(
                Condition::any()
                    .add(employee_assignment::Column::DivisionId.is_in(subtree.clone()))
                    .add(employee_assignment::Column::DepartmentId.is_in(department_ids.clone())),
            )
            .filter(open_condition(as_of))
            .all(&txn)
            .await?;

        let sub_divisions = subtree.len() - 1;
        if !options.cascade
            && (sub_divisions > 0
                || !departments.is_empty()
                || !positions.is_empty()
                || !open_assignments.is_empty())
        {
            return Err(AppError::HasDependents(format!(
                "Division {} has {} sub-divisions, {} departments, {} positions and {} open assignments",
                id,
                sub_divisions,
                departments.len(),
                positions.len(),
                open_assignments.len()
            )));
        }

        let removed_divisions: HashSet<Uuid> = subtree.iter().copied().collect();
        let removed_departments: HashSet<Uuid> = department_ids.iter().copied().collect();

        let mut summary = DeleteSummary {
            closed_assignments: close_assignments(&txn, open_assignments, as_of).await?,
            deactivated_positions: detach_positions(
                &txn,
                positions,
                &removed_divisions,
                &removed_departments,
            )
            .await?,
            ..Default::default()
        };

        if !department_ids.is_empty() {
            summary.deleted_departments = department::Entity::delete_many()
                .filter(department::Column::Id.is_in(department_ids))
                .exec(&txn)
                .await?
                .rows_affected as usize;
        }
        summary.deleted_divisions = division::Entity::delete_many()
            .filter(division::Column::OrganizationId.eq(org_id))
            .filter(division::Column::Id.is_in(subtree))
            .exec(&txn)
            .await?
            .rows_affected as usize;

        txn.commit().await?;
        tracing::info!(organization_id = %org_id, division_id = %id, ?summary, "Division deleted: {}", target.name);
        Ok(summary)
    }

    // ---------------------------------------------------------------
    // Departments
    // ---------------------------------------------------------------

    pub async fn list_departments(&self, org_id: Uuid) -> AppResult<Vec<department::Model>> {
        let departments = department::Entity::find()
            .filter(department::Column::OrganizationId.eq(org_id))
            .order_by_asc(department::Column::Name)
            .all(self.db)
            .await?;
        Ok(departments)
    }

    pub async fn get_department(&self, org_id: Uuid, id: Uuid) -> AppResult<department::Model> {
        find_department(self.db, org_id, id).await
    }

    pub async fn create_department(
        &self,
        org_id: Uuid,
        payload: NewDepartment,
    ) -> AppResult<department::Model> {
        payload.validate()?;

        let txn = begin_serializable(self.db).await?;
        let flags = settings::load(&txn, org_id).await?.flags();

        let mut tree = TreeSnapshot::new();
        load_division_chain(&txn, org_id, &mut tree, payload.division_id).await?;
        let mutation = Mutation::Department {
            organization_id: org_id,
            division_id: payload.division_id,
        };
        topology::validate(&flags, &mutation, &tree).map_err(|r| reject(org_id, "Department", r))?;

        let ts = now();
        let model = department::ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(org_id),
            division_id: Set(payload.division_id),
            name: Set(clean_name(&payload.name)),
            description: Set(payload.description),
            manager_id: Set(payload.manager_id),
            is_active: Set(payload.is_active),
            created_at: Set(ts),
            updated_at: Set(ts),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        tracing::info!(organization_id = %org_id, department_id = %model.id, "Department created: {}", model.name);
        Ok(model)
    }

    pub async fn update_department(
        &self,
        org_id: Uuid,
        id: Uuid,
        patch: DepartmentPatch,
    ) -> AppResult<department::Model> {
        patch.validate()?;

        let txn = begin_serializable(self.db).await?;
        let current = find_department(&txn, org_id, id).await?;
        check_version(patch.expected_updated_at, current.updated_at, "Department")?;
        let flags = settings::load(&txn, org_id).await?.flags();

        let division_id = patch.division_id.unwrap_or(current.division_id);
        let mut tree = TreeSnapshot::new();
        load_division_chain(&txn, org_id, &mut tree, division_id).await?;
        let mutation = Mutation::Department {
            organization_id: org_id,
            division_id,
        };
        topology::validate(&flags, &mutation, &tree).map_err(|r| reject(org_id, "Department", r))?;

        if division_id != current.division_id {
            // Positions pinned to both this department and another division would turn inconsistent
            let mut pinned = position::Entity::find()
                .filter(position::Column::OrganizationId.eq(org_id))
                .filter(position::Column::DepartmentId.eq(id))
                .filter(position::Column::DivisionId.is_not_null());
            if let Some(new_division) = division_id {
                pinned = pinned.filter(position::Column::DivisionId.ne(new_division));
            }
            let pinned = pinned.count(&txn).await?;
            if pinned > 0 {
                return Err(AppError::scope(
                    "division_id",
                    format!(
                        "{} positions are scoped to this department and its current division; re-scope them first",
                        pinned
                    ),
                ));
            }
        }

        let mut active = current.into_active_model();
        if let Some(name) = &patch.name {
            active.name = Set(clean_name(name));
        }
        if let Some(description) = patch.description {
            active.description = Set(description);
        }
        if let Some(manager_id) = patch.manager_id {
            active.manager_id = Set(manager_id);
        }
        if let Some(is_active) = patch.is_active {
            active.is_active = Set(is_active);
        }
        active.division_id = Set(division_id);
        active.updated_at = Set(now());
        let model = active.update(&txn).await?;

        txn.commit().await?;
        tracing::info!(organization_id = %org_id, department_id = %id, "Department updated");
        Ok(model)
    }

    pub async fn delete_department(
        &self,
        org_id: Uuid,
        id: Uuid,
        options: DeleteOptions,
    ) -> AppResult<DeleteSummary> {
        let txn = begin_serializable(self.db).await?;
        let target = find_department(&txn, org_id, id).await?;

        let positions = position::Entity::find()
            .filter(position::Column::OrganizationId.eq(org_id))
            .filter(position::Column::DepartmentId.eq(id))
            .all(&txn)
            .await?;

        let as_of = today();
        let open_assignments = employee_assignment::Entity::find()
            .filter(employee_assignment::Column::OrganizationId.eq(org_id))
            .filter(employee_assignment::Column::DepartmentId.eq(id))
            .filter(open_condition(as_of))
            .all(&txn)
            .await?;

        if !options.cascade && (!positions.is_empty() || !open_assignments.is_empty()) {
            return Err(AppError::HasDependents(format!(
                "Department {} has {} positions and {} open assignments",
                id,
                positions.len(),
                open_assignments.len()
            )));
        }

        let removed_departments: HashSet<Uuid> = [id].into_iter().collect();
        let mut summary = DeleteSummary {
            closed_assignments: close_assignments(&txn, open_assignments, as_of).await?,
            deactivated_positions: detach_positions(&txn, positions, &HashSet::new(), &removed_departments)
                .await?,
            ..Default::default()
        };
        summary.deleted_departments = department::Entity::delete_by_id(id)
            .exec(&txn)
            .await?
            .rows_affected as usize;

        txn.commit().await?;
        tracing::info!(organization_id = %org_id, department_id = %id, ?summary, "Department deleted: {}", target.name);
        Ok(summary)
    }

    // ---------------------------------------------------------------
    // Positions
    // ---------------------------------------------------------------

    /// Positions ordered by name, each with its levels while levels are enabled
    pub async fn list_positions(&self, org_id: Uuid) -> AppResult<Vec<PositionWithLevels>> {
        let flags = settings::load(self.db, org_id).await?.flags();

        let positions = position::Entity::find()
            .filter(position::Column::OrganizationId.eq(org_id))
            .order_by_asc(position::Column::Name)
            .all(self.db)
            .await?;

        let mut levels: HashMap<Uuid, Vec<position_level::Model>> = HashMap::new();
        if flags.use_position_levels {
            let all = position_level::Entity::find()
                .filter(position_level::Column::OrganizationId.eq(org_id))
                .order_by_asc(position_level::Column::LevelOrder)
                .all(self.db)
                .await?;
            for level in all {
                levels.entry(level.position_id).or_default().push(level);
            }
        }

        Ok(positions
            .into_iter()
            .map(|position| PositionWithLevels {
                levels: levels.remove(&position.id).unwrap_or_default(),
                position,
            })
            .collect())
    }

    pub async fn get_position(&self, org_id: Uuid, id: Uuid) -> AppResult<PositionWithLevels> {
        let position = find_position(self.db, org_id, id).await?;
        let levels = self.list_levels(org_id, id).await?;
        Ok(PositionWithLevels { position, levels })
    }

    /// Levels of a position in seniority order; empty while levels are disabled
    pub async fn list_levels(&self, org_id: Uuid, position_id: Uuid) -> AppResult<Vec<position_level::Model>> {
        let flags = settings::load(self.db, org_id).await?.flags();
        if !flags.use_position_levels {
            return Ok(Vec::new());
        }
        let levels = position_level::Entity::find()
            .filter(position_level::Column::OrganizationId.eq(org_id))
            .filter(position_level::Column::PositionId.eq(position_id))
            .order_by_asc(position_level::Column::LevelOrder)
            .all(self.db)
            .await?;
        Ok(levels)
    }

    pub async fn create_position(&self, org_id: Uuid, payload: NewPosition) -> AppResult<PositionWithLevels> {
        payload.validate()?;

        let txn = begin_serializable(self.db).await?;
        let flags = settings::load(&txn, org_id).await?.flags();

        let mut tree = TreeSnapshot::new();
        load_division_chain(&txn, org_id, &mut tree, payload.division_id).await?;
        load_department(&txn, &mut tree, payload.department_id).await?;
        let mutation = Mutation::Position {
            organization_id: org_id,
            division_id: payload.division_id,
            department_id: payload.department_id,
        };
        topology::validate(&flags, &mutation, &tree).map_err(|r| reject(org_id, "Position", r))?;

        if !payload.levels.is_empty() && !flags.use_position_levels {
            return Err(AppError::scope(
                "levels",
                "position levels are disabled for this organization",
            ));
        }

        let ts = now();
        let position = position::ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(org_id),
            division_id: Set(payload.division_id),
            department_id: Set(payload.department_id),
            name: Set(clean_name(&payload.name)),
            description: Set(payload.description),
            is_active: Set(payload.is_active),
            created_at: Set(ts),
            updated_at: Set(ts),
        }
        .insert(&txn)
        .await?;

        let mut specs = payload.levels;
        specs.sort_by_key(|spec| spec.level_order);
        let mut levels = Vec::with_capacity(specs.len());
        for spec in specs {
            levels.push(insert_level(&txn, org_id, position.id, spec).await?);
        }

        txn.commit().await?;
        tracing::info!(
            organization_id = %org_id,
            position_id = %position.id,
            levels = levels.len(),
            "Position created: {}",
            position.name
        );
        Ok(PositionWithLevels { position, levels })
    }

    pub async fn update_position(
        &self,
        org_id: Uuid,
        id: Uuid,
        patch: PositionPatch,
    ) -> AppResult<position::Model> {
        patch.validate()?;

        let txn = begin_serializable(self.db).await?;
        let current = find_position(&txn, org_id, id).await?;
        check_version(patch.expected_updated_at, current.updated_at, "Position")?;
        let flags = settings::load(&txn, org_id).await?.flags();

        let division_id = patch.division_id.unwrap_or(current.division_id);
        let department_id = patch.department_id.unwrap_or(current.department_id);
        let mut tree = TreeSnapshot::new();
        load_division_chain(&txn, org_id, &mut tree, division_id).await?;
        load_department(&txn, &mut tree, department_id).await?;
        let mutation = Mutation::Position {
            organization_id: org_id,
            division_id,
            department_id,
        };
        topology::validate(&flags, &mutation, &tree).map_err(|r| reject(org_id, "Position", r))?;

        let mut active = current.into_active_model();
        if let Some(name) = &patch.name {
            active.name = Set(clean_name(name));
        }
        if let Some(description) = patch.description {
            active.description = Set(description);
        }
        if let Some(is_active) = patch.is_active {
            active.is_active = Set(is_active);
        }
        active.division_id = Set(division_id);
        active.department_id = Set(department_id);
        active.updated_at = Set(now());
        let model = active.update(&txn).await?;

        txn.commit().await?;
        tracing::info!(organization_id = %org_id, position_id = %id, "Position updated");
        Ok(model)
    }

    pub async fn delete_position(
        &self,
        org_id: Uuid,
        id: Uuid,
        options: DeleteOptions,
    ) -> AppResult<DeleteSummary> {
        let txn = begin_serializable(self.db).await?;
        let target = find_position(&txn, org_id, id).await?;

        let as_of = today();
        let open_assignments = employee_assignment::Entity::find()
            .filter(employee_assignment::Column::OrganizationId.eq(org_id))
            .filter(employee_assignment::Column::PositionId.eq(id))
            .filter(open_condition(as_of))
            .all(&txn)
            .await?;

        if !options.cascade && !open_assignments.is_empty() {
            return Err(AppError::HasDependents(format!(
                "Position {} has {} open assignments",
                id,
                open_assignments.len()
            )));
        }

        let mut summary = DeleteSummary {
            closed_assignments: close_assignments(&txn, open_assignments, as_of).await?,
            ..Default::default()
        };
        summary.deleted_levels = position_level::Entity::delete_many()
            .filter(position_level::Column::OrganizationId.eq(org_id))
            .filter(position_level::Column::PositionId.eq(id))
            .exec(&txn)
            .await?
            .rows_affected as usize;
        summary.deleted_positions = position::Entity::delete_by_id(id)
            .exec(&txn)
            .await?
            .rows_affected as usize;

        txn.commit().await?;
        tracing::info!(organization_id = %org_id, position_id = %id, ?summary, "Position deleted: {}", target.name);
        Ok(summary)
    }

    // ---------------------------------------------------------------
    // Position levels
    // ---------------------------------------------------------------

    pub async fn create_position_level(
        &self,
        org_id: Uuid,
        position_id: Uuid,
        spec: LevelSpec,
    ) -> AppResult<position_level::Model> {
        spec.validate()?;

        let txn = begin_serializable(self.db).await?;
        let flags = settings::load(&txn, org_id).await?.flags();
        if !flags.use_position_levels {
            return Err(AppError::scope(
                "levels",
                "position levels are disabled for this organization",
            ));
        }

        let owned = position::Entity::find_by_id(position_id)
            .filter(position::Column::OrganizationId.eq(org_id))
            .one(&txn)
            .await?;
        if owned.is_none() {
            return Err(Rejection::Reference {
                field: "position_id",
                id: position_id,
            }
            .into());
        }

        let level = insert_level(&txn, org_id, position_id, spec).await?;

        txn.commit().await?;
        tracing::info!(
            organization_id = %org_id,
            position_id = %position_id,
            level_order = level.level_order,
            "Position level created: {}",
            level.level_name
        );
        Ok(level)
    }

    pub async fn update_position_level(
        &self,
        org_id: Uuid,
        id: Uuid,
        patch: LevelPatch,
    ) -> AppResult<position_level::Model> {
        patch.validate()?;

        let txn = begin_serializable(self.db).await?;
        let current = find_level(&txn, org_id, id).await?;
        check_version(patch.expected_updated_at, current.updated_at, "Position level")?;
        let flags = settings::load(&txn, org_id).await?.flags();
        if !flags.use_position_levels {
            return Err(AppError::scope(
                "levels",
                "position levels are disabled for this organization",
            ));
        }

        if let Some(order) = patch.level_order.filter(|o| *o != current.level_order) {
            ensure_order_free(&txn, current.position_id, order).await?;
        }

        let mut active = current.into_active_model();
        if let Some(name) = &patch.level_name {
            active.level_name = Set(clean_name(name));
        }
        if let Some(order) = patch.level_order {
            active.level_order = Set(order);
        }
        if let Some(description) = patch.description {
            active.description = Set(description);
        }
        active.updated_at = Set(now());
        let model = active.update(&txn).await?;

        txn.commit().await?;
        tracing::info!(organization_id = %org_id, level_id = %id, "Position level updated");
        Ok(model)
    }

    pub async fn delete_position_level(
        &self,
        org_id: Uuid,
        id: Uuid,
        options: DeleteOptions,
    ) -> AppResult<DeleteSummary> {
        let txn = begin_serializable(self.db).await?;
        find_level(&txn, org_id, id).await?;

        let as_of = today();
        let open_assignments = employee_assignment::Entity::find()
            .filter(employee_assignment::Column::OrganizationId.eq(org_id))
            .filter(employee_assignment::Column::PositionLevelId.eq(id))
            .filter(open_condition(as_of))
            .all(&txn)
            .await?;

        if !options.cascade && !open_assignments.is_empty() {
            return Err(AppError::HasDependents(format!(
                "Position level {} has {} open assignments",
                id,
                open_assignments.len()
            )));
        }

        let mut summary = DeleteSummary {
            closed_assignments: close_assignments(&txn, open_assignments, as_of).await?,
            ..Default::default()
        };
        summary.deleted_levels = position_level::Entity::delete_by_id(id)
            .exec(&txn)
            .await?
            .rows_affected as usize;

        txn.commit().await?;
        tracing::info!(organization_id = %org_id, level_id = %id, ?summary, "Position level deleted");
        Ok(summary)
    }
}

async fn ensure_order_free<C: ConnectionTrait>(conn: &C, position_id: Uuid, order: i32) -> AppResult<()> {
    let taken = position_level::Entity::find()
        .filter(position_level::Column::PositionId.eq(position_id))
        .filter(position_level::Column::LevelOrder.eq(order))
        .count(conn)
        .await?;
    if taken > 0 {
        return Err(AppError::validation(
            "level_order",
            format!("level_order {} is already used by this position", order),
        ));
    }
    Ok(())
}

async fn insert_level<C: ConnectionTrait>(
    conn: &C,
    org_id: Uuid,
    position_id: Uuid,
    spec: LevelSpec,
) -> AppResult<position_level::Model> {
    ensure_order_free(conn, position_id, spec.level_order).await?;

    let ts = now();
    let level = position_level::ActiveModel {
        id: Set(Uuid::new_v4()),
        organization_id: Set(org_id),
        position_id: Set(position_id),
        level_name: Set(clean_name(&spec.level_name)),
        level_order: Set(spec.level_order),
        description: Set(spec.description),
        created_at: Set(ts),
        updated_at: Set(ts),
    }
    .insert(conn)
    .await?;
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_db;
    use crate::org::assignment::AssignmentEngine;
    use crate::org::payload::AssignRequest;
    use crate::org::settings::{SettingsPatch, SettingsStore};
    use chrono::NaiveDate;
    use tokio_test::{assert_err, assert_ok};

    async fn provisioned(db: &DatabaseConnection, patch: SettingsPatch) -> Uuid {
        let org = Uuid::new_v4();
        let settings = SettingsStore::new(db);
        settings.provision(org).await.unwrap();
        settings.update(org, patch).await.unwrap();
        org
    }

    fn divisional() -> SettingsPatch {
        SettingsPatch {
            use_divisions: Some(true),
            use_departments: Some(true),
            departments_under_divisions: Some(true),
            ..Default::default()
        }
    }

    fn scoped_positions() -> SettingsPatch {
        SettingsPatch {
            use_divisions: Some(true),
            positions_are_org_wide: Some(false),
            ..Default::default()
        }
    }

    fn child(name: &str, parent: Uuid) -> NewDivision {
        NewDivision {
            parent_division_id: Some(parent),
            ..NewDivision::named(name)
        }
    }

    fn dept_in(name: &str, division: Uuid) -> NewDepartment {
        NewDepartment {
            division_id: Some(division),
            ..NewDepartment::named(name)
        }
    }

    fn reparent(parent: Option<Uuid>) -> DivisionPatch {
        DivisionPatch {
            parent_division_id: Some(parent),
            ..Default::default()
        }
    }

    /// Walk every division's parent chain and fail on a revisit
    async fn assert_acyclic(store: &HierarchyStore<'_>, org: Uuid) {
        let divisions = store.list_divisions(org).await.unwrap();
        let parents: HashMap<Uuid, Option<Uuid>> =
            divisions.iter().map(|d| (d.id, d.parent_division_id)).collect();
        for d in &divisions {
            let mut seen = HashSet::new();
            let mut cursor = Some(d.id);
            while let Some(id) = cursor {
                assert!(seen.insert(id), "cycle through division {}", d.id);
                cursor = parents.get(&id).copied().flatten();
            }
        }
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let db = memory_db().await;
        let org = provisioned(&db, SettingsPatch::default()).await;
        let store = HierarchyStore::new(&db);

        let payload = NewDivision {
            description: Some("Field operations".to_string()),
            manager_id: Some(Uuid::new_v4()),
            ..NewDivision::named("Operations")
        };
        let created = store.create_division(org, payload.clone()).await.unwrap();
        let fetched = store.get_division(org, created.id).await.unwrap();

        assert_eq!(created, fetched);
        assert_eq!(fetched.name, payload.name);
        assert_eq!(fetched.description, payload.description);
        assert_eq!(fetched.manager_id, payload.manager_id);
        assert_eq!(fetched.parent_division_id, None);
        assert!(fetched.is_active);
        assert_eq!(fetched.organization_id, org);
    }

    #[tokio::test]
    async fn test_writes_require_provisioned_settings() {
        let db = memory_db().await;
        let store = HierarchyStore::new(&db);
        let result = store.create_division(Uuid::new_v4(), NewDivision::named("Ops")).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reparent_into_own_subtree_is_cycle() {
        let db = memory_db().await;
        let org = provisioned(&db, divisional()).await;
        let store = HierarchyStore::new(&db);

        let a = store.create_division(org, NewDivision::named("A")).await.unwrap();
        let b = store.create_division(org, child("B", a.id)).await.unwrap();

        let result = store.update_division(org, a.id, reparent(Some(b.id))).await;
        assert!(matches!(result, Err(AppError::Cycle(_))));

        let result = store.update_division(org, a.id, reparent(Some(a.id))).await;
        assert!(matches!(result, Err(AppError::Cycle(_))));

        // nothing was written
        assert_eq!(store.get_division(org, a.id).await.unwrap().parent_division_id, None);
    }

    #[tokio::test]
    async fn test_division_chains_stay_acyclic() {
        let db = memory_db().await;
        let org = provisioned(&db, divisional()).await;
        let store = HierarchyStore::new(&db);

        let mut ids = Vec::new();
        for i in 0..6 {
            let parent = ids.last().copied();
            let payload = NewDivision {
                parent_division_id: parent,
                ..NewDivision::named(format!("D{}", i))
            };
            ids.push(store.create_division(org, payload).await.unwrap().id);
        }

        // Try every re-parenting; valid ones commit, the rest are cycles
        for &target in &ids {
            for &parent in &ids {
                let result = store.update_division(org, target, reparent(Some(parent))).await;
                if let Err(err) = result {
                    assert!(matches!(err, AppError::Cycle(_)), "unexpected {:?}", err);
                }
                assert_acyclic(&store, org).await;
            }
        }
    }

    #[tokio::test]
    async fn test_cross_tenant_parent_rejected() {
        let db = memory_db().await;
        let org_a = provisioned(&db, divisional()).await;
        let org_b = provisioned(&db, divisional()).await;
        let store = HierarchyStore::new(&db);

        let foreign = store.create_division(org_b, NewDivision::named("B-root")).await.unwrap();
        let result = store.create_division(org_a, child("A-child", foreign.id)).await;
        match result {
            Err(AppError::Reference { field, .. }) => assert_eq!(field, "parent_division_id"),
            other => panic!("expected reference error, got {:?}", other),
        }

        // and org A cannot see org B's records
        let result = store.get_division(org_a, foreign.id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(store.list_divisions(org_a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_department_division_optional_then_required() {
        let db = memory_db().await;
        let org = provisioned(
            &db,
            SettingsPatch {
                use_divisions: Some(false),
                use_departments: Some(true),
                ..Default::default()
            },
        )
        .await;
        let store = HierarchyStore::new(&db);
        let division = store.create_division(org, NewDivision::named("North")).await.unwrap();

        assert_ok!(store.create_department(org, dept_in("Sales", division.id)).await);
        assert_ok!(store.create_department(org, NewDepartment::named("Legal")).await);

        // flag alone stays inert while divisions are off
        SettingsStore::new(&db)
            .update(
                org,
                SettingsPatch {
                    departments_under_divisions: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_ok!(store.create_department(org, NewDepartment::named("Finance")).await);

        SettingsStore::new(&db)
            .update(
                org,
                SettingsPatch {
                    use_divisions: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let result = store.create_department(org, NewDepartment::named("Support")).await;
        match result {
            Err(AppError::ScopeViolation { field, .. }) => assert_eq!(field, "division_id"),
            other => panic!("expected scope violation, got {:?}", other),
        }

        // every department committed from here on carries a division
        let created = store.create_department(org, dept_in("Support", division.id)).await.unwrap();
        assert_eq!(created.division_id, Some(division.id));
    }

    #[tokio::test]
    async fn test_department_move_blocked_by_pinned_positions() {
        let db = memory_db().await;
        let org = provisioned(
            &db,
            SettingsPatch {
                positions_are_org_wide: Some(false),
                ..divisional()
            },
        )
        .await;
        let store = HierarchyStore::new(&db);
        let north = store.create_division(org, NewDivision::named("North")).await.unwrap();
        let south = store.create_division(org, NewDivision::named("South")).await.unwrap();
        let sales = store.create_department(org, dept_in("Sales", north.id)).await.unwrap();
        store
            .create_position(
                org,
                NewPosition {
                    division_id: Some(north.id),
                    department_id: Some(sales.id),
                    ..NewPosition::named("Account Executive")
                },
            )
            .await
            .unwrap();

        let result = store
            .update_department(
                org,
                sales.id,
                DepartmentPatch {
                    division_id: Some(Some(south.id)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::ScopeViolation { .. })));
    }

    #[tokio::test]
    async fn test_position_scoping_follows_settings() {
        let db = memory_db().await;
        let org = provisioned(&db, SettingsPatch::default()).await;
        let store = HierarchyStore::new(&db);
        let sales = store.create_department(org, NewDepartment::named("Sales")).await.unwrap();

        // org-wide by default
        let scoped = NewPosition {
            department_id: Some(sales.id),
            ..NewPosition::named("Rep")
        };
        assert!(matches!(
            store.create_position(org, scoped.clone()).await,
            Err(AppError::ScopeViolation { .. })
        ));
        assert_ok!(store.create_position(org, NewPosition::named("CEO")).await);

        SettingsStore::new(&db).update(org, scoped_positions()).await.unwrap();
        assert_ok!(store.create_position(org, scoped).await);
        assert!(matches!(
            store.create_position(org, NewPosition::named("Floater")).await,
            Err(AppError::ScopeViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_position_department_must_match_division() {
        let db = memory_db().await;
        let org = provisioned(&db, SettingsPatch { positions_are_org_wide: Some(false), ..divisional() }).await;
        let store = HierarchyStore::new(&db);
        let north = store.create_division(org, NewDivision::named("North")).await.unwrap();
        let south = store.create_division(org, NewDivision::named("South")).await.unwrap();
        let sales = store.create_department(org, dept_in("Sales", south.id)).await.unwrap();

        let result = store
            .create_position(
                org,
                NewPosition {
                    division_id: Some(north.id),
                    department_id: Some(sales.id),
                    ..NewPosition::named("Rep")
                },
            )
            .await;
        match result {
            Err(AppError::ScopeViolation { field, .. }) => assert_eq!(field, "department_id"),
            other => panic!("expected scope violation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_division_blocked_then_cascaded() {
        let db = memory_db().await;
        let org = provisioned(&db, SettingsPatch { positions_are_org_wide: Some(false), ..divisional() }).await;
        let store = HierarchyStore::new(&db);

        let ops = store.create_division(org, NewDivision::named("Operations")).await.unwrap();
        let field = store.create_division(org, child("Field", ops.id)).await.unwrap();
        let logistics = store.create_department(org, dept_in("Logistics", ops.id)).await.unwrap();
        store.create_department(org, dept_in("Fleet", ops.id)).await.unwrap();
        store.create_department(org, dept_in("Crews", field.id)).await.unwrap();
        let driver = store
            .create_position(
                org,
                NewPosition {
                    division_id: Some(ops.id),
                    department_id: Some(logistics.id),
                    ..NewPosition::named("Driver")
                },
            )
            .await
            .unwrap();

        let employee = Uuid::new_v4();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let assignment = AssignmentEngine::new(&db)
            .assign(
                org,
                AssignRequest {
                    division_id: Some(ops.id),
                    department_id: Some(logistics.id),
                    ..AssignRequest::to_position(employee, driver.position.id, start)
                },
            )
            .await
            .unwrap();

        let blocked = store.delete_division(org, ops.id, DeleteOptions::default()).await;
        assert!(matches!(blocked, Err(AppError::HasDependents(_))));
        assert_eq!(store.list_departments(org).await.unwrap().len(), 3);

        let summary = store.delete_division(org, ops.id, DeleteOptions::cascade()).await.unwrap();
        assert_eq!(summary.deleted_divisions, 2);
        assert_eq!(summary.deleted_departments, 3);
        assert_eq!(summary.deactivated_positions, 1);
        assert_eq!(summary.closed_assignments, 1);

        assert!(store.list_divisions(org).await.unwrap().is_empty());
        let remaining = store.list_departments(org).await.unwrap();
        assert!(remaining.iter().all(|d| d.division_id != Some(ops.id)));
        assert!(remaining.is_empty());

        let driver = store.get_position(org, driver.position.id).await.unwrap().position;
        assert!(!driver.is_active);
        assert_eq!(driver.division_id, None);
        assert_eq!(driver.department_id, None);

        let history = AssignmentEngine::new(&db)
            .list_for_employee(org, employee, None)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, assignment.id);
        assert!(!history[0].is_open(today()));
    }

    #[tokio::test]
    async fn test_delete_division_with_two_departments() {
        let db = memory_db().await;
        let org = provisioned(&db, divisional()).await;
        let store = HierarchyStore::new(&db);
        let div = store.create_division(org, NewDivision::named("Retail")).await.unwrap();
        store.create_department(org, dept_in("Stores", div.id)).await.unwrap();
        store.create_department(org, dept_in("Online", div.id)).await.unwrap();

        assert_err!(store.delete_division(org, div.id, DeleteOptions::default()).await);
        let summary = assert_ok!(store.delete_division(org, div.id, DeleteOptions::cascade()).await);
        assert_eq!(summary.deleted_departments, 2);
        assert!(store
            .list_departments(org)
            .await
            .unwrap()
            .iter()
            .all(|d| d.division_id != Some(div.id)));
    }

    #[tokio::test]
    async fn test_delete_leaf_division_without_cascade() {
        let db = memory_db().await;
        let org = provisioned(&db, divisional()).await;
        let store = HierarchyStore::new(&db);
        let div = store.create_division(org, NewDivision::named("Empty")).await.unwrap();

        let summary = store.delete_division(org, div.id, DeleteOptions::default()).await.unwrap();
        assert_eq!(summary.deleted_divisions, 1);
        assert!(matches!(store.get_division(org, div.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_department_with_positions() {
        let db = memory_db().await;
        let org = provisioned(&db, scoped_positions()).await;
        let store = HierarchyStore::new(&db);
        let sales = store.create_department(org, NewDepartment::named("Sales")).await.unwrap();
        let rep = store
            .create_position(
                org,
                NewPosition {
                    department_id: Some(sales.id),
                    ..NewPosition::named("Rep")
                },
            )
            .await
            .unwrap();

        let blocked = store.delete_department(org, sales.id, DeleteOptions::default()).await;
        assert!(matches!(blocked, Err(AppError::HasDependents(_))));

        store.delete_department(org, sales.id, DeleteOptions::cascade()).await.unwrap();
        let rep = store.get_position(org, rep.position.id).await.unwrap().position;
        assert_eq!(rep.department_id, None);
        assert!(!rep.is_active);
    }

    #[tokio::test]
    async fn test_update_position_revalidates_scope() {
        let db = memory_db().await;
        let org = provisioned(&db, scoped_positions()).await;
        let store = HierarchyStore::new(&db);
        let north = store.create_division(org, NewDivision::named("North")).await.unwrap();
        let sales = store.create_department(org, NewDepartment::named("Sales")).await.unwrap();
        let rep = store
            .create_position(
                org,
                NewPosition {
                    division_id: Some(north.id),
                    description: Some("Field sales".to_string()),
                    ..NewPosition::named("Rep")
                },
            )
            .await
            .unwrap()
            .position;

        // absent fields are left alone
        let renamed = store
            .update_position(
                org,
                rep.id,
                PositionPatch {
                    name: Some("Senior Rep".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Senior Rep");
        assert_eq!(renamed.description.as_deref(), Some("Field sales"));
        assert_eq!(renamed.division_id, Some(north.id));

        // clearing the only unit leaves the position unscoped
        let unscoped = store
            .update_position(
                org,
                rep.id,
                PositionPatch {
                    division_id: Some(None),
                    ..Default::default()
                },
            )
            .await;
        match unscoped {
            Err(AppError::ScopeViolation { field, .. }) => assert_eq!(field, "division_id"),
            other => panic!("expected scope violation, got {:?}", other),
        }
        let unchanged = store.get_position(org, rep.id).await.unwrap().position;
        assert_eq!(unchanged.division_id, Some(north.id));

        let moved = store
            .update_position(
                org,
                rep.id,
                PositionPatch {
                    description: Some(None),
                    division_id: Some(None),
                    department_id: Some(Some(sales.id)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.description, None);
        assert_eq!(moved.division_id, None);
        assert_eq!(moved.department_id, Some(sales.id));

        let foreign = store
            .update_position(
                org,
                rep.id,
                PositionPatch {
                    department_id: Some(Some(Uuid::new_v4())),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(foreign, Err(AppError::Reference { .. })));
    }

    #[tokio::test]
    async fn test_delete_position_blocked_then_cascaded() {
        let db = memory_db().await;
        let org = provisioned(&db, SettingsPatch::default()).await;
        let store = HierarchyStore::new(&db);
        let engineer = store
            .create_position(
                org,
                NewPosition {
                    levels: vec![LevelSpec::new("Junior", 1), LevelSpec::new("Senior", 2)],
                    ..NewPosition::named("Engineer")
                },
            )
            .await
            .unwrap();
        let intern = store.create_position(org, NewPosition::named("Intern")).await.unwrap();

        let engine = AssignmentEngine::new(&db);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let employee = Uuid::new_v4();
        engine
            .assign(org, AssignRequest::to_position(employee, engineer.position.id, start))
            .await
            .unwrap();
        engine
            .assign(
                org,
                AssignRequest {
                    end_date: NaiveDate::from_ymd_opt(2024, 2, 1),
                    ..AssignRequest::to_position(Uuid::new_v4(), intern.position.id, start)
                },
            )
            .await
            .unwrap();

        // closed assignments keep their history and do not block
        let summary = store
            .delete_position(org, intern.position.id, DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.deleted_positions, 1);
        assert_eq!(summary.closed_assignments, 0);

        let blocked = store
            .delete_position(org, engineer.position.id, DeleteOptions::default())
            .await;
        assert!(matches!(blocked, Err(AppError::HasDependents(_))));
        assert_eq!(store.get_position(org, engineer.position.id).await.unwrap().levels.len(), 2);

        let summary = store
            .delete_position(org, engineer.position.id, DeleteOptions::cascade())
            .await
            .unwrap();
        assert_eq!(
            summary,
            DeleteSummary {
                deleted_positions: 1,
                deleted_levels: 2,
                closed_assignments: 1,
                ..Default::default()
            }
        );
        assert!(matches!(
            store.get_position(org, engineer.position.id).await,
            Err(AppError::NotFound(_))
        ));

        let history = engine.list_for_employee(org, employee, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].end_date, Some(today()));
        assert!(!history[0].is_open(today()));
    }

    #[tokio::test]
    async fn test_delete_level_blocked_by_open_assignment() {
        let db = memory_db().await;
        let org = provisioned(&db, SettingsPatch::default()).await;
        let store = HierarchyStore::new(&db);
        let engineer = store
            .create_position(
                org,
                NewPosition {
                    levels: vec![LevelSpec::new("Junior", 1), LevelSpec::new("Senior", 2)],
                    ..NewPosition::named("Engineer")
                },
            )
            .await
            .unwrap();
        let (junior, senior) = (engineer.levels[0].id, engineer.levels[1].id);

        let engine = AssignmentEngine::new(&db);
        let employee = Uuid::new_v4();
        let assignment = engine
            .assign(
                org,
                AssignRequest {
                    position_level_id: Some(junior),
                    ..AssignRequest::to_position(
                        employee,
                        engineer.position.id,
                        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    )
                },
            )
            .await
            .unwrap();

        let blocked = store.delete_position_level(org, junior, DeleteOptions::default()).await;
        assert!(matches!(blocked, Err(AppError::HasDependents(_))));

        let summary = store
            .delete_position_level(org, senior, DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.deleted_levels, 1);

        let summary = store
            .delete_position_level(org, junior, DeleteOptions::cascade())
            .await
            .unwrap();
        assert_eq!(summary.deleted_levels, 1);
        assert_eq!(summary.closed_assignments, 1);
        assert!(store.get_position(org, engineer.position.id).await.unwrap().levels.is_empty());

        let history = engine.list_for_employee(org, employee, None).await.unwrap();
        assert_eq!(history[0].id, assignment.id);
        assert_eq!(history[0].position_level_id, Some(junior));
        assert!(!history[0].is_open(today()));
    }

    #[tokio::test]
    async fn test_levels_created_inline_and_ordered() {
        let db = memory_db().await;
        let org = provisioned(&db, SettingsPatch::default()).await;
        let store = HierarchyStore::new(&db);

        let created = store
            .create_position(
                org,
                NewPosition {
                    levels: vec![
                        LevelSpec::new("Senior", 3),
                        LevelSpec::new("Junior", 1),
                        LevelSpec::new("Mid", 2),
                    ],
                    ..NewPosition::named("Engineer")
                },
            )
            .await
            .unwrap();
        let names: Vec<_> = created.levels.iter().map(|l| l.level_name.as_str()).collect();
        assert_eq!(names, ["Junior", "Mid", "Senior"]);

        let dup = store
            .create_position_level(org, created.position.id, LevelSpec::new("Lead", 2))
            .await;
        match dup {
            Err(AppError::Validation { field, .. }) => assert_eq!(field.as_deref(), Some("level_order")),
            other => panic!("expected validation error, got {:?}", other),
        }

        let lead = store
            .create_position_level(org, created.position.id, LevelSpec::new("Lead", 4))
            .await
            .unwrap();
        let moved = store
            .update_position_level(
                org,
                lead.id,
                LevelPatch {
                    level_order: Some(1),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(moved, Err(AppError::Validation { .. })));

        let listed = store.list_positions(org).await.unwrap();
        assert_eq!(listed.len(), 1);
        let orders: Vec<_> = listed[0].levels.iter().map(|l| l.level_order).collect();
        assert_eq!(orders, [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_levels_hidden_and_blocked_when_disabled() {
        let db = memory_db().await;
        let org = provisioned(&db, SettingsPatch::default()).await;
        let store = HierarchyStore::new(&db);
        let created = store
            .create_position(
                org,
                NewPosition {
                    levels: vec![LevelSpec::new("Junior", 1)],
                    ..NewPosition::named("Analyst")
                },
            )
            .await
            .unwrap();

        SettingsStore::new(&db)
            .update(
                org,
                SettingsPatch {
                    use_position_levels: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let fetched = store.get_position(org, created.position.id).await.unwrap();
        assert!(fetched.levels.is_empty());
        assert!(matches!(
            store
                .create_position_level(org, created.position.id, LevelSpec::new("Senior", 2))
                .await,
            Err(AppError::ScopeViolation { .. })
        ));

        // kept, not deleted
        SettingsStore::new(&db)
            .update(
                org,
                SettingsPatch {
                    use_position_levels: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(store.list_levels(org, created.position.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let db = memory_db().await;
        let org = provisioned(&db, SettingsPatch::default()).await;
        let store = HierarchyStore::new(&db);
        let div = store.create_division(org, NewDivision::named("Ops")).await.unwrap();

        let renamed = store
            .update_division(
                org,
                div.id,
                DivisionPatch {
                    name: Some("Operations".to_string()),
                    expected_updated_at: Some(div.updated_at),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Operations");

        let stale = store
            .update_division(
                org,
                div.id,
                DivisionPatch {
                    name: Some("Ops again".to_string()),
                    expected_updated_at: Some(div.updated_at),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(stale, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_division_tree_nests_children() {
        let db = memory_db().await;
        let org = provisioned(&db, SettingsPatch::default()).await;
        let store = HierarchyStore::new(&db);
        let hq = store.create_division(org, NewDivision::named("HQ")).await.unwrap();
        store.create_division(org, child("Finance", hq.id)).await.unwrap();
        store.create_division(org, child("Engineering", hq.id)).await.unwrap();
        store.create_division(org, NewDivision::named("Branch")).await.unwrap();

        let tree = store.division_tree(org).await.unwrap();
        let roots: Vec<_> = tree.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(roots, ["Branch", "HQ"]);
        let children: Vec<_> = tree[1].children.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(children, ["Engineering", "Finance"]);
    }
}
