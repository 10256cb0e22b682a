//! Structural validation of hierarchy mutations
//!
//! [`validate`] is a pure function of the settings flags, the proposed
//! mutation and a [`TreeSnapshot`] holding the entities the mutation refers
//! to. Rules are checked in a fixed order and the first failure wins:
//!
//! 1. every referenced id resolves to an entity of the same organization
//! 2. a division never becomes its own ancestor
//! 3. department and position scoping follows the settings flags
//! 4. a position's department belongs to the position's division

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::settings::SettingsFlags;
use crate::entity::{department, division};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivisionNode {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub parent_division_id: Option<Uuid>,
}

impl From<&division::Model> for DivisionNode {
    fn from(model: &division::Model) -> Self {
        Self {
            id: model.id,
            organization_id: model.organization_id,
            parent_division_id: model.parent_division_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepartmentNode {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub division_id: Option<Uuid>,
}

impl From<&department::Model> for DepartmentNode {
    fn from(model: &department::Model) -> Self {
        Self {
            id: model.id,
            organization_id: model.organization_id,
            division_id: model.division_id,
        }
    }
}

/// The part of the tree a mutation needs to be judged
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
    divisions: HashMap<Uuid, DivisionNode>,
    departments: HashMap<Uuid, DepartmentNode>,
}

impl TreeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_division(&mut self, node: DivisionNode) {
        self.divisions.insert(node.id, node);
    }

    pub fn insert_department(&mut self, node: DepartmentNode) {
        self.departments.insert(node.id, node);
    }

    pub fn with_division(mut self, node: DivisionNode) -> Self {
        self.insert_division(node);
        self
    }

    pub fn with_department(mut self, node: DepartmentNode) -> Self {
        self.insert_department(node);
        self
    }

    pub fn division(&self, id: Uuid) -> Option<&DivisionNode> {
        self.divisions.get(&id)
    }

    pub fn department(&self, id: Uuid) -> Option<&DepartmentNode> {
        self.departments.get(&id)
    }
}

/// A proposed write, reduced to its structural references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Division {
        id: Uuid,
        organization_id: Uuid,
        parent_division_id: Option<Uuid>,
    },
    Department {
        organization_id: Uuid,
        division_id: Option<Uuid>,
    },
    Position {
        organization_id: Uuid,
        division_id: Option<Uuid>,
        department_id: Option<Uuid>,
    },
}

/// Why a mutation was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Referenced id missing or owned by another organization
    Reference { field: &'static str, id: Uuid },
    /// Division would become its own ancestor
    Cycle { division_id: Uuid, parent_id: Uuid },
    /// Settings-driven scoping rule broken
    Scope { field: &'static str, reason: String },
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::Reference { field, id } => AppError::reference(
                field,
                format!("{} {} does not exist in this organization", field, id),
            ),
            Rejection::Cycle {
                division_id,
                parent_id,
            } => AppError::Cycle(format!(
                "division {} cannot be placed under {}: it would become its own ancestor",
                division_id, parent_id
            )),
            Rejection::Scope { field, reason } => AppError::scope(field, reason),
        }
    }
}

pub fn validate(
    flags: &SettingsFlags,
    mutation: &Mutation,
    tree: &TreeSnapshot,
) -> Result<(), Rejection> {
    check_ownership(mutation, tree)?;
    check_acyclic(mutation, tree)?;
    check_scope(flags, mutation)?;
    check_consistency(mutation, tree)
}

fn check_ownership(mutation: &Mutation, tree: &TreeSnapshot) -> Result<(), Rejection> {
    let owns_division = |org: Uuid, field: &'static str, id: Option<Uuid>| match id {
        Some(id) if tree.division(id).map(|d| d.organization_id) != Some(org) => {
            Err(Rejection::Reference { field, id })
        }
        _ => Ok(()),
    };

    match *mutation {
        Mutation::Division {
            organization_id,
            parent_division_id,
            ..
        } => owns_division(organization_id, "parent_division_id", parent_division_id),
        Mutation::Department {
            organization_id,
            division_id,
        } => owns_division(organization_id, "division_id", division_id),
        Mutation::Position {
            organization_id,
            division_id,
            department_id,
        } => {
            owns_division(organization_id, "division_id", division_id)?;
            match department_id {
                Some(id)
                    if tree.department(id).map(|d| d.organization_id)
                        != Some(organization_id) =>
                {
                    Err(Rejection::Reference {
                        field: "department_id",
                        id,
                    })
                }
                _ => Ok(()),
            }
        }
    }
}

fn check_acyclic(mutation: &Mutation, tree: &TreeSnapshot) -> Result<(), Rejection> {
    let Mutation::Division {
        id,
        parent_division_id: Some(parent_id),
        ..
    } = *mutation
    else {
        return Ok(());
    };

    let mut seen = HashSet::new();
    let mut cursor = Some(parent_id);
    while let Some(current) = cursor {
        if current == id {
            return Err(Rejection::Cycle {
                division_id: id,
                parent_id,
            });
        }
        // A pre-existing loop that does not pass through `id` still has to end the walk
        if !seen.insert(current) {
            break;
        }
        cursor = tree.division(current).and_then(|d| d.parent_division_id);
    }
    Ok(())
}

fn check_scope(flags: &SettingsFlags, mutation: &Mutation) -> Result<(), Rejection> {
    match *mutation {
        Mutation::Division { .. } => Ok(()),
        Mutation::Department { division_id, .. } => {
            if flags.departments_require_division() && division_id.is_none() {
                return Err(Rejection::Scope {
                    field: "division_id",
                    reason: "departments must belong to a division in this organization"
                        .to_string(),
                });
            }
            Ok(())
        }
        Mutation::Position {
            division_id,
            department_id,
            ..
        } => {
            if flags.positions_are_org_wide {
                if division_id.is_some() {
                    return Err(Rejection::Scope {
                        field: "division_id",
                        reason: "positions are organization-wide and cannot be scoped to a division"
                            .to_string(),
                    });
                }
                if department_id.is_some() {
                    return Err(Rejection::Scope {
                        field: "department_id",
                        reason:
                            "positions are organization-wide and cannot be scoped to a department"
                                .to_string(),
                    });
                }
            } else if division_id.is_none() && department_id.is_none() {
                return Err(Rejection::Scope {
                    field: "division_id",
                    reason: "positions must be scoped to a division or a department".to_string(),
                });
            }
            Ok(())
        }
    }
}

fn check_consistency(mutation: &Mutation, tree: &TreeSnapshot) -> Result<(), Rejection> {
    let Mutation::Position {
        division_id: Some(division_id),
        department_id: Some(department_id),
        ..
    } = *mutation
    else {
        return Ok(());
    };

    let department_division = tree.department(department_id).and_then(|d| d.division_id);
    if department_division != Some(division_id) {
        return Err(Rejection::Scope {
            field: "department_id",
            reason: format!(
                "department {} does not belong to division {}",
                department_id, division_id
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> SettingsFlags {
        SettingsFlags::default()
    }

    fn scoped_flags() -> SettingsFlags {
        SettingsFlags {
            use_divisions: true,
            use_departments: true,
            departments_under_divisions: true,
            positions_are_org_wide: false,
            ..SettingsFlags::default()
        }
    }

    fn div(org: Uuid, parent: Option<Uuid>) -> DivisionNode {
        DivisionNode {
            id: Uuid::new_v4(),
            organization_id: org,
            parent_division_id: parent,
        }
    }

    fn dept(org: Uuid, division: Option<Uuid>) -> DepartmentNode {
        DepartmentNode {
            id: Uuid::new_v4(),
            organization_id: org,
            division_id: division,
        }
    }

    #[test]
    fn test_root_division_accepted() {
        let org = Uuid::new_v4();
        let mutation = Mutation::Division {
            id: Uuid::new_v4(),
            organization_id: org,
            parent_division_id: None,
        };
        assert_eq!(validate(&flags(), &mutation, &TreeSnapshot::new()), Ok(()));
    }

    #[test]
    fn test_self_parent_is_a_cycle() {
        let org = Uuid::new_v4();
        let a = div(org, None);
        let tree = TreeSnapshot::new().with_division(a);
        let mutation = Mutation::Division {
            id: a.id,
            organization_id: org,
            parent_division_id: Some(a.id),
        };
        assert!(matches!(
            validate(&flags(), &mutation, &tree),
            Err(Rejection::Cycle { .. })
        ));
    }

    #[test]
    fn test_deep_cycle_detected() {
        let org = Uuid::new_v4();
        let a = div(org, None);
        let b = div(org, Some(a.id));
        let c = div(org, Some(b.id));
        let tree = TreeSnapshot::new().with_division(a).with_division(b).with_division(c);

        let mutation = Mutation::Division {
            id: a.id,
            organization_id: org,
            parent_division_id: Some(c.id),
        };
        let rejection = validate(&flags(), &mutation, &tree).unwrap_err();
        assert_eq!(
            rejection,
            Rejection::Cycle {
                division_id: a.id,
                parent_id: c.id
            }
        );
    }

    #[test]
    fn test_walk_terminates_on_corrupt_loop() {
        let org = Uuid::new_v4();
        let x_id = Uuid::new_v4();
        let y_id = Uuid::new_v4();
        let tree = TreeSnapshot::new()
            .with_division(DivisionNode {
                id: x_id,
                organization_id: org,
                parent_division_id: Some(y_id),
            })
            .with_division(DivisionNode {
                id: y_id,
                organization_id: org,
                parent_division_id: Some(x_id),
            });

        let mutation = Mutation::Division {
            id: Uuid::new_v4(),
            organization_id: org,
            parent_division_id: Some(x_id),
        };
        assert_eq!(validate(&flags(), &mutation, &tree), Ok(()));
    }

    #[test]
    fn test_foreign_parent_is_reference_error() {
        let org = Uuid::new_v4();
        let foreign = div(Uuid::new_v4(), None);
        let tree = TreeSnapshot::new().with_division(foreign);
        let mutation = Mutation::Division {
            id: Uuid::new_v4(),
            organization_id: org,
            parent_division_id: Some(foreign.id),
        };
        assert_eq!(
            validate(&flags(), &mutation, &tree),
            Err(Rejection::Reference {
                field: "parent_division_id",
                id: foreign.id
            })
        );
    }

    #[test]
    fn test_ownership_checked_before_cycles() {
        // A foreign parent whose chain loops back still reports the reference first
        let org = Uuid::new_v4();
        let id = Uuid::new_v4();
        let foreign = DivisionNode {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            parent_division_id: Some(id),
        };
        let tree = TreeSnapshot::new().with_division(foreign);
        let mutation = Mutation::Division {
            id,
            organization_id: org,
            parent_division_id: Some(foreign.id),
        };
        assert!(matches!(
            validate(&flags(), &mutation, &tree),
            Err(Rejection::Reference { .. })
        ));
    }

    #[test]
    fn test_department_requires_division_when_effective() {
        let org = Uuid::new_v4();
        let mutation = Mutation::Department {
            organization_id: org,
            division_id: None,
        };
        assert!(matches!(
            validate(&scoped_flags(), &mutation, &TreeSnapshot::new()),
            Err(Rejection::Scope {
                field: "division_id",
                ..
            })
        ));
    }

    #[test]
    fn test_department_flag_inert_for_every_combination() {
        let org = Uuid::new_v4();
        let mutation = Mutation::Department {
            organization_id: org,
            division_id: None,
        };
        for flags in SettingsFlags::all_combinations() {
            let result = validate(&flags, &mutation, &TreeSnapshot::new());
            assert_eq!(result.is_err(), flags.departments_require_division(), "{:?}", flags);
        }
    }

    #[test]
    fn test_department_division_optional_when_divisions_unused() {
        let org = Uuid::new_v4();
        let d = div(org, None);
        let tree = TreeSnapshot::new().with_division(d);
        let flags = SettingsFlags {
            use_divisions: false,
            use_departments: true,
            ..SettingsFlags::default()
        };
        let mutation = Mutation::Department {
            organization_id: org,
            division_id: Some(d.id),
        };
        assert_eq!(validate(&flags, &mutation, &tree), Ok(()));
    }

    #[test]
    fn test_missing_department_division_is_reference_error() {
        let org = Uuid::new_v4();
        let missing = Uuid::new_v4();
        let mutation = Mutation::Department {
            organization_id: org,
            division_id: Some(missing),
        };
        assert_eq!(
            validate(&scoped_flags(), &mutation, &TreeSnapshot::new()),
            Err(Rejection::Reference {
                field: "division_id",
                id: missing
            })
        );
    }

    #[test]
    fn test_org_wide_position_cannot_be_scoped() {
        let org = Uuid::new_v4();
        let d = dept(org, None);
        let tree = TreeSnapshot::new().with_department(d);
        let mutation = Mutation::Position {
            organization_id: org,
            division_id: None,
            department_id: Some(d.id),
        };
        assert!(matches!(
            validate(&flags(), &mutation, &tree),
            Err(Rejection::Scope {
                field: "department_id",
                ..
            })
        ));
    }

    #[test]
    fn test_scoped_position_needs_a_unit() {
        let mutation = Mutation::Position {
            organization_id: Uuid::new_v4(),
            division_id: None,
            department_id: None,
        };
        assert!(matches!(
            validate(&scoped_flags(), &mutation, &TreeSnapshot::new()),
            Err(Rejection::Scope { .. })
        ));
    }

    #[test]
    fn test_position_department_must_sit_in_division() {
        let org = Uuid::new_v4();
        let north = div(org, None);
        let south = div(org, None);
        let sales = dept(org, Some(south.id));
        let tree = TreeSnapshot::new()
            .with_division(north)
            .with_division(south)
            .with_department(sales);

        let mismatched = Mutation::Position {
            organization_id: org,
            division_id: Some(north.id),
            department_id: Some(sales.id),
        };
        assert!(matches!(
            validate(&scoped_flags(), &mismatched, &tree),
            Err(Rejection::Scope {
                field: "department_id",
                ..
            })
        ));

        let matched = Mutation::Position {
            organization_id: org,
            division_id: Some(south.id),
            department_id: Some(sales.id),
        };
        assert_eq!(validate(&scoped_flags(), &matched, &tree), Ok(()));
    }

    #[test]
    fn test_rejection_maps_to_error_taxonomy() {
        let err: AppError = Rejection::Scope {
            field: "division_id",
            reason: "nope".to_string(),
        }
        .into();
        assert_eq!(err.code(), "SCOPE_VIOLATION");

        let err: AppError = Rejection::Cycle {
            division_id: Uuid::new_v4(),
            parent_id: Uuid::new_v4(),
        }
        .into();
        assert_eq!(err.code(), "CYCLE_ERROR");
    }
}
