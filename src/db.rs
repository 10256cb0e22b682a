use sea_orm::sea_query::{Index, IndexCreateStatement, TableCreateStatement};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Schema};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::entity::{
    department, division, employee_assignment, organization_settings, position, position_level,
};

/// Initialize database connection and auto-migrate tables
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    info!("Connecting to database: {}", config.display_target());

    let mut opt = ConnectOptions::new(config.connection_url());
    opt.max_connections(config.max_connections)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug);

    if config.is_sqlite() {
        // One writer at a time; an in-memory database lives in a single connection
        opt.max_connections(1).min_connections(1);
    } else {
        opt.min_connections(2).set_schema_search_path("public");
    }

    let db = Database::connect(opt).await?;
    info!("Database connection established");

    auto_migrate(&db).await?;

    Ok(db)
}

/// Create tables and indexes that do not exist yet
pub async fn auto_migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    info!("Running auto-migration for all entities...");

    create_table_if_not_exists(db, backend, schema.create_table_from_entity(organization_settings::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(division::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(department::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(position::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(position_level::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(employee_assignment::Entity)).await?;

    create_indexes(db, backend).await?;

    info!("Auto-migration completed successfully");
    Ok(())
}

/// Tenant filter indexes plus the level ordering constraint
async fn create_indexes(db: &DatabaseConnection, backend: DbBackend) -> Result<(), DbErr> {
    let statements = vec![
        Index::create()
            .name("idx_divisions_org_parent")
            .table(division::Entity)
            .col(division::Column::OrganizationId)
            .col(division::Column::ParentDivisionId)
            .to_owned(),
        Index::create()
            .name("idx_departments_org_division")
            .table(department::Entity)
            .col(department::Column::OrganizationId)
            .col(department::Column::DivisionId)
            .to_owned(),
        Index::create()
            .name("idx_positions_org_division")
            .table(position::Entity)
            .col(position::Column::OrganizationId)
            .col(position::Column::DivisionId)
            .to_owned(),
        Index::create()
            .name("idx_positions_org_department")
            .table(position::Entity)
            .col(position::Column::OrganizationId)
            .col(position::Column::DepartmentId)
            .to_owned(),
        Index::create()
            .name("uq_position_levels_position_order")
            .table(position_level::Entity)
            .col(position_level::Column::PositionId)
            .col(position_level::Column::LevelOrder)
            .unique()
            .to_owned(),
        Index::create()
            .name("idx_assignments_org_employee")
            .table(employee_assignment::Entity)
            .col(employee_assignment::Column::OrganizationId)
            .col(employee_assignment::Column::EmployeeId)
            .to_owned(),
    ];

    for stmt in statements {
        create_index_if_not_exists(db, backend, stmt).await?;
    }

    Ok(())
}

/// Create a table if it doesn't exist
async fn create_table_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: TableCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

/// Create an index if it doesn't exist
async fn create_index_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: IndexCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}
