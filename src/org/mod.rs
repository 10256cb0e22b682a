//! Organizational structure and assignment engine
//!
//! - [`settings`]: per-organization structural flags
//! - [`topology`]: pure validation of hierarchy mutations
//! - [`hierarchy`]: divisions, departments, positions and levels
//! - [`assignment`]: time-bounded employee assignments
//!
//! Every operation takes the organization id explicitly. Writes run inside a
//! single serializable transaction covering validation reads and the commit.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, IsolationLevel, TransactionTrait};

pub mod assignment;
pub mod hierarchy;
pub mod payload;
pub mod settings;
pub mod topology;

pub use assignment::AssignmentEngine;
pub use hierarchy::HierarchyStore;
pub use settings::{SettingsFlags, SettingsPatch, SettingsStore};

/// Start a transaction at serializable isolation
pub(crate) async fn begin_serializable(
    db: &DatabaseConnection,
) -> Result<DatabaseTransaction, DbErr> {
    db.begin_with_config(Some(IsolationLevel::Serializable), None)
        .await
}

/// Current time at the precision every supported backend stores
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}
