//! Entity module - SeaORM 实体定义
//!
//! 包含所有数据库表对应的实体模型

pub mod department;
pub mod division;
pub mod employee_assignment;
pub mod organization_settings;
pub mod position;
pub mod position_level;
