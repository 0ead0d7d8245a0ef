//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod bill_file;
pub mod inquiry;
pub mod rate_limit;
pub mod return_record;
pub mod sea_orm_active_enums;
pub mod unit;

// Re-export specific types to avoid conflicts
pub use bill_file::{Column as BillFileColumn, Entity as BillFile, Model as BillFileModel};
pub use inquiry::{Column as InquiryColumn, Entity as Inquiry, Model as InquiryModel};
pub use rate_limit::{Column as RateLimitColumn, Entity as RateLimit, Model as RateLimitModel};
pub use return_record::{
    Column as ReturnRecordColumn, Entity as ReturnRecord, Model as ReturnRecordModel,
};
pub use sea_orm_active_enums::{RegistrationChannel, WarrantyStatus};
pub use unit::{Column as UnitColumn, Entity as Unit, Model as UnitModel};
