//! Data Transfer Objects for REST request/response serialization.
//!
//! Amounts are whole chips carried as JSON integers. Domain records such as
//! [`crate::domain::Account`] and [`crate::domain::Transaction`] are
//! serialized as they are; the types here cover request bodies, query
//! strings and composite responses.

pub mod account_dto;
pub mod common_dto;
pub mod mint_dto;
pub mod recovery_dto;
pub mod transaction_dto;
pub mod transfer_dto;

pub use account_dto::*;
pub use common_dto::*;
pub use mint_dto::*;
pub use recovery_dto::*;
pub use transaction_dto::*;
pub use transfer_dto::*;
