//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod grant;
mod identifier;
mod instruction;
mod metadata_row;
mod project_roles;
mod role;
mod routine;
mod statement;
mod user;

pub use grant::{
    FutureGrantRecord, GrantCategory, GrantRecord, GrantedOn, GranteeKind, OWNERSHIP, USAGE,
    UserGrantRecord,
};
pub use identifier::{
    ObjectName, RoutineSignature, quote_identifier, quote_literal, unquote_identifier,
};
pub use instruction::Instruction;
pub use metadata_row::MetadataRow;
pub use project_roles::ProjectRoleSet;
pub use role::{Role, RoleFutureGrants, RoleGrants, is_workspace_role};
pub use routine::{RoutineDefinition, RoutineKind, RoutineLanguage};
pub use statement::{SchemaSpec, Securable, ShareScope, Statement, WarehouseSpec};
pub use user::{COPIED_USER_PROPERTIES, GENERATED_PASSWORD_LENGTH, Password, UserDefinition};
