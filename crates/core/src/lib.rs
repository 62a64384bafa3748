#![forbid(unsafe_code)]

pub mod aggregate;
pub mod context;
pub mod entity;
pub mod ids;
pub mod lifecycle;
pub mod roles;
pub mod status;

pub use aggregate::{CategorySummary, Summary, SummaryError, SummaryFilter, summarize};
pub use context::{AccessScope, ActorId, ActorIdError, CallerContext};
pub use entity::{Entity, EntityType};
pub use ids::{LookupPredicate, ResolveError, resolve};
pub use lifecycle::{LifecycleAction, LifecycleError, LifecycleOutcome, LifecycleState};
pub use roles::{
    Contact, ContactRole, RoleChange, RoleError, RoleOp, RoleSet, RoleType, RoleTypeError,
};
pub use status::{Category, CategoryError, TabCounts, category_of, list_by_category, tab_counts};
