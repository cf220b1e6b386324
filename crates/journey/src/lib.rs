//! Journey graph engine: a conditional plan of waypoints, and the per-user
//! context it is evaluated against.

pub mod arbiter;
pub mod context;
pub mod evaluator;
pub mod events;
pub mod plan;
pub mod store;
pub mod traversal;
pub mod types;
pub mod validation;

pub use arbiter::Arbiter;
pub use context::{JourneyContext, ValidationState, DEFAULT_CONTEXT_ID};
pub use evaluator::Condition;
pub use events::{EventKind, JourneyEventListener};
pub use plan::{Plan, PlanOptions};
pub use store::SessionData;
pub use traversal::TraversalOptions;
pub use types::{is_exit_node, Route, RouteName};
pub use validation::ValidationError;
