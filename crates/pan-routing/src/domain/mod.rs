//! Domain Layer - Pure routing logic
//!
//! This layer contains:
//! - Route rules and statistics
//! - Match predicates and field paths
//! - Actions and `{{path}}` templates
//!
//! RULES:
//! - No bus access
//! - No async code

pub mod action;
pub mod path;
pub mod predicate;
pub mod rule;
pub mod template;

pub use action::{LogLevel, RouteAction};
pub use path::{is_valid_path, resolve};
pub use predicate::{values_equal, FieldOp, RouteMatch};
pub use rule::{RouteDefinition, RouteId, RouteRule, RouteSnapshot, RouteStats};
pub use template::{render_str, render_value};
