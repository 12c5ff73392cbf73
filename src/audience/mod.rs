pub mod condition_tree;
pub mod resolver;

pub use condition_tree::{evaluate_leaf, parse_condition, ConditionExpr, Leaf, Tri};
pub use resolver::{resolve_audience, ParsedAudience};
