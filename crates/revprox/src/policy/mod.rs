//! Cacheability policy: decides whether, and for how long, an origin
//! response may be stored.

mod cache_control;
mod evaluator;

pub use cache_control::CacheControl;
pub use evaluator::{is_cacheable_status, CacheDecision, HttpPolicyEvaluator, PolicyEvaluator};
