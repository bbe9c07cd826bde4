//! Repository layer for data access

pub mod executions;
pub mod rules;

// Re-export concrete repository implementations with simple names
pub use executions::DbExecutionRepository as ExecutionRepository;
pub use rules::DbRuleRepository as RuleRepository;

// Re-export repository traits
pub use executions::ExecutionRepository as ExecutionRepositoryTrait;
pub use rules::RuleRepository as RuleRepositoryTrait;
