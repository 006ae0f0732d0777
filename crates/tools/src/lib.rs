//! Built-in tool implementations for chatloom.
//!
//! Tools give the model side-effect-free helpers it can call between
//! rounds: arithmetic and the current time.

pub mod calculator;
pub mod clock;

use chatloom_core::tool::ToolRegistry;

pub use calculator::CalculatorTool;
pub use clock::ClockTool;

/// Create a default tool registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CalculatorTool));
    registry.register(Box::new(ClockTool));
    registry
}
