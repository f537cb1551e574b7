//! `strategies`: list registered strategies.

use mdchunk_core::StrategyRegistry;

/// Print each registered strategy with its description.
pub fn list_strategies() {
    let registry = StrategyRegistry::with_builtins();
    let entries = registry.describe();
    let width = entries.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, description) in entries {
        println!("{name:<width$}  {description}");
    }
}
